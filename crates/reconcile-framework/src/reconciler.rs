//! # Composite Reconciler
//!
//! Converges a whole batch of interdependent instances. The batch is checked
//! up front (known resource types, valid desired states, an acyclic graph of
//! declared references) so configuration errors surface before the first
//! remote call. The graph is then walked: an instance starts only once every
//! instance it references has been materialized and its identifier bound,
//! independent instances run concurrently up to the configured limit, and a
//! failure blocks the failed instance's dependents without touching anything
//! else. Nothing is rolled back automatically. Transient remote failures are
//! retried here with exponential backoff; everything else is reported as is.
//!
//! Orphans, instances managed by an earlier cycle that are no longer
//! declared, are deleted after the walk, dependents first.

use crate::controller::{Plan, ReadOutcome, ReplacePolicy, ResourceController};
use crate::diff::ChangeSet;
use crate::error::{ConfigurationError, ReconcileError};
use crate::gateway::RemoteGateway;
use crate::graph::DependencyGraph;
use crate::resolver::{resolve, resolve_known, IdentifierMap};
use crate::schema::{ResourceDescriptor, SchemaRegistry};
use crate::value::{DesiredState, InstanceKey, ObservedState, RemoteId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// What an earlier cycle left behind for one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorState {
    pub id: RemoteId,
    pub observed: ObservedState,
}

/// One declared instance.
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    pub key: InstanceKey,
    pub resource_type: String,
    pub desired: DesiredState,
    pub prior: Option<PriorState>,
}

impl InstanceSpec {
    pub fn new(key: impl Into<String>, resource_type: impl Into<String>, desired: DesiredState) -> Self {
        Self {
            key: InstanceKey::new(key),
            resource_type: resource_type.into(),
            desired,
            prior: None,
        }
    }

    pub fn with_prior(mut self, prior: PriorState) -> Self {
        self.prior = Some(prior);
        self
    }
}

/// Instances to reconcile in one pass.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    instances: Vec<InstanceSpec>,
    orphans: Vec<InstanceSpec>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, instance: InstanceSpec) -> Self {
        self.instances.push(instance);
        self
    }

    /// Adds an instance to delete. Its `desired` is the state it was last
    /// reconciled with, which orders deletion among orphans; `prior` must be set.
    pub fn with_orphan(mut self, orphan: InstanceSpec) -> Self {
        self.orphans.push(orphan);
        self
    }

    pub fn instances(&self) -> &[InstanceSpec] {
        &self.instances
    }

    pub fn orphans(&self) -> &[InstanceSpec] {
        &self.orphans
    }

    pub fn instance_mut(&mut self, key: &str) -> Option<&mut InstanceSpec> {
        self.instances.iter_mut().find(|i| i.key.as_str() == key)
    }

    /// Records the outcome of a previous pass as prior state, so the next
    /// pass plans against it instead of creating everything again.
    pub fn carry_forward(&mut self, report: &BatchReport) {
        for instance in &mut self.instances {
            let Some(outcome) = report.get(&instance.key) else { continue };
            // Skipped instances were never touched, so their prior still holds.
            if matches!(
                outcome.result,
                ReconciliationResult::Success(_) | ReconciliationResult::Failed(_)
            ) {
                instance.prior = outcome.prior();
            }
        }
    }

    /// Moves instance `key` to the orphan list.
    pub fn forget(&mut self, key: &str) -> Option<&InstanceSpec> {
        let index = self.instances.iter().position(|i| i.key.as_str() == key)?;
        let instance = self.instances.remove(index);
        self.orphans.push(instance);
        self.orphans.last()
    }
}

/// Knobs for one reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    /// Upper bound on concurrent instance operations.
    pub concurrency: usize,
    /// Re-read every previously materialized instance before planning.
    pub refresh: bool,
    pub replace_policy: ReplacePolicy,
    /// Extra attempts for an operation that failed with a transient error.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further attempt.
    pub retry_backoff_ms: u64,
}

const MAX_BACKOFF_MS: u64 = 10_000;

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            refresh: false,
            replace_policy: ReplacePolicy::Deny,
            max_retries: 2,
            retry_backoff_ms: 200,
        }
    }
}

impl ReconcileOptions {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
    }
}

/// Cooperative cancellation. Running remote calls finish; nothing new starts.
#[derive(Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

/// What happened to an instance that converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Updated,
    Replaced,
    /// Recreated after the remote object was found missing.
    Recreated,
    Unchanged,
    Deleted,
}

/// Terminal result for one instance.
#[derive(Debug)]
pub enum ReconciliationResult {
    Success(Action),
    Failed(ReconcileError),
    /// Not attempted because instances it depends on did not converge.
    Blocked { by: Vec<InstanceKey> },
    Cancelled,
}

impl ReconciliationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ReconciliationResult::Success(_))
    }

    pub fn action(&self) -> Option<Action> {
        match self {
            ReconciliationResult::Success(action) => Some(*action),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ReconcileError> {
        match self {
            ReconciliationResult::Failed(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct InstanceReport {
    pub key: InstanceKey,
    pub resource_type: String,
    pub result: ReconciliationResult,
    pub id: Option<RemoteId>,
    /// Observed state after the operation, when the instance still exists.
    pub state: Option<ObservedState>,
    /// Changes that were planned, for updates and replacements.
    pub changes: Option<ChangeSet>,
}

impl InstanceReport {
    fn skipped(key: InstanceKey, resource_type: String, result: ReconciliationResult) -> Self {
        Self {
            key,
            resource_type,
            result,
            id: None,
            state: None,
            changes: None,
        }
    }

    pub fn prior(&self) -> Option<PriorState> {
        Some(PriorState {
            id: self.id?,
            observed: self.state.clone()?,
        })
    }
}

/// Batch-level summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Success,
    /// At least one instance failed, was blocked or was cancelled.
    Partial,
}

/// One report per instance, declared instances first, then orphans.
#[derive(Debug, Default)]
pub struct BatchReport {
    instances: Vec<InstanceReport>,
}

impl BatchReport {
    pub fn outcome(&self) -> BatchOutcome {
        if self.instances.iter().all(|r| r.result.is_success()) {
            BatchOutcome::Success
        } else {
            BatchOutcome::Partial
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome() == BatchOutcome::Success
    }

    pub fn get(&self, key: &InstanceKey) -> Option<&InstanceReport> {
        self.instances.iter().find(|r| &r.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceReport> {
        self.instances.iter()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn failed(&self) -> Vec<&InstanceReport> {
        self.filter(|r| matches!(r, ReconciliationResult::Failed(_)))
    }

    pub fn blocked(&self) -> Vec<&InstanceReport> {
        self.filter(|r| matches!(r, ReconciliationResult::Blocked { .. }))
    }

    pub fn cancelled(&self) -> Vec<&InstanceReport> {
        self.filter(|r| matches!(r, ReconciliationResult::Cancelled))
    }

    fn filter(&self, predicate: impl Fn(&ReconciliationResult) -> bool) -> Vec<&InstanceReport> {
        self.instances.iter().filter(|r| predicate(&r.result)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Dependencies first.
    Apply,
    /// Dependents first.
    Destroy,
}

enum Work {
    Converge(DesiredState),
    Delete,
}

struct Pending {
    controller: ResourceController,
    work: Work,
}

struct Finished {
    key: InstanceKey,
    resource_type: String,
    result: ReconciliationResult,
    id: Option<RemoteId>,
    state: Option<ObservedState>,
    changes: Option<ChangeSet>,
}

impl From<Finished> for InstanceReport {
    fn from(f: Finished) -> Self {
        Self {
            key: f.key,
            resource_type: f.resource_type,
            result: f.result,
            id: f.id,
            state: f.state,
            changes: f.changes,
        }
    }
}

/// Drives batches against one gateway.
pub struct Reconciler {
    registry: Arc<SchemaRegistry>,
    gateway: Arc<dyn RemoteGateway>,
    options: ReconcileOptions,
    cancel: Arc<watch::Sender<bool>>,
}

impl Reconciler {
    pub fn new(registry: Arc<SchemaRegistry>, gateway: Arc<dyn RemoteGateway>) -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            registry,
            gateway,
            options: ReconcileOptions::default(),
            cancel: Arc::new(sender),
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            sender: self.cancel.clone(),
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn controller(&self, instance: &InstanceSpec, descriptor: Arc<ResourceDescriptor>) -> ResourceController {
        match &instance.prior {
            Some(prior) => ResourceController::adopt(
                instance.key.clone(),
                descriptor,
                self.gateway.clone(),
                prior.id,
                prior.observed.clone(),
            ),
            None => ResourceController::new(instance.key.clone(), descriptor, self.gateway.clone()),
        }
    }

    /// Resolves descriptors, validates every desired state and builds the
    /// dependency graph. Issues no remote calls.
    fn check(&self, batch: &Batch) -> Result<(BTreeMap<InstanceKey, Arc<ResourceDescriptor>>, DependencyGraph), ReconcileError> {
        let mut descriptors = BTreeMap::new();
        for instance in batch.instances.iter().chain(batch.orphans.iter()) {
            let descriptor = self.registry.describe(&instance.resource_type)?;
            if descriptors.insert(instance.key.clone(), descriptor).is_some() {
                return Err(ConfigurationError::DuplicateInstance(instance.key.clone()).into());
            }
        }
        for instance in &batch.instances {
            if let Err(e) = descriptors[&instance.key].validate(&instance.desired) {
                warn!(key = %instance.key, resource_type = %instance.resource_type, error = %e, "Invalid configuration");
                return Err(e.into());
            }
        }
        let graph = DependencyGraph::build(batch.instances.iter().map(|i| (&i.key, &i.desired)))?;
        Ok((descriptors, graph))
    }

    /// Plans every declared instance without touching the remote system.
    /// References to instances that will keep their identifier are resolved
    /// from prior state; the rest stay pending and show up as changes.
    pub fn preview(&self, batch: &Batch) -> Result<Vec<(InstanceKey, Plan)>, ReconcileError> {
        let (descriptors, graph) = self.check(batch)?;
        let mut ids = IdentifierMap::new();
        let mut plans = Vec::with_capacity(batch.instances.len());

        for key in graph.topological_order() {
            let Some(instance) = batch.instances.iter().find(|i| i.key == key) else {
                continue;
            };
            let mut controller = self.controller(instance, descriptors[&key].clone());
            let desired = resolve_known(&instance.desired, &ids);
            let plan = controller.plan(&desired)?;
            if let (Some(prior), Plan::NoOp | Plan::Update(_)) = (&instance.prior, &plan) {
                ids.bind(key.clone(), prior.id)?;
            }
            plans.push((key, plan));
        }
        Ok(plans)
    }

    /// Converges every declared instance, then deletes the orphans.
    pub async fn reconcile(&self, batch: &Batch) -> Result<BatchReport, ReconcileError> {
        let (descriptors, graph) = self.check(batch)?;
        // Orphans are ordered among themselves by the references they last had.
        let teardown_graph = DependencyGraph::build(
            batch
                .instances
                .iter()
                .chain(batch.orphans.iter())
                .map(|i| (&i.key, &i.desired)),
        )?;
        info!(
            instances = batch.instances.len(),
            orphans = batch.orphans.len(),
            concurrency = self.options.concurrency,
            "Reconciling batch"
        );

        let pending = batch
            .instances
            .iter()
            .map(|i| {
                let controller = self.controller(i, descriptors[&i.key].clone());
                (i.key.clone(), Pending { controller, work: Work::Converge(i.desired.clone()) })
            })
            .collect();
        let mut ids = IdentifierMap::new();
        let mut finished = self.walk(&graph, pending, Direction::Apply, &mut ids).await;

        let orphans = batch
            .orphans
            .iter()
            .map(|i| {
                let controller = self.controller(i, descriptors[&i.key].clone());
                (i.key.clone(), Pending { controller, work: Work::Delete })
            })
            .collect();
        finished.extend(self.walk(&teardown_graph, orphans, Direction::Destroy, &mut ids).await);

        let report = Self::report(batch.instances.iter().chain(batch.orphans.iter()), finished);
        info!(
            outcome = ?report.outcome(),
            failed = report.failed().len(),
            blocked = report.blocked().len(),
            "Batch reconciled"
        );
        Ok(report)
    }

    /// Deletes every materialized instance of the batch, dependents first.
    pub async fn teardown(&self, batch: &Batch) -> Result<BatchReport, ReconcileError> {
        let (descriptors, _) = self.check(batch)?;
        let graph = DependencyGraph::build(
            batch
                .instances
                .iter()
                .chain(batch.orphans.iter())
                .map(|i| (&i.key, &i.desired)),
        )?;
        info!(instances = graph.len(), "Tearing down batch");

        let managed: Vec<&InstanceSpec> = batch
            .instances
            .iter()
            .chain(batch.orphans.iter())
            .filter(|i| i.prior.is_some())
            .collect();
        let pending = managed
            .iter()
            .map(|i| {
                let controller = self.controller(i, descriptors[&i.key].clone());
                (i.key.clone(), Pending { controller, work: Work::Delete })
            })
            .collect();
        let finished = self
            .walk(&graph, pending, Direction::Destroy, &mut IdentifierMap::new())
            .await;
        Ok(Self::report(managed.into_iter(), finished))
    }

    fn report<'a>(
        order: impl Iterator<Item = &'a InstanceSpec>,
        mut finished: BTreeMap<InstanceKey, InstanceReport>,
    ) -> BatchReport {
        BatchReport {
            instances: order.filter_map(|i| finished.remove(&i.key)).collect(),
        }
    }

    async fn walk(
        &self,
        graph: &DependencyGraph,
        mut pending: BTreeMap<InstanceKey, Pending>,
        direction: Direction,
        ids: &mut IdentifierMap,
    ) -> BTreeMap<InstanceKey, InstanceReport> {
        let members: BTreeSet<InstanceKey> = pending.keys().cloned().collect();
        let mut succeeded: BTreeMap<InstanceKey, bool> = BTreeMap::new();
        let mut reports: BTreeMap<InstanceKey, InstanceReport> = BTreeMap::new();
        let mut in_flight: BTreeMap<InstanceKey, String> = BTreeMap::new();
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut running: JoinSet<Finished> = JoinSet::new();

        loop {
            let mut progressed = true;
            while progressed {
                progressed = false;
                let waiting: Vec<InstanceKey> = pending.keys().cloned().collect();
                for key in waiting {
                    if self.is_cancelled() {
                        let Some(item) = pending.remove(&key) else { continue };
                        debug!(key = %key, "Cancelled before start");
                        succeeded.insert(key.clone(), false);
                        let resource_type = item.controller.resource_type().to_string();
                        reports.insert(
                            key.clone(),
                            InstanceReport::skipped(key, resource_type, ReconciliationResult::Cancelled),
                        );
                        progressed = true;
                        continue;
                    }

                    let gates: Vec<&InstanceKey> = match direction {
                        Direction::Apply => graph.dependencies(&key).collect(),
                        Direction::Destroy => graph.dependents(&key).collect(),
                    };
                    let gates: Vec<&InstanceKey> =
                        gates.into_iter().filter(|g| members.contains(*g)).collect();

                    let failed: Vec<InstanceKey> = gates
                        .iter()
                        .filter(|g| succeeded.get(**g) == Some(&false))
                        .map(|g| (*g).clone())
                        .collect();
                    if !failed.is_empty() {
                        let Some(item) = pending.remove(&key) else { continue };
                        warn!(key = %key, blocked_by = ?failed, "Blocked by failed dependency");
                        succeeded.insert(key.clone(), false);
                        let resource_type = item.controller.resource_type().to_string();
                        reports.insert(
                            key.clone(),
                            InstanceReport::skipped(key, resource_type, ReconciliationResult::Blocked { by: failed }),
                        );
                        progressed = true;
                        continue;
                    }
                    if !gates.iter().all(|g| succeeded.get(*g) == Some(&true)) {
                        continue;
                    }

                    let Some(item) = pending.remove(&key) else { continue };
                    let resource_type = item.controller.resource_type().to_string();
                    progressed = true;

                    let work = match item.work {
                        Work::Converge(desired) => match resolve(&desired, ids) {
                            Ok(resolved) => Work::Converge(resolved),
                            Err(e) => {
                                succeeded.insert(key.clone(), false);
                                reports.insert(
                                    key.clone(),
                                    InstanceReport::skipped(key, resource_type, ReconciliationResult::Failed(e.into())),
                                );
                                continue;
                            }
                        },
                        Work::Delete => Work::Delete,
                    };

                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            error!(error = %e, "Semaphore closed");
                            succeeded.insert(key.clone(), false);
                            reports.insert(
                                key.clone(),
                                InstanceReport::skipped(
                                    key,
                                    resource_type,
                                    ReconciliationResult::Failed(ReconcileError::Internal(e.to_string())),
                                ),
                            );
                            continue;
                        }
                    };
                    in_flight.insert(key.clone(), resource_type);
                    let options = self.options;
                    let cancel = self.cancel.clone();
                    let controller = item.controller;
                    running.spawn(async move {
                        let _permit = permit;
                        match work {
                            Work::Converge(desired) => converge(controller, desired, options, cancel).await,
                            Work::Delete => destroy(controller, options).await,
                        }
                    });
                }
            }

            match running.join_next().await {
                Some(Ok(done)) => {
                    in_flight.remove(&done.key);
                    let mut report = InstanceReport::from(done);
                    let mut ok = report.result.is_success();
                    if ok && direction == Direction::Apply {
                        if let Some(id) = report.id {
                            if let Err(e) = ids.bind(report.key.clone(), id) {
                                error!(key = %report.key, error = %e, "Identifier bound twice");
                                report.result = ReconciliationResult::Failed(e.into());
                                ok = false;
                            }
                        }
                    }
                    succeeded.insert(report.key.clone(), ok);
                    reports.insert(report.key.clone(), report);
                }
                Some(Err(e)) => {
                    error!(error = %e, "Instance task failed");
                }
                None => break,
            }
        }

        // Anything left could not be scheduled or lost its task.
        for (key, resource_type) in in_flight {
            reports.insert(
                key.clone(),
                InstanceReport::skipped(
                    key,
                    resource_type,
                    ReconciliationResult::Failed(ReconcileError::Internal("instance task aborted".into())),
                ),
            );
        }
        for (key, item) in pending {
            let by: Vec<InstanceKey> = graph.dependencies(&key).cloned().collect();
            let resource_type = item.controller.resource_type().to_string();
            reports.insert(
                key.clone(),
                InstanceReport::skipped(key, resource_type, ReconciliationResult::Blocked { by }),
            );
        }
        reports
    }
}

async fn converge(
    mut controller: ResourceController,
    desired: DesiredState,
    options: ReconcileOptions,
    cancel: Arc<watch::Sender<bool>>,
) -> Finished {
    let key = controller.key().clone();
    let resource_type = controller.resource_type().to_string();
    let mut drifted = false;

    let outcome: Result<(Action, Option<ChangeSet>), ReconcileError> = async {
        if options.refresh && controller.identifier().is_some() {
            if let ReadOutcome::Drifted = controller.read().await? {
                drifted = true;
            }
            if *cancel.borrow() {
                return Err(ReconcileError::Cancelled);
            }
        }
        let plan = controller.plan(&desired)?;
        let action = match &plan {
            Plan::Create if drifted => Action::Recreated,
            Plan::Create => Action::Created,
            Plan::Update(_) => Action::Updated,
            Plan::Replace(_) => Action::Replaced,
            Plan::NoOp => Action::Unchanged,
        };
        let mut attempt = 0;
        let mut next = plan.clone();
        loop {
            match controller.apply(&desired, &next, options.replace_policy).await {
                Ok(_) => break,
                Err(e) if e.is_retryable() && attempt < options.max_retries => {
                    attempt += 1;
                    let delay = options.backoff(attempt);
                    warn!(
                        %key,
                        attempt,
                        max_retries = options.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    if *cancel.borrow() {
                        return Err(ReconcileError::Cancelled);
                    }
                    // A failed replace may already have removed the old object.
                    next = controller.plan(&desired)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok((action, plan.changes().cloned()))
    }
    .await;

    let (result, changes) = match outcome {
        Ok((action, changes)) => (ReconciliationResult::Success(action), changes),
        Err(ReconcileError::Cancelled) => (ReconciliationResult::Cancelled, None),
        Err(e) => (ReconciliationResult::Failed(e), None),
    };
    Finished {
        key,
        resource_type,
        result,
        id: controller.identifier(),
        state: controller.observed().cloned(),
        changes,
    }
}

async fn destroy(mut controller: ResourceController, options: ReconcileOptions) -> Finished {
    let key = controller.key().clone();
    let resource_type = controller.resource_type().to_string();
    let mut attempt = 0;
    let result = loop {
        match controller.delete().await {
            Ok(()) => break ReconciliationResult::Success(Action::Deleted),
            Err(e) if e.is_retryable() && attempt < options.max_retries => {
                attempt += 1;
                let delay = options.backoff(attempt);
                warn!(%key, attempt, error = %e, "Transient failure on delete, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => break ReconciliationResult::Failed(e),
        }
    };
    Finished {
        key,
        resource_type,
        result,
        id: controller.identifier(),
        state: controller.observed().cloned(),
        changes: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorClass;
    use crate::mock::{MockGateway, Verb};
    use crate::schema::{AttributeSpec, Shape};
    use crate::value::{ReferenceHandle, State, Value};

    fn source(kind: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(kind)
            .with_attribute(AttributeSpec::computed("id", Shape::Int))
            .with_attribute(AttributeSpec::required("name", Shape::String))
            .with_attribute(AttributeSpec::required("url", Shape::String))
    }

    fn id_ref() -> Shape {
        Shape::object(
            ResourceDescriptor::new("reference").with_attribute(AttributeSpec::required("id", Shape::Int)),
        )
    }

    fn registry() -> Arc<SchemaRegistry> {
        let service = ResourceDescriptor::new("service")
            .with_attribute(AttributeSpec::computed("id", Shape::Int))
            .with_attribute(AttributeSpec::required("name", Shape::String))
            .with_attribute(AttributeSpec::required("source", id_ref()).immutable())
            .with_attribute(AttributeSpec::required("ad_server", id_ref()))
            .with_attribute(AttributeSpec::required("gap_filler", id_ref()));
        Arc::new(
            SchemaRegistry::new()
                .with(source("slate"))
                .with(source("live"))
                .with(source("ads"))
                .with(service),
        )
    }

    fn source_state(name: &str) -> State {
        State::new().with("name", name).with("url", format!("https://example.com/{name}"))
    }

    fn observed(id: i64, desired: &State) -> State {
        desired.clone().with("id", id)
    }

    fn service_state(name: &str) -> State {
        State::new()
            .with("name", name)
            .with("source", State::new().with("id", ReferenceHandle::to("live")))
            .with("ad_server", State::new().with("id", ReferenceHandle::to("ads")))
            .with("gap_filler", State::new().with("id", ReferenceHandle::to("slate")))
    }

    fn resolved_service(name: &str) -> State {
        State::new()
            .with("id", 4_i64)
            .with("name", name)
            .with("source", State::new().with("id", 2_i64))
            .with("ad_server", State::new().with("id", 3_i64))
            .with("gap_filler", State::new().with("id", 1_i64))
    }

    fn batch() -> Batch {
        Batch::new()
            .with(InstanceSpec::new("service", "service", service_state("svc")))
            .with(InstanceSpec::new("slate", "slate", source_state("s1")))
            .with(InstanceSpec::new("live", "live", source_state("l1")))
            .with(InstanceSpec::new("ads", "ads", source_state("a1")))
    }

    fn expect_sources(mock: &mut MockGateway) {
        mock.expect_create("slate").return_ok(observed(1, &source_state("s1")));
        mock.expect_create("live").return_ok(observed(2, &source_state("l1")));
        mock.expect_create("ads").return_ok(observed(3, &source_state("a1")));
    }

    fn created_batch() -> Batch {
        let mut batch = batch();
        for (key, id, state) in [
            ("slate", 1, source_state("s1")),
            ("live", 2, source_state("l1")),
            ("ads", 3, source_state("a1")),
        ] {
            let observed = observed(id, &state);
            batch.instance_mut(key).unwrap().prior = Some(PriorState {
                id: RemoteId(id as u64),
                observed,
            });
        }
        batch.instance_mut("service").unwrap().prior = Some(PriorState {
            id: RemoteId(4),
            observed: resolved_service("svc"),
        });
        batch
    }

    #[tokio::test]
    async fn test_referenced_instances_are_created_first() {
        let mut mock = MockGateway::new();
        expect_sources(&mut mock);
        mock.expect_create("service").return_ok(resolved_service("svc"));
        let reconciler = Reconciler::new(registry(), mock.gateway());

        let report = reconciler.reconcile(&batch()).await.unwrap();
        assert!(report.is_success());
        mock.verify();

        let calls = mock.calls();
        assert_eq!(calls.last().map(|c| c.resource_type.as_str()), Some("service"));
        let payload = calls[3].payload.as_ref().unwrap();
        assert_eq!(payload.lookup("source.id"), Some(&Value::Int(2)));
        assert_eq!(payload.lookup("ad_server.id"), Some(&Value::Int(3)));
        assert_eq!(payload.lookup("gap_filler.id"), Some(&Value::Int(1)));

        let service = report.get(&InstanceKey::new("service")).unwrap();
        assert_eq!(service.result.action(), Some(Action::Created));
        assert_eq!(service.id, Some(RemoteId(4)));
    }

    #[tokio::test]
    async fn test_failed_dependency_blocks_dependents_only() {
        let mut mock = MockGateway::new();
        mock.expect_create("slate").return_ok(observed(1, &source_state("s1")));
        mock.expect_create("live").return_ok(observed(2, &source_state("l1")));
        mock.expect_create("ads")
            .return_err(403, "A source with the same name and url already exists");
        let reconciler = Reconciler::new(registry(), mock.gateway());

        let report = reconciler.reconcile(&batch()).await.unwrap();
        assert_eq!(report.outcome(), BatchOutcome::Partial);
        mock.verify();

        let ads = report.get(&InstanceKey::new("ads")).unwrap();
        assert_eq!(ads.result.error().and_then(ReconcileError::class), Some(ErrorClass::ConflictRejected));

        let service = report.get(&InstanceKey::new("service")).unwrap();
        assert!(matches!(
            &service.result,
            ReconciliationResult::Blocked { by } if by == &vec![InstanceKey::new("ads")]
        ));
        assert!(report.get(&InstanceKey::new("slate")).unwrap().result.is_success());
        assert!(mock.calls().iter().all(|c| c.resource_type != "service"));
    }

    #[tokio::test]
    async fn test_configuration_errors_precede_remote_calls() {
        let mock = MockGateway::new();
        let reconciler = Reconciler::new(registry(), mock.gateway());

        let missing = batch().with(InstanceSpec::new("broken", "slate", State::new().with("url", "https://x")));
        let err = reconciler.reconcile(&missing).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: The argument \"name\" is required, but no definition was found."
        );

        let cyclic = Batch::new()
            .with(InstanceSpec::new("a", "service", service_state("a").with("source", State::new().with("id", ReferenceHandle::to("b")))))
            .with(InstanceSpec::new(
                "b",
                "service",
                service_state("b").with("source", State::new().with("id", ReferenceHandle::to("a"))),
            ))
            .with(InstanceSpec::new("slate", "slate", source_state("s1")))
            .with(InstanceSpec::new("ads", "ads", source_state("a1")));
        let err = reconciler.reconcile(&cyclic).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration(ConfigurationError::Cycle(_))));

        let unknown = Batch::new().with(InstanceSpec::new("x", "nope", State::new()));
        assert!(reconciler.reconcile(&unknown).await.unwrap_err().is_configuration());

        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_renaming_service_touches_nothing_else() {
        let mut mock = MockGateway::new();
        mock.expect_update("service", RemoteId(4)).return_ok(resolved_service("renamed"));
        let reconciler = Reconciler::new(registry(), mock.gateway());

        let mut batch = created_batch();
        batch.instance_mut("service").unwrap().desired = service_state("renamed");

        let plans = reconciler.preview(&batch).unwrap();
        let updates: Vec<_> = plans.iter().filter(|(_, p)| !matches!(p, Plan::NoOp)).collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, InstanceKey::new("service"));

        let report = reconciler.reconcile(&batch).await.unwrap();
        assert!(report.is_success());
        mock.verify();

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].verb, Verb::Update);

        let service = report.get(&InstanceKey::new("service")).unwrap();
        let changes = service.changes.as_ref().unwrap();
        assert_eq!(changes.update_paths(), vec!["name".to_string()]);
        assert!(changes.replace_paths().is_empty());
        for key in ["slate", "live", "ads"] {
            let report = report.get(&InstanceKey::new(key)).unwrap();
            assert_eq!(report.result.action(), Some(Action::Unchanged));
        }
    }

    #[tokio::test]
    async fn test_cancelled_batch_starts_nothing() {
        let mock = MockGateway::new();
        let reconciler = Reconciler::new(registry(), mock.gateway());
        reconciler.cancel_handle().cancel();

        let report = reconciler.reconcile(&batch()).await.unwrap();
        assert_eq!(report.cancelled().len(), 4);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_orphans_are_deleted_dependents_first() {
        let mut mock = MockGateway::new();
        mock.expect_delete("service", RemoteId(4)).return_deleted();
        mock.expect_delete("ads", RemoteId(3)).return_deleted();
        let reconciler = Reconciler::new(registry(), mock.gateway());

        let mut batch = created_batch();
        batch.forget("service");
        batch.forget("ads");
        // The remaining instances are unchanged and stay untouched.
        let report = reconciler.reconcile(&batch).await.unwrap();
        assert!(report.is_success());
        mock.verify();

        let deletes: Vec<String> = mock
            .calls_of(Verb::Delete)
            .into_iter()
            .map(|c| c.resource_type)
            .collect();
        assert_eq!(deletes, vec!["service".to_string(), "ads".to_string()]);
    }

    #[tokio::test]
    async fn test_teardown_reverses_dependency_order() {
        let mut mock = MockGateway::new();
        mock.expect_delete("service", RemoteId(4)).return_deleted();
        mock.expect_delete("slate", RemoteId(1)).return_deleted();
        mock.expect_delete("live", RemoteId(2)).return_deleted();
        mock.expect_delete("ads", RemoteId(3)).return_err(404, "Not Found");
        let reconciler = Reconciler::new(registry(), mock.gateway());

        let report = reconciler.teardown(&created_batch()).await.unwrap();
        assert!(report.is_success());
        assert_eq!(mock.calls()[0].resource_type, "service");
        mock.verify();
    }

    #[tokio::test]
    async fn test_refresh_recreates_drifted_instance() {
        let mut mock = MockGateway::new();
        mock.expect_read("slate", RemoteId(1)).return_err(404, "Not Found");
        mock.expect_create("slate").return_ok(observed(9, &source_state("s1")));
        let reconciler = Reconciler::new(registry(), mock.gateway()).with_options(ReconcileOptions {
            refresh: true,
            ..ReconcileOptions::default()
        });

        let batch = Batch::new().with(
            InstanceSpec::new("slate", "slate", source_state("s1")).with_prior(PriorState {
                id: RemoteId(1),
                observed: observed(1, &source_state("s1")),
            }),
        );
        let report = reconciler.reconcile(&batch).await.unwrap();
        mock.verify();

        let slate = report.get(&InstanceKey::new("slate")).unwrap();
        assert_eq!(slate.result.action(), Some(Action::Recreated));
        assert_eq!(slate.id, Some(RemoteId(9)));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let mut mock = MockGateway::new();
        mock.expect_create("slate").return_err(503, "Service Unavailable");
        mock.expect_create("slate").return_ok(observed(1, &source_state("s1")));
        mock.expect_create("live").return_err(409, "a live source with the same name already exists");
        let reconciler = Reconciler::new(registry(), mock.gateway()).with_options(ReconcileOptions {
            retry_backoff_ms: 1,
            ..ReconcileOptions::default()
        });

        let batch = Batch::new()
            .with(InstanceSpec::new("slate", "slate", source_state("s1")))
            .with(InstanceSpec::new("live", "live", source_state("l1")));
        let report = reconciler.reconcile(&batch).await.unwrap();
        mock.verify();

        assert_eq!(
            report.get(&InstanceKey::new("slate")).unwrap().result.action(),
            Some(Action::Created)
        );
        // Conflicts are surfaced at once.
        let live = report.get(&InstanceKey::new("live")).unwrap();
        assert_eq!(live.result.error().and_then(|e| e.class()), Some(ErrorClass::ConflictRejected));
        assert_eq!(mock.calls_of(Verb::Create).len(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mut mock = MockGateway::new();
        for _ in 0..3 {
            mock.expect_create("slate").return_err(502, "Bad Gateway");
        }
        let reconciler = Reconciler::new(registry(), mock.gateway()).with_options(ReconcileOptions {
            max_retries: 2,
            retry_backoff_ms: 1,
            ..ReconcileOptions::default()
        });

        let batch = Batch::new().with(InstanceSpec::new("slate", "slate", source_state("s1")));
        let report = reconciler.reconcile(&batch).await.unwrap();
        mock.verify();

        let slate = report.get(&InstanceKey::new("slate")).unwrap();
        assert_eq!(slate.result.error().and_then(|e| e.class()), Some(ErrorClass::TransientRemote));
    }
}
