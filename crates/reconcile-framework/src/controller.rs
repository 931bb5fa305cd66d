//! # Resource Controller
//!
//! Drives the lifecycle of one resource instance against the remote gateway:
//!
//! ```text
//! Unmanaged -> Planned -> Creating -> Created -> (Updating -> Created)* -> Deleting -> Deleted
//!                                      ^
//!                          Importing --+
//! ```
//!
//! A create whose response carries no identifier ends in `Failed`: the
//! remote object may exist but cannot be addressed, so nothing more is done
//! with the instance.
//!
//! The controller never retries. Remote failures come back classified so the
//! caller can decide; configuration problems are reported before the gateway
//! is touched.

use crate::classify::to_remote_error;
use crate::diff::{diff, ChangeSet};
use crate::error::{ReconcileError, RemoteError};
use crate::gateway::{RemoteFailure, RemoteGateway};
use crate::import;
use crate::resolver::references;
use crate::schema::ResourceDescriptor;
use crate::value::{DesiredState, InstanceKey, ObservedState, RemoteId, State};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle phase of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Unmanaged,
    Planned,
    Creating,
    Created,
    Updating,
    Deleting,
    Deleted,
    Importing,
    Failed,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Phase::Unmanaged => "unmanaged",
            Phase::Planned => "planned",
            Phase::Creating => "creating",
            Phase::Created => "created",
            Phase::Updating => "updating",
            Phase::Deleting => "deleting",
            Phase::Deleted => "deleted",
            Phase::Importing => "importing",
            Phase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// What a reconciliation cycle will do to one instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Create,
    Update(ChangeSet),
    /// At least one change touches an immutable attribute.
    Replace(ChangeSet),
    NoOp,
}

impl Plan {
    pub fn changes(&self) -> Option<&ChangeSet> {
        match self {
            Plan::Update(changes) | Plan::Replace(changes) => Some(changes),
            Plan::Create | Plan::NoOp => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Plan::Create => "create",
            Plan::Update(_) => "update",
            Plan::Replace(_) => "replace",
            Plan::NoOp => "no-op",
        }
    }
}

/// Whether a replace plan may be executed as delete-then-create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacePolicy {
    #[default]
    Deny,
    Allow,
}

/// Result of refreshing an instance from the remote system.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Found(ObservedState),
    /// The remote object was deleted out-of-band.
    Drifted,
}

/// Lifecycle driver for a single resource instance.
pub struct ResourceController {
    key: InstanceKey,
    descriptor: Arc<ResourceDescriptor>,
    gateway: Arc<dyn RemoteGateway>,
    phase: Phase,
    id: Option<RemoteId>,
    observed: Option<ObservedState>,
}

impl ResourceController {
    /// A controller for an instance that does not exist remotely yet.
    pub fn new(
        key: InstanceKey,
        descriptor: Arc<ResourceDescriptor>,
        gateway: Arc<dyn RemoteGateway>,
    ) -> Self {
        Self {
            key,
            descriptor,
            gateway,
            phase: Phase::Unmanaged,
            id: None,
            observed: None,
        }
    }

    /// A controller for an instance materialized by an earlier cycle.
    pub fn adopt(
        key: InstanceKey,
        descriptor: Arc<ResourceDescriptor>,
        gateway: Arc<dyn RemoteGateway>,
        id: RemoteId,
        observed: ObservedState,
    ) -> Self {
        Self {
            key,
            descriptor,
            gateway,
            phase: Phase::Created,
            id: Some(id),
            observed: Some(observed),
        }
    }

    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    pub fn resource_type(&self) -> &str {
        self.descriptor.resource_type()
    }

    pub fn descriptor(&self) -> &Arc<ResourceDescriptor> {
        &self.descriptor
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn identifier(&self) -> Option<RemoteId> {
        self.id
    }

    pub fn observed(&self) -> Option<&ObservedState> {
        self.observed.as_ref()
    }

    fn invalid(&self, operation: &'static str) -> ReconcileError {
        ReconcileError::InvalidPhase {
            key: self.key.clone(),
            operation,
            phase: self.phase.to_string(),
        }
    }

    fn remote(&self, failure: RemoteFailure) -> ReconcileError {
        let error: RemoteError = to_remote_error(failure);
        warn!(
            resource_type = self.resource_type(),
            key = %self.key,
            class = %error.class,
            status = error.status,
            message = %error.message,
            "Remote call failed"
        );
        ReconcileError::Remote(error)
    }

    /// Validates `desired` and builds the request body: defaults filled in,
    /// computed attributes dropped, no references left.
    fn payload(&self, desired: &DesiredState) -> Result<State, ReconcileError> {
        self.descriptor.validate(desired)?;
        if let Some((path, instance)) = references(desired).into_iter().next() {
            return Err(crate::error::UnresolvedReference { instance, path }.into());
        }
        let mut payload = self.descriptor.apply_defaults(desired);
        for spec in self.descriptor.computed() {
            payload.remove(&spec.name);
        }
        Ok(payload)
    }

    fn record(&mut self, observed: ObservedState) -> Result<RemoteId, ReconcileError> {
        let id = observed
            .remote_id()
            .ok_or_else(|| ReconcileError::MissingIdentifier {
                resource_type: self.resource_type().to_string(),
            })?;
        self.id = Some(id);
        self.observed = Some(observed);
        self.phase = Phase::Created;
        Ok(id)
    }

    /// Decides what the next cycle must do to converge on `desired`.
    pub fn plan(&mut self, desired: &DesiredState) -> Result<Plan, ReconcileError> {
        self.descriptor.validate(desired)?;
        let plan = match &self.observed {
            None => {
                if self.phase == Phase::Unmanaged {
                    self.phase = Phase::Planned;
                }
                Plan::Create
            }
            Some(observed) => {
                let desired = self.descriptor.apply_defaults(desired);
                let changes = diff(&desired, observed, &self.descriptor);
                if changes.is_empty() {
                    Plan::NoOp
                } else if changes.has_replace() {
                    Plan::Replace(changes)
                } else {
                    Plan::Update(changes)
                }
            }
        };
        debug!(
            resource_type = self.resource_type(),
            key = %self.key,
            plan = plan.label(),
            "Planned"
        );
        Ok(plan)
    }

    /// Creates the remote object. Only valid while nothing is materialized.
    pub async fn create(&mut self, desired: &DesiredState) -> Result<RemoteId, ReconcileError> {
        if !matches!(self.phase, Phase::Unmanaged | Phase::Planned | Phase::Deleted) {
            return Err(self.invalid("create"));
        }
        let payload = self.payload(desired)?;

        self.phase = Phase::Creating;
        debug!(resource_type = self.resource_type(), key = %self.key, "Creating");
        let observed = match self.gateway.create(self.resource_type(), &payload).await {
            Ok(observed) => observed,
            Err(failure) => {
                self.phase = Phase::Unmanaged;
                return Err(self.remote(failure));
            }
        };
        let id = match self.record(observed) {
            Ok(id) => id,
            Err(err) => {
                self.phase = Phase::Failed;
                warn!(
                    resource_type = self.resource_type(),
                    key = %self.key,
                    "Created object has no identifier and is no longer tracked"
                );
                return Err(err);
            }
        };
        info!(resource_type = self.resource_type(), key = %self.key, %id, "Created");
        Ok(id)
    }

    /// Refreshes the observed state. A missing remote object is drift: the
    /// controller drops its identifier and falls back to `Unmanaged`.
    pub async fn read(&mut self) -> Result<ReadOutcome, ReconcileError> {
        let Some(id) = self.id else {
            return Err(self.invalid("read"));
        };
        match self.gateway.read(self.resource_type(), id).await {
            Ok(observed) => {
                debug!(resource_type = self.resource_type(), key = %self.key, %id, "Read");
                self.observed = Some(observed.clone());
                Ok(ReadOutcome::Found(observed))
            }
            Err(failure) if failure.is_not_found() && self.phase == Phase::Created => {
                warn!(
                    resource_type = self.resource_type(),
                    key = %self.key,
                    %id,
                    "Remote object disappeared, drift detected"
                );
                self.phase = Phase::Unmanaged;
                self.id = None;
                self.observed = None;
                Ok(ReadOutcome::Drifted)
            }
            Err(failure) => Err(self.remote(failure)),
        }
    }

    /// Applies an in-place update. A change set carrying a replace entry is
    /// refused here; use [`apply`](Self::apply) with a replace policy instead.
    pub async fn update(
        &mut self,
        desired: &DesiredState,
        changes: &ChangeSet,
    ) -> Result<ObservedState, ReconcileError> {
        if self.phase != Phase::Created {
            return Err(self.invalid("update"));
        }
        let Some(id) = self.id else {
            return Err(self.invalid("update"));
        };
        if changes.has_replace() {
            return Err(ReconcileError::ReplaceNotPermitted {
                key: self.key.clone(),
                paths: changes.replace_paths(),
            });
        }
        if changes.is_empty() {
            return Ok(self.observed.clone().unwrap_or_default());
        }
        let payload = self.payload(desired)?;

        self.phase = Phase::Updating;
        debug!(
            resource_type = self.resource_type(),
            key = %self.key,
            %id,
            paths = ?changes.update_paths(),
            "Updating"
        );
        match self.gateway.update(self.resource_type(), id, &payload).await {
            Ok(observed) => {
                self.observed = Some(observed.clone());
                self.phase = Phase::Created;
                info!(
                    resource_type = self.resource_type(),
                    key = %self.key,
                    %id,
                    changes = changes.len(),
                    "Updated"
                );
                Ok(observed)
            }
            Err(failure) => {
                self.phase = Phase::Created;
                Err(self.remote(failure))
            }
        }
    }

    /// Deletes the remote object. An object that is already gone counts as deleted.
    pub async fn delete(&mut self) -> Result<(), ReconcileError> {
        let Some(id) = self.id else {
            return match self.phase {
                Phase::Unmanaged | Phase::Planned | Phase::Deleted => {
                    self.phase = Phase::Deleted;
                    Ok(())
                }
                _ => Err(self.invalid("delete")),
            };
        };
        if self.phase != Phase::Created {
            return Err(self.invalid("delete"));
        }

        self.phase = Phase::Deleting;
        debug!(resource_type = self.resource_type(), key = %self.key, %id, "Deleting");
        match self.gateway.delete(self.resource_type(), id).await {
            Ok(()) => {}
            Err(failure) if failure.is_not_found() => {
                debug!(resource_type = self.resource_type(), key = %self.key, %id, "Already absent");
            }
            Err(failure) => {
                self.phase = Phase::Created;
                return Err(self.remote(failure));
            }
        }
        self.phase = Phase::Deleted;
        self.id = None;
        self.observed = None;
        info!(resource_type = self.resource_type(), key = %self.key, %id, "Deleted");
        Ok(())
    }

    /// Destroys and recreates the remote object.
    pub async fn replace(&mut self, desired: &DesiredState) -> Result<RemoteId, ReconcileError> {
        // Validate first so a bad configuration never costs us the old object.
        self.payload(desired)?;
        let old = self.id;
        self.delete().await?;
        let id = self.create(desired).await?;
        info!(
            resource_type = self.resource_type(),
            key = %self.key,
            old = ?old.map(|id| id.0),
            %id,
            "Replaced"
        );
        Ok(id)
    }

    /// Executes a plan produced by [`plan`](Self::plan).
    pub async fn apply(
        &mut self,
        desired: &DesiredState,
        plan: &Plan,
        policy: ReplacePolicy,
    ) -> Result<ObservedState, ReconcileError> {
        match plan {
            Plan::NoOp => {}
            Plan::Create => {
                self.create(desired).await?;
            }
            Plan::Update(changes) => {
                self.update(desired, changes).await?;
            }
            Plan::Replace(changes) => match policy {
                ReplacePolicy::Deny => {
                    return Err(ReconcileError::ReplaceNotPermitted {
                        key: self.key.clone(),
                        paths: changes.replace_paths(),
                    });
                }
                ReplacePolicy::Allow => {
                    warn!(
                        resource_type = self.resource_type(),
                        key = %self.key,
                        paths = ?changes.replace_paths(),
                        "Immutable attributes changed, replacing"
                    );
                    self.replace(desired).await?;
                }
            },
        }
        Ok(self.observed.clone().unwrap_or_default())
    }

    /// Takes over an existing remote object and reconstructs its desired state.
    pub async fn import_state(&mut self, id: RemoteId) -> Result<DesiredState, ReconcileError> {
        if !matches!(self.phase, Phase::Unmanaged | Phase::Deleted) {
            return Err(self.invalid("import"));
        }
        self.phase = Phase::Importing;
        self.id = Some(id);
        debug!(resource_type = self.resource_type(), key = %self.key, %id, "Importing");

        let observed = match self.gateway.read(self.resource_type(), id).await {
            Ok(observed) => observed,
            Err(failure) => {
                self.phase = Phase::Unmanaged;
                self.id = None;
                return Err(self.remote(failure));
            }
        };
        let desired = import::reconstruct(&observed, &self.descriptor);
        if let Err(e) = import::verify(&desired, &observed, &self.descriptor, id) {
            self.phase = Phase::Unmanaged;
            self.id = None;
            return Err(e);
        }
        self.observed = Some(observed);
        self.phase = Phase::Created;
        info!(resource_type = self.resource_type(), key = %self.key, %id, "Imported");
        Ok(desired)
    }
}
