//! # Import and Drift Detection
//!
//! Rebuilds a desired state from nothing but a remote identifier, then proves
//! the mapping is lossless: diffing the rebuilt state against the observed
//! state it came from must produce no changes. A non-empty result means the
//! descriptor and the remote representation disagree, which is a defect in
//! the resource definition rather than something the caller did wrong.

use crate::controller::ResourceController;
use crate::diff::{diff, Change, ChangeKind, ChangeSet};
use crate::error::ReconcileError;
use crate::gateway::RemoteGateway;
use crate::schema::ResourceDescriptor;
use crate::value::{DesiredState, InstanceKey, ObservedState, RemoteId, State};
use std::sync::Arc;

/// Copies every declared attribute, settable and computed, from `observed`.
pub fn reconstruct(observed: &ObservedState, descriptor: &ResourceDescriptor) -> DesiredState {
    descriptor
        .attributes()
        .iter()
        .filter_map(|spec| {
            observed
                .get(&spec.name)
                .map(|value| (spec.name.clone(), value.clone()))
        })
        .collect::<State>()
}

/// Checks that `desired` reproduces `observed` exactly.
///
/// Attributes the remote reports but the descriptor does not declare would be
/// dropped on import, so they are reported as lossy as well.
pub fn verify(
    desired: &DesiredState,
    observed: &ObservedState,
    descriptor: &ResourceDescriptor,
    id: RemoteId,
) -> Result<(), ReconcileError> {
    let mut changes = diff(desired, observed, descriptor);
    for (name, value) in observed.iter() {
        if descriptor.attribute(name).is_none() {
            changes.push(Change {
                path: name.clone(),
                old: Some(value.clone()),
                new: None,
                kind: ChangeKind::Update,
            });
        }
    }
    if changes.is_empty() {
        Ok(())
    } else {
        tracing::error!(
            resource_type = descriptor.resource_type(),
            %id,
            paths = ?changes.iter().map(|c| c.path.as_str()).collect::<Vec<_>>(),
            "Lossy import mapping"
        );
        Err(ReconcileError::LossyImport {
            resource_type: descriptor.resource_type().to_string(),
            id,
            changes,
        })
    }
}

/// Imports `id` as instance `key` and returns the controller now managing it
/// together with the reconstructed desired state.
pub async fn import_and_verify(
    key: InstanceKey,
    descriptor: Arc<ResourceDescriptor>,
    gateway: Arc<dyn RemoteGateway>,
    id: RemoteId,
) -> Result<(ResourceController, DesiredState), ReconcileError> {
    let mut controller = ResourceController::new(key, descriptor, gateway);
    let desired = controller.import_state(id).await?;
    Ok((controller, desired))
}

/// Difference between what an imported instance looks like now and what it
/// looked like at import time. Empty unless the remote object drifted.
pub fn drift(imported: &DesiredState, current: &ObservedState, descriptor: &ResourceDescriptor) -> ChangeSet {
    diff(imported, current, descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeSpec, Shape};
    use crate::value::{Toggle, Value};

    fn descriptor() -> ResourceDescriptor {
        ResourceDescriptor::new("service")
            .with_attribute(AttributeSpec::computed("id", Shape::Int))
            .with_attribute(AttributeSpec::required("name", Shape::String))
            .with_attribute(AttributeSpec::optional(
                "spot_aware",
                Shape::toggle(
                    ResourceDescriptor::new("spot_aware")
                        .with_attribute(AttributeSpec::optional("mode", Shape::String).with_default("french_addressable_tv")),
                ),
            ))
    }

    #[test]
    fn test_reconstruct_copies_declared_attributes() {
        let observed = State::new()
            .with("id", 3_i64)
            .with("name", "svc")
            .with("spot_aware", Toggle::EnabledWithDefaults);
        let desired = reconstruct(&observed, &descriptor());
        assert_eq!(desired, observed);
        assert!(verify(&desired, &observed, &descriptor(), RemoteId(3)).is_ok());
    }

    #[test]
    fn test_undeclared_remote_attribute_is_lossy() {
        let observed = State::new()
            .with("id", 3_i64)
            .with("name", "svc")
            .with("tags", Value::List(vec![]));
        let desired = reconstruct(&observed, &descriptor());
        assert!(!desired.contains("tags"));

        let err = verify(&desired, &observed, &descriptor(), RemoteId(3)).unwrap_err();
        match err {
            ReconcileError::LossyImport { changes, id, .. } => {
                assert_eq!(id, RemoteId(3));
                assert_eq!(changes.update_paths(), vec!["tags".to_string()]);
            }
            other => panic!("expected lossy import, got {other}"),
        }
    }

    #[test]
    fn test_drift_reports_out_of_band_rename() {
        let imported = State::new().with("id", 3_i64).with("name", "svc");
        let current = State::new().with("id", 3_i64).with("name", "renamed elsewhere");
        assert_eq!(drift(&imported, &current, &descriptor()).update_paths(), vec!["name".to_string()]);
    }
}
