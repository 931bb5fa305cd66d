//! Wire-level data structures of the broadpeak.io API.
//!
//! Field names follow the API's camelCase JSON; the [`codec`](crate::codec)
//! module translates between these bodies and engine [`State`](reconcile_framework::State)s.

pub mod service;
pub mod source;

pub use service::*;
pub use source::*;

use crate::resources::MAX_NAME_LENGTH;
use reconcile_framework::RemoteFailure;

/// Name rules shared by every resource.
pub(crate) fn check_name(name: &str) -> Result<(), RemoteFailure> {
    if name.trim().is_empty() {
        return Err(RemoteFailure::new(400, "Bad Request: name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(RemoteFailure::new(
            400,
            format!("Bad Request: name must be at most {MAX_NAME_LENGTH} characters long"),
        ));
    }
    Ok(())
}
