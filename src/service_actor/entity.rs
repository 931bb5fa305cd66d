//! [`RemoteObject`] implementation for [`AdInsertion`].
//!
//! A service may only point at sources that exist and have the right kind:
//! the `source` must be a live origin, `ad_server` an ad server and
//! `gap_filler` a slate. Anything else is answered the way the API does, with
//! a 403.

use crate::model::{file_name, AdInsertion, AdInsertionPayload, Source, SourceKind};
use async_trait::async_trait;
use reconcile_framework::{RemoteFailure, RemoteId, RemoteObject, StoreClient};
use tracing::debug;

#[async_trait]
impl RemoteObject for AdInsertion {
    type Create = AdInsertionPayload;
    type Update = AdInsertionPayload;
    type Context = StoreClient<Source>;

    fn from_create_params(id: RemoteId, params: AdInsertionPayload) -> Result<Self, RemoteFailure> {
        AdInsertion::from_payload(id, params)
    }

    fn id(&self) -> RemoteId {
        self.id
    }

    async fn on_create(&mut self, sources: &StoreClient<Source>) -> Result<(), RemoteFailure> {
        let source = check_references(self, sources).await?;
        self.url = playback_url(self.id, &source);
        Ok(())
    }

    async fn on_update(
        &mut self,
        update: AdInsertionPayload,
        sources: &StoreClient<Source>,
    ) -> Result<(), RemoteFailure> {
        self.apply(update)?;
        check_references(self, sources).await?;
        Ok(())
    }
}

fn expected_kind(role: &str) -> SourceKind {
    match role {
        "ad server" => SourceKind::AdServer,
        "gap filler" => SourceKind::Slate,
        _ => SourceKind::Live,
    }
}

/// Looks up every referenced source and returns the main one.
async fn check_references(
    service: &AdInsertion,
    sources: &StoreClient<Source>,
) -> Result<Source, RemoteFailure> {
    let mut main = None;
    for (role, id) in service.source_refs() {
        let expected = expected_kind(role);
        let found = sources.get(id).await?;
        debug!(service = %service.id, role, %id, found = found.is_some(), "Checked reference");
        match found {
            Some(source) if source.kind == expected => {
                if role == "source" {
                    main = Some(source);
                }
            }
            Some(source) => {
                return Err(RemoteFailure::new(
                    403,
                    format!(
                        "Forbidden: {role} {id} is a {} source, expected {expected}; not allowed",
                        source.kind
                    ),
                ))
            }
            None => {
                return Err(RemoteFailure::new(
                    403,
                    format!("Forbidden: {role} {id} is not allowed for this account"),
                ))
            }
        }
    }
    main.ok_or_else(|| RemoteFailure::new(403, "Forbidden: a source is required"))
}

/// Playback URL: the service path followed by the origin's manifest name.
fn playback_url(id: RemoteId, source: &Source) -> String {
    let manifest = file_name(&source.url).unwrap_or_else(|| "index.m3u8".to_string());
    format!("https://stream.broadpeak.io/ad-insertion/{id}/{manifest}")
}
