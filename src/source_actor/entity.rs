//! [`RemoteObject`] implementation for [`Source`].

use crate::lifecycle::ApiSettings;
use crate::model::{Source, SourcePayload};
use async_trait::async_trait;
use reconcile_framework::{RemoteFailure, RemoteId, RemoteObject};

#[async_trait]
impl RemoteObject for Source {
    type Create = SourcePayload;
    type Update = SourcePayload;
    type Context = ApiSettings;

    fn from_create_params(id: RemoteId, params: SourcePayload) -> Result<Self, RemoteFailure> {
        Source::from_payload(id, params)
    }

    fn id(&self) -> RemoteId {
        self.id
    }

    /// Two sources of the same kind may not share both name and URL.
    fn unique_key(&self) -> Option<String> {
        Some(format!("{} source with the same name {:?} and url {:?}", self.kind, self.name, self.url))
    }

    async fn on_create(&mut self, settings: &ApiSettings) -> Result<(), RemoteFailure> {
        check_reachable(self, settings)
    }

    async fn on_update(&mut self, update: SourcePayload, settings: &ApiSettings) -> Result<(), RemoteFailure> {
        self.apply(update)?;
        check_reachable(self, settings)
    }
}

fn check_reachable(source: &Source, settings: &ApiSettings) -> Result<(), RemoteFailure> {
    if !source.kind.fetches_url() {
        return Ok(());
    }
    match source.host() {
        Some(host) if settings.is_unreachable(&host) => Err(RemoteFailure::new(
            400,
            format!("Bad Request: source url {} is unreachable", source.url),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceKind;

    #[tokio::test]
    async fn test_unreachable_live_origin_is_rejected() {
        let payload = SourcePayload::new(
            SourceKind::Live,
            "live",
            "https://this-does-not-exist.example.com/nonexistent.m3u8",
        );
        let mut source = Source::from_create_params(RemoteId(1), payload).unwrap();
        let err = source.on_create(&ApiSettings::default()).await.unwrap_err();
        assert_eq!(err.status, 400);
        assert!(err.message.contains("unreachable"));
    }

    #[tokio::test]
    async fn test_unreachable_host_matches_regardless_of_case() {
        let payload = SourcePayload::new(
            SourceKind::Slate,
            "slate",
            "HTTPS://CDN.This-Does-Not-Exist.Example.com:8443/slate.jpg",
        );
        let mut source = Source::from_create_params(RemoteId(1), payload).unwrap();
        let err = source.on_create(&ApiSettings::default()).await.unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn test_ad_server_urls_are_not_fetched() {
        let payload = SourcePayload::new(
            SourceKind::AdServer,
            "ads",
            "https://this-does-not-exist.example.com/vast",
        );
        let mut source = Source::from_create_params(RemoteId(1), payload).unwrap();
        assert!(source.on_create(&ApiSettings::default()).await.is_ok());
    }

    #[test]
    fn test_unique_key_includes_kind() {
        let url = "https://origin.broadpeak.io/bpk-tv/bpkiofficial/hlsv3/index.m3u8";
        let live = Source::from_payload(RemoteId(1), SourcePayload::new(SourceKind::Live, "a", url)).unwrap();
        let slate = Source::from_payload(RemoteId(2), SourcePayload::new(SourceKind::Slate, "a", url)).unwrap();
        assert_ne!(live.unique_key(), slate.unique_key());
    }
}
