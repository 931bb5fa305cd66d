//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bpkio_provider::lifecycle::{ApiSettings, BpkioApi};
use bpkio_provider::resources::{self, SERVICE_AD_INSERTION, SOURCE_AD_SERVER, SOURCE_LIVE, SOURCE_SLATE};
use reconcile_framework::{
    Action, Batch, BatchReport, ErrorClass, InstanceKey, InstanceSpec, Reconciler, ReferenceHandle,
    RemoteFailure, RemoteGateway, RemoteId, SchemaRegistry, State, Toggle, Value,
};
use std::sync::{Arc, Mutex};

pub const SLATE_URL: &str = "https://bpkiosamples.s3.eu-west-1.amazonaws.com/broadpeakio-slate.jpg";
pub const LIVE_URL: &str = "https://origin.broadpeak.io/bpk-tv/bpkiofficial/hlsv3/index.m3u8";
pub const LIVE_URL_OTHER: &str = "https://test-streams.mux.dev/x36xhzz/x36xhzz.m3u8";
pub const AD_SERVER_URL: &str = "https://bpkiovast.s3.eu-west-1.amazonaws.com/vastmultibpkio";
pub const UNREACHABLE_URL: &str = "https://this-does-not-exist.example.com/nonexistent.m3u8";
pub const TRANSCODING_PROFILE: i64 = 5963;
pub const BAD_ID: i64 = 999_999_999;

pub const SLATE: &str = "bpkio_source_slate.slate";
pub const LIVE: &str = "bpkio_source_live.live";
pub const AD_SERVER: &str = "bpkio_source_adserver.ads";
pub const SERVICE: &str = "bpkio_service_ad_insertion.service";

pub fn source(name: &str, url: &str) -> State {
    State::new().with("name", name).with("url", url)
}

/// `{ id = ... }` block, either a literal id or a reference to another instance.
pub fn id_block(id: impl Into<Value>) -> State {
    State::new().with("id", id)
}

pub fn service(name: &str, source: impl Into<Value>, ad_server: impl Into<Value>, gap_filler: impl Into<Value>) -> State {
    State::new()
        .with("name", name)
        .with("source", id_block(source))
        .with(
            "live_ad_replacement",
            State::new()
                .with("ad_server", id_block(ad_server))
                .with("gap_filler", id_block(gap_filler))
                .with("spot_aware", Toggle::with_config(State::new())),
        )
        .with("transcoding_profile", id_block(TRANSCODING_PROFILE))
}

/// Slate, live origin, ad server and a service that uses all three.
pub fn full_batch(service_name: &str) -> Batch {
    Batch::new()
        .with(InstanceSpec::new(SLATE, SOURCE_SLATE, source("tf-acc-slate", SLATE_URL)))
        .with(InstanceSpec::new(LIVE, SOURCE_LIVE, source("tf-acc-live", LIVE_URL)))
        .with(InstanceSpec::new(AD_SERVER, SOURCE_AD_SERVER, source("tf-acc-adserver", AD_SERVER_URL)))
        .with(InstanceSpec::new(
            SERVICE,
            SERVICE_AD_INSERTION,
            service(
                service_name,
                ReferenceHandle::to(LIVE),
                ReferenceHandle::to(AD_SERVER),
                ReferenceHandle::to(SLATE),
            ),
        ))
}

/// One remote call as seen by [`Recording`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub verb: &'static str,
    pub resource_type: String,
    pub id: Option<RemoteId>,
}

/// Passes every call through to the real gateway and remembers it.
pub struct Recording {
    inner: Arc<dyn RemoteGateway>,
    calls: Mutex<Vec<Call>>,
}

impl Recording {
    pub fn new(inner: Arc<dyn RemoteGateway>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, verb: &'static str, resource_type: &str, id: Option<RemoteId>) {
        self.calls.lock().unwrap().push(Call {
            verb,
            resource_type: resource_type.to_string(),
            id,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.calls().iter().filter(|c| c.verb == verb).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl RemoteGateway for Recording {
    async fn create(&self, resource_type: &str, payload: &State) -> Result<State, RemoteFailure> {
        self.record("create", resource_type, None);
        self.inner.create(resource_type, payload).await
    }

    async fn read(&self, resource_type: &str, id: RemoteId) -> Result<State, RemoteFailure> {
        self.record("read", resource_type, Some(id));
        self.inner.read(resource_type, id).await
    }

    async fn update(&self, resource_type: &str, id: RemoteId, payload: &State) -> Result<State, RemoteFailure> {
        self.record("update", resource_type, Some(id));
        self.inner.update(resource_type, id, payload).await
    }

    async fn delete(&self, resource_type: &str, id: RemoteId) -> Result<(), RemoteFailure> {
        self.record("delete", resource_type, Some(id));
        self.inner.delete(resource_type, id).await
    }
}

/// A running API with a recording gateway in front of it.
pub struct Harness {
    pub api: BpkioApi,
    pub registry: Arc<SchemaRegistry>,
    pub recording: Arc<Recording>,
}

impl Harness {
    pub fn start() -> Self {
        let registry = Arc::new(resources::registry());
        let api = BpkioApi::start(ApiSettings::default());
        let recording = Arc::new(Recording::new(api.gateway(registry.clone())));
        Self {
            api,
            registry,
            recording,
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.registry.clone(), self.recording.clone())
    }

    pub async fn shutdown(self) {
        drop(self.recording);
        self.api.shutdown().await.unwrap();
    }
}

pub fn key(name: &str) -> InstanceKey {
    InstanceKey::new(name)
}

pub fn action_of(report: &BatchReport, name: &str) -> Option<Action> {
    report.get(&key(name)).and_then(|instance| instance.result.action())
}

pub fn id_of(report: &BatchReport, name: &str) -> RemoteId {
    report
        .get(&key(name))
        .and_then(|instance| instance.id)
        .unwrap_or_else(|| panic!("{name} has no identifier"))
}

pub fn class_of(report: &BatchReport, name: &str) -> Option<ErrorClass> {
    report
        .get(&key(name))
        .and_then(|instance| instance.result.error())
        .and_then(|e| e.class())
}
