//! Demo: provisions a slate, a live origin, an ad server and an ad-insertion
//! service against the simulated API, renames the service, imports it back,
//! and tears everything down again.
//!
//! ```bash
//! RUST_LOG=info cargo run
//! BPKIO_CONCURRENCY=1 RUST_LOG=debug cargo run
//! ```

use bpkio_provider::lifecycle::{ApiSettings, BpkioApi};
use bpkio_provider::resources::{SERVICE_AD_INSERTION, SOURCE_AD_SERVER, SOURCE_LIVE, SOURCE_SLATE};
use reconcile_framework::{
    import_and_verify, setup_tracing, Batch, BatchReport, EngineConfig, InstanceKey, InstanceSpec,
    Reconciler, ReconciliationResult, ReferenceHandle, State, Toggle,
};
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

const SLATE: &str = "bpkio_source_slate.slate";
const LIVE: &str = "bpkio_source_live.live";
const AD_SERVER: &str = "bpkio_source_adserver.ads";
const SERVICE: &str = "bpkio_service_ad_insertion.service";

fn desired_batch() -> Batch {
    Batch::new()
        .with(InstanceSpec::new(
            SLATE,
            SOURCE_SLATE,
            State::new()
                .with("name", "demo-slate")
                .with("url", "https://bpkiosamples.s3.eu-west-1.amazonaws.com/broadpeakio-slate.jpg"),
        ))
        .with(InstanceSpec::new(
            LIVE,
            SOURCE_LIVE,
            State::new()
                .with("name", "demo-live")
                .with("url", "https://origin.broadpeak.io/bpk-tv/bpkiofficial/hlsv3/index.m3u8"),
        ))
        .with(InstanceSpec::new(
            AD_SERVER,
            SOURCE_AD_SERVER,
            State::new()
                .with("name", "demo-adserver")
                .with("url", "https://bpkiovast.s3.eu-west-1.amazonaws.com/vastmultibpkio"),
        ))
        .with(InstanceSpec::new(
            SERVICE,
            SERVICE_AD_INSERTION,
            State::new()
                .with("name", "demo-adinsertion")
                .with("source", State::new().with("id", ReferenceHandle::to(LIVE)))
                .with(
                    "live_ad_replacement",
                    State::new()
                        .with("ad_server", State::new().with("id", ReferenceHandle::to(AD_SERVER)))
                        .with("gap_filler", State::new().with("id", ReferenceHandle::to(SLATE)))
                        .with("spot_aware", Toggle::EnabledWithDefaults),
                )
                .with("transcoding_profile", State::new().with("id", 5963_i64)),
        ))
}

fn log_report(report: &BatchReport) {
    for instance in report.iter() {
        match &instance.result {
            ReconciliationResult::Success(action) => {
                info!(key = %instance.key, ?action, id = ?instance.id, "Converged")
            }
            ReconciliationResult::Failed(e) => error!(key = %instance.key, error = %e, "Failed"),
            other => error!(key = %instance.key, result = ?other, "Not converged"),
        }
    }
    info!(outcome = ?report.outcome(), instances = report.len(), "Batch finished");
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = EngineConfig::from_env().map_err(|e| e.to_string())?;
    let settings = ApiSettings::from_env().map_err(|e| e.to_string())?;
    info!(?config, ?settings, "Starting demo");

    let registry = Arc::new(bpkio_provider::resources::registry());
    let api = BpkioApi::start(settings);
    let reconciler = Reconciler::new(registry.clone(), api.gateway(registry.clone()))
        .with_options(config.reconcile_options());

    // First pass creates everything.
    let mut batch = desired_batch();
    let report = reconciler
        .reconcile(&batch)
        .instrument(info_span!("apply"))
        .await
        .map_err(|e| e.to_string())?;
    log_report(&report);
    batch.carry_forward(&report);

    // A rename is an in-place update of the service alone.
    if let Some(service) = batch.instance_mut(SERVICE) {
        service.desired.insert("name", "demo-adinsertion-renamed");
    }
    for (key, plan) in reconciler.preview(&batch).map_err(|e| e.to_string())? {
        info!(%key, plan = plan.label(), "Planned");
    }
    let report = reconciler
        .reconcile(&batch)
        .instrument(info_span!("rename"))
        .await
        .map_err(|e| e.to_string())?;
    log_report(&report);
    batch.carry_forward(&report);

    let service_id = report
        .get(&InstanceKey::new(SERVICE))
        .and_then(|instance| instance.id)
        .ok_or_else(|| "service was not created".to_string())?;
    let descriptor = registry
        .describe(SERVICE_AD_INSERTION)
        .map_err(|e| e.to_string())?;
    let (controller, imported) = import_and_verify(
        InstanceKey::new("imported.service"),
        descriptor,
        api.gateway(registry.clone()),
        service_id,
    )
    .instrument(info_span!("import"))
    .await
    .map_err(|e| e.to_string())?;
    info!(id = %service_id, phase = %controller.phase(), attributes = imported.len(), "Imported service");
    drop(controller);

    let report = reconciler
        .teardown(&batch)
        .instrument(info_span!("teardown"))
        .await
        .map_err(|e| e.to_string())?;
    log_report(&report);

    drop(reconciler);
    api.shutdown().await
}
