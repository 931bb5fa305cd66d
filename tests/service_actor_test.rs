use bpkio_provider::model::{AdInsertionPayload, Source, SourceKind, SourcePayload};
use reconcile_framework::store::mock::MockStore;
use reconcile_framework::{RemoteId, StoreError};

fn source(id: u64, kind: SourceKind, url: &str) -> Source {
    Source::from_payload(RemoteId(id), SourcePayload::new(kind, format!("{kind}-{id}"), url)).unwrap()
}

/// Real service store, scripted source store.
///
/// The service's reference checks run inside the store's hooks; the mock
/// answers the source lookups so no source store has to be running.
#[tokio::test]
async fn test_service_store_with_mocked_sources() {
    let mut sources = MockStore::<Source>::new();
    let live = source(10, SourceKind::Live, "https://origin.broadpeak.io/bpk-tv/bpkiofficial/hlsv3/index.m3u8");
    let ads = source(11, SourceKind::AdServer, "https://bpkiovast.s3.eu-west-1.amazonaws.com/vastmultibpkio");
    let slate = source(12, SourceKind::Slate, "https://bpkiosamples.s3.eu-west-1.amazonaws.com/broadpeakio-slate.jpg");

    // Create: source, ad server, gap filler, in that order.
    sources.expect_get(RemoteId(10)).return_ok(Some(live.clone()));
    sources.expect_get(RemoteId(11)).return_ok(Some(ads));
    sources.expect_get(RemoteId(12)).return_ok(Some(slate));
    // Update: the origin is fine, the new ad server does not exist.
    sources.expect_get(RemoteId(10)).return_ok(Some(live));
    sources.expect_get(RemoteId(99)).return_ok(None);

    let (store, services) = bpkio_provider::service_actor::new(8);
    let handle = tokio::spawn(store.run(sources.client()));

    let payload = AdInsertionPayload::new(
        "tf-acc-adinsertion",
        RemoteId(10),
        RemoteId(11),
        RemoteId(12),
        RemoteId(5963),
    );
    let created = services.create(payload.clone()).await;
    assert!(created.is_ok(), "service creation failed: {:?}", created.err());
    let created = created.unwrap();
    assert_eq!(created.url, "https://stream.broadpeak.io/ad-insertion/1/index.m3u8");

    let stored = services.get(created.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "tf-acc-adinsertion");
    assert_eq!(stored.source.id, RemoteId(10));

    let mut renamed = payload.with_ad_server(RemoteId(99));
    renamed.name = "tf-acc-adinsertion-renamed".to_string();
    match services.update(created.id, renamed).await {
        Err(StoreError::Rejected(failure)) => {
            assert_eq!(failure.status, 403);
            assert!(failure.message.contains("ad server 99"), "{}", failure.message);
        }
        other => panic!("expected a 403 rejection, got {other:?}"),
    }

    // The failed update left the stored service untouched.
    let stored = services.get(created.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "tf-acc-adinsertion");

    sources.verify();
    drop(services);
    handle.await.unwrap();
}
