use async_trait::async_trait;
use reconcile_framework::mock::{MockGateway, Verb};
use reconcile_framework::{
    Action, AttributeSpec, Batch, InstanceSpec, Reconciler, ReferenceHandle, RemoteFailure, RemoteId,
    RemoteObject, RemoteStore, ResourceDescriptor, SchemaRegistry, Shape, State, StoreError, Value,
};
use std::sync::Arc;

// --- Test Object ---

#[derive(Clone, Debug, PartialEq)]
struct Channel {
    id: RemoteId,
    name: String,
}

#[derive(Debug)]
struct ChannelCreate {
    name: String,
}

#[derive(Debug)]
struct ChannelUpdate {
    name: String,
}

#[async_trait]
impl RemoteObject for Channel {
    type Create = ChannelCreate;
    type Update = ChannelUpdate;
    type Context = ();

    fn from_create_params(id: RemoteId, params: ChannelCreate) -> Result<Self, RemoteFailure> {
        if params.name.is_empty() {
            return Err(RemoteFailure::new(400, "Bad Request: name is empty"));
        }
        Ok(Self { id, name: params.name })
    }

    fn id(&self) -> RemoteId {
        self.id
    }

    fn unique_key(&self) -> Option<String> {
        Some(format!("channel {:?}", self.name))
    }

    async fn on_update(&mut self, update: ChannelUpdate, _ctx: &()) -> Result<(), RemoteFailure> {
        if update.name.is_empty() {
            return Err(RemoteFailure::new(400, "Bad Request: name is empty"));
        }
        self.name = update.name;
        Ok(())
    }
}

#[tokio::test]
async fn test_store_lifecycle() {
    let (store, client) = RemoteStore::<Channel>::new(10);
    let handle = tokio::spawn(store.run(()));

    let created = client
        .create(ChannelCreate { name: "news".into() })
        .await
        .unwrap();
    assert_eq!(created.id, RemoteId(1));

    let fetched = client.get(created.id).await.unwrap();
    assert_eq!(fetched, Some(created.clone()));

    // A second object with the same unique key is refused.
    let clash = client.create(ChannelCreate { name: "news".into() }).await;
    assert!(matches!(clash, Err(StoreError::Rejected(ref f)) if f.status == 403));

    // A rejected update leaves the object alone.
    let rejected = client
        .update(created.id, ChannelUpdate { name: String::new() })
        .await;
    assert!(matches!(rejected, Err(StoreError::Rejected(ref f)) if f.status == 400));
    assert_eq!(client.get(created.id).await.unwrap().unwrap().name, "news");

    let renamed = client
        .update(created.id, ChannelUpdate { name: "sports".into() })
        .await
        .unwrap();
    assert_eq!(renamed.name, "sports");

    client.delete(created.id).await.unwrap();
    assert_eq!(client.get(created.id).await.unwrap(), None);
    assert_eq!(client.delete(created.id).await, Err(StoreError::NotFound(created.id)));
    assert!(client.list().await.unwrap().is_empty());

    drop(client);
    handle.await.unwrap();
}

fn registry() -> SchemaRegistry {
    let id_block = ResourceDescriptor::new("ref").with_attribute(AttributeSpec::required("id", Shape::Int));
    SchemaRegistry::new()
        .with(
            ResourceDescriptor::new("origin")
                .with_attribute(AttributeSpec::computed("id", Shape::Int))
                .with_attribute(AttributeSpec::required("name", Shape::String)),
        )
        .with(
            ResourceDescriptor::new("channel")
                .with_attribute(AttributeSpec::computed("id", Shape::Int))
                .with_attribute(AttributeSpec::required("name", Shape::String))
                .with_attribute(AttributeSpec::required("origin", Shape::object(id_block)).immutable()),
        )
}

/// Real reconciler, scripted gateway: the channel is only created once the
/// origin's identifier is known, and is sent that identifier.
#[tokio::test]
async fn test_reconciler_with_mocked_gateway() {
    let mut mock = MockGateway::new();
    mock.expect_create("origin")
        .return_ok(State::new().with("id", 7_i64).with("name", "o"));
    mock.expect_create("channel").return_ok(
        State::new()
            .with("id", 8_i64)
            .with("name", "c")
            .with("origin", State::new().with("id", 7_i64)),
    );

    let reconciler = Reconciler::new(Arc::new(registry()), mock.gateway());
    let batch = Batch::new()
        .with(InstanceSpec::new(
            "channel.c",
            "channel",
            State::new()
                .with("name", "c")
                .with("origin", State::new().with("id", ReferenceHandle::to("origin.o"))),
        ))
        .with(InstanceSpec::new("origin.o", "origin", State::new().with("name", "o")));

    let report = reconciler.reconcile(&batch).await.unwrap();

    assert!(report.is_success(), "{report:?}");
    mock.verify();
    let creates = mock.calls_of(Verb::Create);
    assert_eq!(creates.len(), 2);
    assert_eq!(creates[0].resource_type, "origin");
    let payload = creates[1].payload.clone().unwrap();
    assert_eq!(payload.lookup("origin.id"), Some(&Value::Int(7)));
    assert!(report
        .iter()
        .all(|instance| instance.result.action() == Some(Action::Created)));
}
