//! # Mock Store
//!
//! [`MockStore<T>`] hands out a real [`StoreClient<T>`] whose requests are
//! answered from a queue of scripted expectations instead of a running
//! [`RemoteStore`](super::RemoteStore). Use it to test an object's hooks
//! against a dependency store without spawning that store:
//!
//! ```ignore
//! let mut sources = MockStore::<Source>::new();
//! sources.expect_get(RemoteId(7)).return_ok(Some(live_source()));
//!
//! let mut service = AdInsertion::from_create_params(RemoteId(1), params)?;
//! service.on_create(&sources.client()).await?;
//! sources.verify();
//! ```
//!
//! Expectations are consumed in order. A request that does not match the next
//! expectation is answered with a 500 rejection and remembered, so `verify`
//! fails loudly instead of the store task panicking in the background.

use super::client::StoreClient;
use super::entity::RemoteObject;
use super::error::StoreError;
use super::message::StoreRequest;
use crate::gateway::RemoteFailure;
use crate::value::RemoteId;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

enum Expectation<T: RemoteObject> {
    Get {
        id: RemoteId,
        response: Result<Option<T>, StoreError>,
    },
    Create {
        response: Result<T, StoreError>,
    },
    Update {
        id: RemoteId,
        response: Result<T, StoreError>,
    },
    Delete {
        id: RemoteId,
        response: Result<(), StoreError>,
    },
    List {
        response: Result<Vec<T>, StoreError>,
    },
}

struct Script<T: RemoteObject> {
    pending: VecDeque<Expectation<T>>,
    mismatches: Vec<String>,
}

type Shared<T> = Arc<Mutex<Script<T>>>;

/// Scripted stand-in for a [`RemoteStore`](super::RemoteStore).
pub struct MockStore<T: RemoteObject> {
    client: StoreClient<T>,
    script: Shared<T>,
    _handle: tokio::task::JoinHandle<()>,
}

impl<T: RemoteObject> Default for MockStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch() -> StoreError {
    StoreError::Rejected(RemoteFailure::new(500, "unexpected request"))
}

impl<T: RemoteObject> MockStore<T> {
    /// Creates a mock with no expectations. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<StoreRequest<T>>(100);
        let script: Shared<T> = Arc::new(Mutex::new(Script {
            pending: VecDeque::new(),
            mismatches: Vec::new(),
        }));
        let shared = script.clone();

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let mut script = shared.lock().unwrap_or_else(|e| e.into_inner());
                let next = script.pending.pop_front();

                match (request, next) {
                    (
                        StoreRequest::Get { id, respond_to },
                        Some(Expectation::Get { id: want, response }),
                    ) if id == want => {
                        let _ = respond_to.send(response);
                    }
                    (
                        StoreRequest::Create { respond_to, .. },
                        Some(Expectation::Create { response }),
                    ) => {
                        let _ = respond_to.send(response);
                    }
                    (
                        StoreRequest::Update { id, respond_to, .. },
                        Some(Expectation::Update { id: want, response }),
                    ) if id == want => {
                        let _ = respond_to.send(response);
                    }
                    (
                        StoreRequest::Delete { id, respond_to },
                        Some(Expectation::Delete { id: want, response }),
                    ) if id == want => {
                        let _ = respond_to.send(response);
                    }
                    (StoreRequest::List { respond_to }, Some(Expectation::List { response })) => {
                        let _ = respond_to.send(response);
                    }
                    (request, _) => {
                        let label = match &request {
                            StoreRequest::Create { .. } => "create".to_string(),
                            StoreRequest::Get { id, .. } => format!("get {id}"),
                            StoreRequest::Update { id, .. } => format!("update {id}"),
                            StoreRequest::Delete { id, .. } => format!("delete {id}"),
                            StoreRequest::List { .. } => "list".to_string(),
                        };
                        script.mismatches.push(label);
                        match request {
                            StoreRequest::Create { respond_to, .. } => {
                                let _ = respond_to.send(Err(mismatch()));
                            }
                            StoreRequest::Get { respond_to, .. } => {
                                let _ = respond_to.send(Err(mismatch()));
                            }
                            StoreRequest::Update { respond_to, .. } => {
                                let _ = respond_to.send(Err(mismatch()));
                            }
                            StoreRequest::Delete { respond_to, .. } => {
                                let _ = respond_to.send(Err(mismatch()));
                            }
                            StoreRequest::List { respond_to } => {
                                let _ = respond_to.send(Err(mismatch()));
                            }
                        }
                    }
                }
            }
        });

        Self {
            client: StoreClient::new(sender),
            script,
            _handle: handle,
        }
    }

    /// Client wired to this mock.
    pub fn client(&self) -> StoreClient<T> {
        self.client.clone()
    }

    fn push(&self, expectation: Expectation<T>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pending
            .push_back(expectation);
    }

    pub fn expect_get(&mut self, id: RemoteId) -> ExpectGet<'_, T> {
        ExpectGet { mock: self, id }
    }

    pub fn expect_create(&mut self) -> ExpectCreate<'_, T> {
        ExpectCreate { mock: self }
    }

    pub fn expect_update(&mut self, id: RemoteId) -> ExpectUpdate<'_, T> {
        ExpectUpdate { mock: self, id }
    }

    pub fn expect_delete(&mut self, id: RemoteId) -> ExpectDelete<'_, T> {
        ExpectDelete { mock: self, id }
    }

    pub fn expect_list(&mut self) -> ExpectList<'_, T> {
        ExpectList { mock: self }
    }

    /// Panics if an expectation is still pending or a request did not match.
    pub fn verify(&self) {
        let script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        if !script.mismatches.is_empty() {
            panic!("Unexpected requests: {:?}", script.mismatches);
        }
        if !script.pending.is_empty() {
            panic!("Not all expectations were met. {} remaining", script.pending.len());
        }
    }
}

pub struct ExpectGet<'a, T: RemoteObject> {
    mock: &'a MockStore<T>,
    id: RemoteId,
}

impl<T: RemoteObject> ExpectGet<'_, T> {
    pub fn return_ok(self, value: Option<T>) {
        self.mock.push(Expectation::Get {
            id: self.id,
            response: Ok(value),
        });
    }

    pub fn return_err(self, error: StoreError) {
        self.mock.push(Expectation::Get {
            id: self.id,
            response: Err(error),
        });
    }
}

pub struct ExpectCreate<'a, T: RemoteObject> {
    mock: &'a MockStore<T>,
}

impl<T: RemoteObject> ExpectCreate<'_, T> {
    pub fn return_ok(self, value: T) {
        self.mock.push(Expectation::Create { response: Ok(value) });
    }

    pub fn return_err(self, error: StoreError) {
        self.mock.push(Expectation::Create {
            response: Err(error),
        });
    }
}

pub struct ExpectUpdate<'a, T: RemoteObject> {
    mock: &'a MockStore<T>,
    id: RemoteId,
}

impl<T: RemoteObject> ExpectUpdate<'_, T> {
    pub fn return_ok(self, value: T) {
        self.mock.push(Expectation::Update {
            id: self.id,
            response: Ok(value),
        });
    }

    pub fn return_err(self, error: StoreError) {
        self.mock.push(Expectation::Update {
            id: self.id,
            response: Err(error),
        });
    }
}

pub struct ExpectDelete<'a, T: RemoteObject> {
    mock: &'a MockStore<T>,
    id: RemoteId,
}

impl<T: RemoteObject> ExpectDelete<'_, T> {
    pub fn return_ok(self) {
        self.mock.push(Expectation::Delete {
            id: self.id,
            response: Ok(()),
        });
    }

    pub fn return_err(self, error: StoreError) {
        self.mock.push(Expectation::Delete {
            id: self.id,
            response: Err(error),
        });
    }
}

pub struct ExpectList<'a, T: RemoteObject> {
    mock: &'a MockStore<T>,
}

impl<T: RemoteObject> ExpectList<'_, T> {
    pub fn return_ok(self, values: Vec<T>) {
        self.mock.push(Expectation::List {
            response: Ok(values),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RemoteStore;
    use async_trait::async_trait;

    #[derive(Debug, Clone, PartialEq)]
    struct Slate {
        id: RemoteId,
        name: String,
        url: String,
    }

    #[derive(Debug)]
    struct SlateCreate {
        name: String,
        url: String,
    }

    #[async_trait]
    impl RemoteObject for Slate {
        type Create = SlateCreate;
        type Update = String;
        type Context = ();

        fn from_create_params(id: RemoteId, params: SlateCreate) -> Result<Self, RemoteFailure> {
            if params.name.chars().count() > 100 {
                return Err(RemoteFailure::new(400, "Bad Request: name too long"));
            }
            Ok(Self {
                id,
                name: params.name,
                url: params.url,
            })
        }

        fn id(&self) -> RemoteId {
            self.id
        }

        fn unique_key(&self) -> Option<String> {
            Some(format!("{}|{}", self.name, self.url))
        }

        async fn on_update(&mut self, name: String, _ctx: &()) -> Result<(), RemoteFailure> {
            self.name = name;
            Ok(())
        }
    }

    fn slate(id: u64, name: &str) -> Slate {
        Slate {
            id: RemoteId(id),
            name: name.to_string(),
            url: "https://example.com/slate.jpg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_answers_in_order() {
        let mut mock = MockStore::<Slate>::new();
        mock.expect_get(RemoteId(1)).return_ok(Some(slate(1, "a")));
        mock.expect_delete(RemoteId(1))
            .return_err(StoreError::NotFound(RemoteId(1)));

        let client = mock.client();
        assert_eq!(client.get(RemoteId(1)).await.unwrap(), Some(slate(1, "a")));
        assert_eq!(
            client.delete(RemoteId(1)).await,
            Err(StoreError::NotFound(RemoteId(1)))
        );
        mock.verify();
    }

    #[tokio::test]
    #[should_panic(expected = "Unexpected requests")]
    async fn test_mock_flags_wrong_identifier() {
        let mut mock = MockStore::<Slate>::new();
        mock.expect_get(RemoteId(1)).return_ok(None);

        let _ = mock.client().get(RemoteId(2)).await;
        mock.verify();
    }

    #[tokio::test]
    async fn test_store_enforces_unique_key() {
        let (store, client) = RemoteStore::<Slate>::new(8);
        let handle = tokio::spawn(store.run(()));

        let first = client
            .create(SlateCreate {
                name: "slate".into(),
                url: "https://example.com/slate.jpg".into(),
            })
            .await
            .unwrap();
        assert_eq!(first.id, RemoteId(1));

        let dup = client
            .create(SlateCreate {
                name: "slate".into(),
                url: "https://example.com/slate.jpg".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(dup, StoreError::Rejected(ref f) if f.status == 403));

        // A rejected create does not consume an identifier.
        let second = client
            .create(SlateCreate {
                name: "other".into(),
                url: "https://example.com/slate.jpg".into(),
            })
            .await
            .unwrap();
        assert_eq!(second.id, RemoteId(2));

        let renamed = client.update(RemoteId(2), "slate".into()).await.unwrap_err();
        assert!(matches!(renamed, StoreError::Rejected(ref f) if f.status == 403));
        assert_eq!(client.get(RemoteId(2)).await.unwrap(), Some(slate(2, "other")));

        client.delete(RemoteId(1)).await.unwrap();
        assert_eq!(
            client.delete(RemoteId(1)).await,
            Err(StoreError::NotFound(RemoteId(1)))
        );
        assert_eq!(client.list().await.unwrap().len(), 1);

        drop(client);
        handle.await.unwrap();
    }
}
