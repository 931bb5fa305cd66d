//! # Mock Gateway
//!
//! [`MockGateway`] is a [`RemoteGateway`] answered from scripted expectations.
//! Every call is recorded, so tests can assert both on outcomes and on exactly
//! which remote calls the engine issued (or did not issue).
//!
//! Unlike the store mock, expectations are matched by verb, resource type and
//! identifier rather than strictly in order, since the reconciler runs
//! independent instances concurrently.
//!
//! ```ignore
//! let mut mock = MockGateway::new();
//! mock.expect_create("bpkio_source_slate").return_ok(observed_slate());
//! mock.expect_update("bpkio_service_ad_insertion", RemoteId(4)).return_ok(renamed());
//!
//! let ctrl = ResourceController::new(key, descriptor, mock.gateway());
//! // ...
//! mock.verify();
//! assert_eq!(mock.calls_of(Verb::Update).len(), 1);
//! ```

use crate::gateway::{RemoteFailure, RemoteGateway};
use crate::value::{RemoteId, State};
use async_trait::async_trait;
use std::fmt::Display;
use std::sync::{Arc, Mutex};

/// Remote lifecycle verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Read,
    Update,
    Delete,
}

impl Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Verb::Create => "create",
            Verb::Read => "read",
            Verb::Update => "update",
            Verb::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// One call received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCall {
    pub verb: Verb,
    pub resource_type: String,
    pub id: Option<RemoteId>,
    pub payload: Option<State>,
}

enum Reply {
    State(Result<State, RemoteFailure>),
    Unit(Result<(), RemoteFailure>),
}

struct Expectation {
    verb: Verb,
    resource_type: String,
    id: Option<RemoteId>,
    reply: Reply,
}

#[derive(Default)]
struct Script {
    pending: Vec<Expectation>,
    calls: Vec<GatewayCall>,
    unexpected: Vec<String>,
}

/// Scripted gateway with call recording.
#[derive(Clone, Default)]
pub struct MockGateway {
    script: Arc<Mutex<Script>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The gateway handle to pass to controllers and reconcilers.
    pub fn gateway(&self) -> Arc<dyn RemoteGateway> {
        Arc::new(self.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn expect(&mut self, verb: Verb, resource_type: &str, id: Option<RemoteId>) -> ExpectCall<'_> {
        ExpectCall {
            mock: self,
            verb,
            resource_type: resource_type.to_string(),
            id,
        }
    }

    pub fn expect_create(&mut self, resource_type: &str) -> ExpectCall<'_> {
        self.expect(Verb::Create, resource_type, None)
    }

    pub fn expect_read(&mut self, resource_type: &str, id: RemoteId) -> ExpectCall<'_> {
        self.expect(Verb::Read, resource_type, Some(id))
    }

    pub fn expect_update(&mut self, resource_type: &str, id: RemoteId) -> ExpectCall<'_> {
        self.expect(Verb::Update, resource_type, Some(id))
    }

    pub fn expect_delete(&mut self, resource_type: &str, id: RemoteId) -> ExpectCall<'_> {
        self.expect(Verb::Delete, resource_type, Some(id))
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn calls_of(&self, verb: Verb) -> Vec<GatewayCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.verb == verb)
            .cloned()
            .collect()
    }

    /// Panics if an expectation is still pending or an unscripted call arrived.
    pub fn verify(&self) {
        let script = self.lock();
        if !script.unexpected.is_empty() {
            panic!("Unexpected gateway calls: {:?}", script.unexpected);
        }
        if !script.pending.is_empty() {
            let remaining: Vec<String> = script
                .pending
                .iter()
                .map(|e| format!("{} {}", e.verb, e.resource_type))
                .collect();
            panic!("Not all expectations were met: {remaining:?}");
        }
    }

    fn answer(&self, call: GatewayCall) -> Reply {
        let mut script = self.lock();
        let position = script.pending.iter().position(|e| {
            e.verb == call.verb
                && e.resource_type == call.resource_type
                && (e.id.is_none() || e.id == call.id)
        });
        let reply = match position {
            Some(index) => script.pending.remove(index).reply,
            None => {
                let label = match call.id {
                    Some(id) => format!("{} {} {id}", call.verb, call.resource_type),
                    None => format!("{} {}", call.verb, call.resource_type),
                };
                script.unexpected.push(label);
                let failure = RemoteFailure::new(500, "unexpected call");
                match call.verb {
                    Verb::Delete => Reply::Unit(Err(failure)),
                    _ => Reply::State(Err(failure)),
                }
            }
        };
        script.calls.push(call);
        reply
    }

    fn state_reply(&self, call: GatewayCall) -> Result<State, RemoteFailure> {
        match self.answer(call) {
            Reply::State(result) => result,
            Reply::Unit(result) => result.map(|()| State::new()),
        }
    }
}

/// Builder completing one expectation.
pub struct ExpectCall<'a> {
    mock: &'a mut MockGateway,
    verb: Verb,
    resource_type: String,
    id: Option<RemoteId>,
}

impl ExpectCall<'_> {
    fn push(self, reply: Reply) {
        self.mock.lock().pending.push(Expectation {
            verb: self.verb,
            resource_type: self.resource_type,
            id: self.id,
            reply,
        });
    }

    /// Answers with `observed` (create/read/update) or success (delete).
    pub fn return_ok(self, observed: State) {
        let reply = match self.verb {
            Verb::Delete => Reply::Unit(Ok(())),
            _ => Reply::State(Ok(observed)),
        };
        self.push(reply);
    }

    /// Answers with a raw remote failure.
    pub fn return_err(self, status: u16, message: &str) {
        let failure = RemoteFailure::new(status, message);
        let reply = match self.verb {
            Verb::Delete => Reply::Unit(Err(failure)),
            _ => Reply::State(Err(failure)),
        };
        self.push(reply);
    }

    /// Shorthand for a successful delete.
    pub fn return_deleted(self) {
        self.return_ok(State::new());
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn create(&self, resource_type: &str, payload: &State) -> Result<State, RemoteFailure> {
        self.state_reply(GatewayCall {
            verb: Verb::Create,
            resource_type: resource_type.to_string(),
            id: None,
            payload: Some(payload.clone()),
        })
    }

    async fn read(&self, resource_type: &str, id: RemoteId) -> Result<State, RemoteFailure> {
        self.state_reply(GatewayCall {
            verb: Verb::Read,
            resource_type: resource_type.to_string(),
            id: Some(id),
            payload: None,
        })
    }

    async fn update(
        &self,
        resource_type: &str,
        id: RemoteId,
        payload: &State,
    ) -> Result<State, RemoteFailure> {
        self.state_reply(GatewayCall {
            verb: Verb::Update,
            resource_type: resource_type.to_string(),
            id: Some(id),
            payload: Some(payload.clone()),
        })
    }

    async fn delete(&self, resource_type: &str, id: RemoteId) -> Result<(), RemoteFailure> {
        let call = GatewayCall {
            verb: Verb::Delete,
            resource_type: resource_type.to_string(),
            id: Some(id),
            payload: None,
        };
        match self.answer(call) {
            Reply::Unit(result) => result,
            Reply::State(result) => result.map(|_| ()),
        }
    }
}
