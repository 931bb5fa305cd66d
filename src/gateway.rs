//! # API Gateway
//!
//! [`RemoteGateway`] implementation that speaks to the broadpeak.io stores.
//! Every call goes through the same steps a real HTTP client would take:
//! encode the payload as a JSON body, let the endpoint deserialize it (a body
//! the endpoint does not accept is a 400), run the request, and decode the
//! returned object back into a [`State`].

use crate::codec::{self, CodecError};
use crate::model::{AdInsertion, AdInsertionPayload, Source, SourceKind, SourcePayload};
use crate::resources::{SERVICE_AD_INSERTION, SOURCE_AD_SERVER, SOURCE_LIVE, SOURCE_SLATE};
use async_trait::async_trait;
use reconcile_framework::{RemoteFailure, RemoteGateway, RemoteId, SchemaRegistry, State, StoreClient};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;
use std::sync::Arc;
use tracing::debug;

/// Which store and which slice of it a resource type lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Source(SourceKind),
    AdInsertion,
}

impl Endpoint {
    fn for_type(resource_type: &str) -> Result<Self, RemoteFailure> {
        match resource_type {
            SOURCE_SLATE => Ok(Endpoint::Source(SourceKind::Slate)),
            SOURCE_LIVE => Ok(Endpoint::Source(SourceKind::Live)),
            SOURCE_AD_SERVER => Ok(Endpoint::Source(SourceKind::AdServer)),
            SERVICE_AD_INSERTION => Ok(Endpoint::AdInsertion),
            other => Err(RemoteFailure::new(
                400,
                format!("Bad Request: unsupported resource type {other}"),
            )),
        }
    }
}

#[derive(Clone)]
pub struct ApiGateway {
    registry: Arc<SchemaRegistry>,
    sources: StoreClient<Source>,
    services: StoreClient<AdInsertion>,
}

impl ApiGateway {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        sources: StoreClient<Source>,
        services: StoreClient<AdInsertion>,
    ) -> Self {
        Self {
            registry,
            sources,
            services,
        }
    }

    /// Encodes `payload` as the body `resource_type`'s endpoint expects.
    fn body<P: DeserializeOwned>(
        &self,
        resource_type: &str,
        payload: &State,
        extra: Option<(&str, Json)>,
    ) -> Result<P, RemoteFailure> {
        let descriptor = self
            .registry
            .describe(resource_type)
            .map_err(|e| RemoteFailure::new(400, format!("Bad Request: {e}")))?;
        let mut body = codec::encode(&descriptor, payload).map_err(bad_request)?;
        if let (Some((field, value)), Json::Object(map)) = (extra, &mut body) {
            map.insert(field.to_string(), value);
        }
        serde_json::from_value(body).map_err(|e| RemoteFailure::new(400, format!("Bad Request: {e}")))
    }

    /// Decodes an object the API returned.
    fn observe<T: Serialize>(&self, resource_type: &str, object: &T) -> Result<State, RemoteFailure> {
        let descriptor = self
            .registry
            .describe(resource_type)
            .map_err(|e| RemoteFailure::new(502, format!("Bad Gateway: {e}")))?;
        let body = serde_json::to_value(object)
            .map_err(|e| RemoteFailure::new(502, format!("Bad Gateway: {e}")))?;
        codec::decode(&descriptor, &body).map_err(|e| RemoteFailure::new(502, format!("Bad Gateway: {e}")))
    }

    /// Fetches source `id`, treating a source of another kind as missing.
    async fn source(&self, kind: SourceKind, id: RemoteId) -> Result<Source, RemoteFailure> {
        match self.sources.get(id).await? {
            Some(source) if source.kind == kind => Ok(source),
            _ => Err(RemoteFailure::not_found(format!("{kind} source {id}"))),
        }
    }

    async fn service(&self, id: RemoteId) -> Result<AdInsertion, RemoteFailure> {
        self.services
            .get(id)
            .await?
            .ok_or_else(|| RemoteFailure::not_found(format!("service {id}")))
    }
}

fn bad_request(e: CodecError) -> RemoteFailure {
    RemoteFailure::new(400, format!("Bad Request: {e}"))
}

fn kind_field(kind: SourceKind) -> Option<(&'static str, Json)> {
    Some(("type", Json::from(kind.label())))
}

#[async_trait]
impl RemoteGateway for ApiGateway {
    async fn create(&self, resource_type: &str, payload: &State) -> Result<State, RemoteFailure> {
        debug!(resource_type, "POST");
        match Endpoint::for_type(resource_type)? {
            Endpoint::Source(kind) => {
                let body: SourcePayload = self.body(resource_type, payload, kind_field(kind))?;
                let source = self.sources.create(body).await?;
                self.observe(resource_type, &source)
            }
            Endpoint::AdInsertion => {
                let body: AdInsertionPayload = self.body(resource_type, payload, None)?;
                let service = self.services.create(body).await?;
                self.observe(resource_type, &service)
            }
        }
    }

    async fn read(&self, resource_type: &str, id: RemoteId) -> Result<State, RemoteFailure> {
        debug!(resource_type, %id, "GET");
        match Endpoint::for_type(resource_type)? {
            Endpoint::Source(kind) => {
                let source = self.source(kind, id).await?;
                self.observe(resource_type, &source)
            }
            Endpoint::AdInsertion => {
                let service = self.service(id).await?;
                self.observe(resource_type, &service)
            }
        }
    }

    async fn update(
        &self,
        resource_type: &str,
        id: RemoteId,
        payload: &State,
    ) -> Result<State, RemoteFailure> {
        debug!(resource_type, %id, "PUT");
        match Endpoint::for_type(resource_type)? {
            Endpoint::Source(kind) => {
                self.source(kind, id).await?;
                let body: SourcePayload = self.body(resource_type, payload, kind_field(kind))?;
                let source = self.sources.update(id, body).await?;
                self.observe(resource_type, &source)
            }
            Endpoint::AdInsertion => {
                let body: AdInsertionPayload = self.body(resource_type, payload, None)?;
                let service = self.services.update(id, body).await?;
                self.observe(resource_type, &service)
            }
        }
    }

    async fn delete(&self, resource_type: &str, id: RemoteId) -> Result<(), RemoteFailure> {
        debug!(resource_type, %id, "DELETE");
        match Endpoint::for_type(resource_type)? {
            Endpoint::Source(kind) => {
                self.source(kind, id).await?;
                self.sources.delete(id).await?;
            }
            Endpoint::AdInsertion => self.services.delete(id).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_catalogue_type_has_an_endpoint() {
        let registry = crate::resources::registry();
        for resource_type in registry.resource_types() {
            assert!(Endpoint::for_type(resource_type).is_ok(), "{resource_type}");
        }
        assert_eq!(Endpoint::for_type("bpkio_nope").unwrap_err().status, 400);
    }
}
