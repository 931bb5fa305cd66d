use super::check_name;
use reconcile_framework::{RemoteFailure, RemoteId};
use serde::{Deserialize, Serialize};

/// Value of the `type` field on ad-insertion services.
pub const AD_INSERTION_TYPE: &str = "ad-insertion";

/// Spot-aware mode that means the feature is off.
pub const SPOT_AWARE_DISABLED: &str = "disabled";

/// `{ "id": ... }` pointer to another API object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdRef {
    pub id: RemoteId,
}

impl IdRef {
    pub fn new(id: impl Into<RemoteId>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpotAware {
    pub mode: String,
}

impl Default for SpotAware {
    fn default() -> Self {
        Self {
            mode: SPOT_AWARE_DISABLED.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LiveAdReplacement {
    pub ad_server: IdRef,
    pub gap_filler: IdRef,
    #[serde(default)]
    pub spot_aware: SpotAware,
}

impl LiveAdReplacement {
    pub fn new(ad_server: RemoteId, gap_filler: RemoteId) -> Self {
        Self {
            ad_server: IdRef { id: ad_server },
            gap_filler: IdRef { id: gap_filler },
            spot_aware: SpotAware::default(),
        }
    }
}

/// Body of `POST` and `PUT` on the ad-insertion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AdInsertionPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source: IdRef,
    pub live_ad_replacement: LiveAdReplacement,
    pub transcoding_profile: IdRef,
    #[serde(default)]
    pub enable_ad_transcoding: bool,
}

impl AdInsertionPayload {
    pub fn new(
        name: impl Into<String>,
        source: RemoteId,
        ad_server: RemoteId,
        gap_filler: RemoteId,
        transcoding_profile: RemoteId,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            source: IdRef { id: source },
            live_ad_replacement: LiveAdReplacement::new(ad_server, gap_filler),
            transcoding_profile: IdRef { id: transcoding_profile },
            enable_ad_transcoding: false,
        }
    }

    pub fn with_ad_server(mut self, ad_server: RemoteId) -> Self {
        self.live_ad_replacement.ad_server = IdRef { id: ad_server };
        self
    }
}

/// A stored ad-insertion service as the API returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdInsertion {
    pub id: RemoteId,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub source: IdRef,
    pub live_ad_replacement: LiveAdReplacement,
    pub transcoding_profile: IdRef,
    pub enable_ad_transcoding: bool,
    /// Playback URL, assigned once the source is known.
    pub url: String,
}

impl AdInsertion {
    pub fn from_payload(id: RemoteId, payload: AdInsertionPayload) -> Result<Self, RemoteFailure> {
        check_name(&payload.name)?;
        Ok(Self {
            id,
            kind: AD_INSERTION_TYPE.to_string(),
            name: payload.name,
            description: payload.description,
            source: payload.source,
            live_ad_replacement: payload.live_ad_replacement,
            transcoding_profile: payload.transcoding_profile,
            enable_ad_transcoding: payload.enable_ad_transcoding,
            url: String::new(),
        })
    }

    /// Applies a `PUT`. The source cannot be swapped on an existing service.
    pub fn apply(&mut self, payload: AdInsertionPayload) -> Result<(), RemoteFailure> {
        check_name(&payload.name)?;
        if payload.source != self.source {
            return Err(RemoteFailure::new(
                400,
                format!(
                    "Bad Request: the source of service {} cannot be changed from {} to {}",
                    self.id, self.source.id, payload.source.id
                ),
            ));
        }
        self.name = payload.name;
        self.description = payload.description;
        self.live_ad_replacement = payload.live_ad_replacement;
        self.transcoding_profile = payload.transcoding_profile;
        self.enable_ad_transcoding = payload.enable_ad_transcoding;
        Ok(())
    }

    /// Every source id this service points at, with the role it plays.
    pub fn source_refs(&self) -> Vec<(&'static str, RemoteId)> {
        vec![
            ("source", self.source.id),
            ("ad server", self.live_ad_replacement.ad_server.id),
            ("gap filler", self.live_ad_replacement.gap_filler.id),
        ]
    }
}
