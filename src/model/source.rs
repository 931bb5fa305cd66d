use super::check_name;
use reconcile_framework::{RemoteFailure, RemoteId};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use url::Url;

/// Which kind of source an object is. Slates, live origins and ad servers
/// share one collection on the API side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Slate,
    Live,
    AdServer,
}

impl SourceKind {
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Slate => "slate",
            SourceKind::Live => "live",
            SourceKind::AdServer => "ad-server",
        }
    }

    /// Whether the API fetches the URL when the source is saved.
    /// Ad-server URLs are only called at playback time.
    pub fn fetches_url(self) -> bool {
        !matches!(self, SourceKind::AdServer)
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomHeader {
    pub name: String,
    pub value: String,
}

/// Settings used when the API pulls from a live origin.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Origin {
    #[serde(default)]
    pub custom_headers: Vec<CustomHeader>,
}

/// Parameter appended to ad-server requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryParameter {
    /// `from-query-parameter`, `from-variable`, `custom`...
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Body of `POST` and `PUT` on the source endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SourcePayload {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub multi_period: Option<bool>,
    #[serde(default)]
    pub origin: Option<Origin>,
    #[serde(default)]
    pub query_parameters: Option<Vec<QueryParameter>>,
}

impl SourcePayload {
    pub fn new(kind: SourceKind, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            url: url.into(),
            description: String::new(),
            multi_period: None,
            origin: None,
            query_parameters: None,
        }
    }

    /// Syntax checks that do not need to look anything up.
    fn check(&self) -> Result<(), RemoteFailure> {
        check_name(&self.name)?;
        if host(&self.url).is_none() {
            return Err(RemoteFailure::new(
                400,
                format!("Bad Request: url {:?} is not a valid URL", self.url),
            ));
        }
        let unsupported = match self.kind {
            SourceKind::Live => self.query_parameters.as_ref().map(|_| "queryParameters"),
            SourceKind::Slate => self
                .multi_period
                .map(|_| "multiPeriod")
                .or(self.origin.as_ref().map(|_| "origin"))
                .or(self.query_parameters.as_ref().map(|_| "queryParameters")),
            SourceKind::AdServer => self
                .multi_period
                .map(|_| "multiPeriod")
                .or(self.origin.as_ref().map(|_| "origin")),
        };
        match unsupported {
            Some(field) => Err(RemoteFailure::new(
                400,
                format!("Bad Request: {field} is not supported for {} sources", self.kind),
            )),
            None => Ok(()),
        }
    }
}

/// A stored source as the API returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: RemoteId,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub name: String,
    pub url: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_period: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_parameters: Option<Vec<QueryParameter>>,
}

impl Source {
    /// Validates `payload` and builds the stored representation, filling in
    /// the fields the API computes.
    pub fn from_payload(id: RemoteId, payload: SourcePayload) -> Result<Self, RemoteFailure> {
        payload.check()?;
        let mut source = Self {
            id,
            kind: payload.kind,
            name: String::new(),
            url: String::new(),
            description: String::new(),
            format: None,
            multi_period: None,
            origin: None,
            query_parameters: None,
        };
        source.assign(payload);
        Ok(source)
    }

    /// Replaces every settable field with the payload's.
    pub fn apply(&mut self, payload: SourcePayload) -> Result<(), RemoteFailure> {
        if payload.kind != self.kind {
            return Err(RemoteFailure::new(
                400,
                format!("Bad Request: source {} is a {} source, not {}", self.id, self.kind, payload.kind),
            ));
        }
        payload.check()?;
        self.assign(payload);
        Ok(())
    }

    fn assign(&mut self, payload: SourcePayload) {
        self.format = match self.kind {
            SourceKind::Live => Some(stream_format(&payload.url).to_string()),
            SourceKind::Slate => Some(extension(&payload.url).unwrap_or_else(|| "unknown".to_string())),
            SourceKind::AdServer => None,
        };
        match self.kind {
            SourceKind::Live => {
                self.multi_period = Some(payload.multi_period.unwrap_or(false));
                self.origin = payload.origin;
            }
            SourceKind::AdServer => {
                self.query_parameters = Some(payload.query_parameters.unwrap_or_default());
            }
            SourceKind::Slate => {}
        }
        self.name = payload.name;
        self.url = payload.url;
        self.description = payload.description;
    }

    pub fn host(&self) -> Option<String> {
        host(&self.url)
    }
}

/// Parses an absolute URL, keeping only the `http(s)` schemes the API fetches.
fn parse(url: &str) -> Option<Url> {
    Url::parse(url)
        .ok()
        .filter(|parsed| matches!(parsed.scheme(), "http" | "https"))
}

/// Host part of an absolute `http(s)` URL, lower-cased.
pub fn host(url: &str) -> Option<String> {
    parse(url)?.host_str().map(str::to_string)
}

/// Last path segment of an absolute `http(s)` URL, if it is not empty.
pub fn file_name(url: &str) -> Option<String> {
    let parsed = parse(url)?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty()).then(|| last.to_string())
}

/// Lower-cased extension of the URL's last path segment.
fn extension(url: &str) -> Option<String> {
    let file = file_name(url)?;
    let (_, ext) = file.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

fn stream_format(url: &str) -> &'static str {
    match extension(url).as_deref() {
        Some("mpd") => "dash",
        Some("ism") | Some("isml") => "mss",
        _ => "hls",
    }
}
