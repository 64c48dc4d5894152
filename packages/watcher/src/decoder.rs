//! Payload Decoder
//!
//! Decodes the opaque `json` string of a podping operation into one canonical
//! `PingRecord`, folding the schema variants (single `url`, `urls` list,
//! version 1.0 `iris`) together. Diagnostic posts have their own decode path.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Reason reported when the payload does not carry medium/reason fields
pub const DEFAULT_MEDIUM_REASON: &str = "podcast update";

/// Payload version that carries URLs in `iris`
pub const IRIS_VERSION: &str = "1.0";

/// Errors that can occur while decoding a payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Malformed JSON payload: {0}")]
    Json(String),

    #[error("Payload is not a JSON object")]
    NotAnObject,
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Json(err.to_string())
    }
}

/// Wire shape of a ping payload; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPing {
    version: Option<Value>,
    url: Option<String>,
    urls: Option<Vec<String>>,
    iris: Option<Vec<String>>,
    medium: Option<String>,
    reason: Option<String>,
}

/// Decoded podping with normalised URL fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingRecord {
    /// Payload schema version, empty when absent
    pub version: String,
    /// Single feed URL (pre-1.0 single-URL schema)
    pub url: Option<String>,
    /// Feed URLs in payload order
    pub urls: Vec<String>,
    /// Always equal to `urls.len()`
    pub num_urls: usize,
    /// "<medium> <reason>" for 1.0 payloads, otherwise the default reason
    pub medium_reason: String,
    pub medium: Option<String>,
    pub reason: Option<String>,
}

impl PingRecord {
    /// URLs this ping announces: the single `url` if set, otherwise `urls`
    pub fn feed_urls(&self) -> Vec<&str> {
        match &self.url {
            Some(url) => vec![url.as_str()],
            None => self.urls.iter().map(String::as_str).collect(),
        }
    }
}

/// Diagnostic message posted by a podping server
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticRecord {
    pub server_account: Option<String>,
    pub message: Option<String>,
    /// The full payload, kept for pretty logging
    pub body: Value,
}

/// Decode a ping payload
///
/// # Arguments
/// * `raw_json` - The `json` field of the operation
///
/// # Returns
/// A `PingRecord` with `num_urls == urls.len()`
pub fn decode(raw_json: &str) -> Result<PingRecord, DecodeError> {
    let value: Value = serde_json::from_str(raw_json)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    let raw: RawPing = serde_json::from_value(value)?;
    // Only the string form selects the iris layout
    let is_iris = matches!(&raw.version, Some(Value::String(v)) if v == IRIS_VERSION);
    let version = raw.version.as_ref().map(version_text).unwrap_or_default();

    let mut medium_reason = DEFAULT_MEDIUM_REASON.to_string();
    let mut urls = raw.urls.unwrap_or_default();

    if is_iris {
        if let Some(iris) = raw.iris.filter(|iris| !iris.is_empty()) {
            urls = iris;
            let joined = join_medium_reason(raw.medium.as_deref(), raw.reason.as_deref());
            if let Some(joined) = joined {
                medium_reason = joined;
            }
        }
    }

    Ok(PingRecord {
        version,
        url: raw.url,
        num_urls: urls.len(),
        urls,
        medium_reason,
        medium: raw.medium,
        reason: raw.reason,
    })
}

// Some writers post the version as a bare number; it is kept for display only
fn version_text(version: &Value) -> String {
    match version {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn join_medium_reason(medium: Option<&str>, reason: Option<&str>) -> Option<String> {
    match (medium, reason) {
        (Some(m), Some(r)) => Some(format!("{} {}", m, r)),
        (Some(part), None) | (None, Some(part)) => Some(part.to_string()),
        (None, None) => None,
    }
}

/// Decode a diagnostic payload; URL fields are ignored
pub fn decode_diagnostic(raw_json: &str) -> Result<DiagnosticRecord, DecodeError> {
    let body: Value = serde_json::from_str(raw_json)?;
    let object = body.as_object().ok_or(DecodeError::NotAnObject)?;

    let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

    Ok(DiagnosticRecord {
        server_account: text("server_account"),
        message: text("message"),
        body,
    })
}

/// Byte length of a payload as posted on chain
pub fn post_bytes(raw_json: &str) -> u64 {
    raw_json.len() as u64
}
