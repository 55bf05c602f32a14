//! Wire types for the flag channel.
//!
//! Every message is a JSON array in tagged-tuple form:
//!
//! | Message | Encoding |
//! |---------|----------|
//! | Flag request | `["get_flag_value", name, [[key, value], ...]]` |
//! | Flag response | `[["get_flag_value", name, tags], ["ok", bool]]` |
//! | Flag error | `[["get_flag_value", name, tags], ["error", reason]]` |
//! | Usage trace | `["report_trace", name, bucket_ms, count]` |

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::Result;

/// Command tag of flag evaluation requests and their echoed responses.
pub const GET_FLAG_VALUE: &str = "get_flag_value";

/// Command tag of usage trace reports.
pub const REPORT_TRACE: &str = "report_trace";

/// Ordered key/value tags sent along with a flag request.
///
/// Order matters: `[("a","1"),("b","2")]` and `[("b","2"),("a","1")]` are
/// different cache fingerprints and different correlation keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<(String, String)>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tag, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for Tags {
    fn from(tags: Vec<(K, V)>) -> Self {
        tags.into_iter().collect()
    }
}

/// Cache fingerprint for a flag lookup.
///
/// The JSON form of `[name, tags]` keeps tag order and cannot collide when
/// names or tag values contain separators.
pub fn fingerprint(name: &str, tags: &Tags) -> String {
    serde_json::to_string(&(name, tags)).unwrap_or_else(|_| name.to_string())
}

/// A `get_flag_value` request. Also the correlation key of its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlagRequest {
    pub name: String,
    pub tags: Tags,
}

impl FlagRequest {
    pub fn new(name: impl Into<String>, tags: Tags) -> Self {
        Self {
            name: name.into(),
            tags,
        }
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.name, &self.tags)
    }
}

impl Serialize for FlagRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (GET_FLAG_VALUE, &self.name, &self.tags).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FlagRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (command, name, tags) = <(String, String, Tags)>::deserialize(deserializer)?;
        if command != GET_FLAG_VALUE {
            return Err(D::Error::custom(format!(
                "expected `{}` command, found `{}`",
                GET_FLAG_VALUE, command
            )));
        }
        Ok(Self { name, tags })
    }
}

/// Result half of a flag response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagOutcome {
    Ok(bool),
    Error(String),
}

impl Serialize for FlagOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FlagOutcome::Ok(value) => ("ok", value).serialize(serializer),
            FlagOutcome::Error(reason) => ("error", reason).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FlagOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (status, payload) = <(String, Value)>::deserialize(deserializer)?;
        match status.as_str() {
            "ok" => payload
                .as_bool()
                .map(FlagOutcome::Ok)
                .ok_or_else(|| D::Error::custom("`ok` payload must be a boolean")),
            "error" => Ok(FlagOutcome::Error(match payload {
                Value::String(reason) => reason,
                other => other.to_string(),
            })),
            other => Err(D::Error::custom(format!("unknown status `{}`", other))),
        }
    }
}

/// A usage trace: how often a flag was evaluated within one reporting bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceReport {
    pub flag_name: String,
    /// Bucket boundary, epoch milliseconds.
    pub timestamp: i64,
    pub count: u64,
}

impl Serialize for TraceReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (REPORT_TRACE, &self.flag_name, self.timestamp, self.count).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TraceReport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (command, flag_name, timestamp, count) =
            <(String, String, i64, u64)>::deserialize(deserializer)?;
        if command != REPORT_TRACE {
            return Err(D::Error::custom(format!(
                "expected `{}` command, found `{}`",
                REPORT_TRACE, command
            )));
        }
        Ok(Self {
            flag_name,
            timestamp,
            count,
        })
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    FlagValue {
        request: FlagRequest,
        outcome: FlagOutcome,
    },
    /// Anything the client does not act on.
    Other(Value),
}

impl InboundMessage {
    /// Classify a decoded JSON message.
    ///
    /// Only envelopes whose first element is a `get_flag_value` tuple are
    /// parsed strictly; a malformed flag envelope is an error, while other
    /// shapes pass through as [`InboundMessage::Other`].
    pub fn decode(message: Value) -> Result<Self> {
        let is_flag_envelope = message
            .get(0)
            .and_then(|head| head.get(0))
            .and_then(Value::as_str)
            == Some(GET_FLAG_VALUE);

        if !is_flag_envelope {
            return Ok(InboundMessage::Other(message));
        }

        let (request, outcome) = serde_json::from_value::<(FlagRequest, FlagOutcome)>(message)?;
        Ok(InboundMessage::FlagValue { request, outcome })
    }
}
