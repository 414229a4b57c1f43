use serde::{Deserialize, Deserializer};
use serde_json::Value;

// ===================================================================
// Turn — one raw event in a transcript's turn log
// ===================================================================

/// A single event in a transcript turn log as returned by the transcripts API.
///
/// Discriminated by the `type` field. Only the three kinds we classify are
/// typed; everything else (`launch`, `block`, `choice`, `end`, ...) lands in
/// `Other`. Payload fields are all optional: the API does not keep the
/// nested shape stable across turn kinds, and a missing key must never be
/// an error.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum Turn {
    #[serde(rename = "request")]
    Request(RequestTurn),
    #[serde(rename = "text")]
    Text(TextTurn),
    #[serde(rename = "debug")]
    Debug(DebugTurn),
    #[serde(other)]
    Other,
}

/// Coarse turn kind, independent of payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Request,
    Text,
    Debug,
    Other,
}

// ===================================================================
// Request turns (user input)
// ===================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTurn {
    #[serde(default, deserialize_with = "opaque_string")]
    pub start_time: Option<String>,
    #[serde(default)]
    pub payload: Option<RequestPayload>,
}

#[derive(Debug, Deserialize)]
pub struct RequestPayload {
    #[serde(default)]
    pub payload: Option<RequestBody>,
}

#[derive(Debug, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub query: Option<String>,
}

// ===================================================================
// Text turns (bot replies)
// ===================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextTurn {
    #[serde(default, deserialize_with = "opaque_string")]
    pub start_time: Option<String>,
    #[serde(default)]
    pub payload: Option<TextPayload>,
}

#[derive(Debug, Deserialize)]
pub struct TextPayload {
    #[serde(default)]
    pub payload: Option<TextBody>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub message: Option<String>,
}

// ===================================================================
// Debug turns (runtime annotations, where category tags live)
// ===================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugTurn {
    #[serde(default, deserialize_with = "opaque_string")]
    pub start_time: Option<String>,
    #[serde(default)]
    pub payload: Option<DebugPayload>,
}

#[derive(Debug, Deserialize)]
pub struct DebugPayload {
    #[serde(default)]
    pub payload: Option<DebugBody>,
}

#[derive(Debug, Deserialize)]
pub struct DebugBody {
    /// e.g. `code`, `api`, `flow`
    #[serde(default, rename = "type", deserialize_with = "opaque_string")]
    pub debug_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Accept any JSON scalar where a string is expected. Numbers and booleans
/// keep their JSON text; `null`, arrays and objects read as absent.
fn opaque_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
        _ => None,
    })
}

impl Turn {
    pub fn kind(&self) -> TurnKind {
        match self {
            Self::Request(_) => TurnKind::Request,
            Self::Text(_) => TurnKind::Text,
            Self::Debug(_) => TurnKind::Debug,
            Self::Other => TurnKind::Other,
        }
    }

    /// The turn's `startTime`, if the turn kind carries one and it is present.
    pub fn start_time(&self) -> Option<&str> {
        match self {
            Self::Request(t) => t.start_time.as_deref(),
            Self::Text(t) => t.start_time.as_deref(),
            Self::Debug(t) => t.start_time.as_deref(),
            Self::Other => None,
        }
    }

    /// `payload.payload.query` on request turns.
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Request(t) => t
                .payload
                .as_ref()
                .and_then(|p| p.payload.as_ref())
                .and_then(|b| b.query.as_deref()),
            _ => None,
        }
    }

    /// `payload.payload.message` on text turns.
    pub fn bot_message(&self) -> Option<&str> {
        match self {
            Self::Text(t) => t
                .payload
                .as_ref()
                .and_then(|p| p.payload.as_ref())
                .and_then(|b| b.message.as_deref()),
            _ => None,
        }
    }

    /// The nested body of a debug turn, if present.
    pub fn debug_body(&self) -> Option<&DebugBody> {
        match self {
            Self::Debug(t) => t.payload.as_ref().and_then(|p| p.payload.as_ref()),
            _ => None,
        }
    }

    /// Decode a turn log (the JSON array returned for one transcript).
    ///
    /// Each element is decoded independently; elements that don't fit any
    /// known shape are skipped and reported with their 0-based index so a
    /// single odd turn never loses the rest of the transcript.
    pub fn parse_all(values: Vec<Value>) -> (Vec<Turn>, Vec<(usize, String)>) {
        let mut turns = Vec::with_capacity(values.len());
        let mut errors = Vec::new();
        for (i, val) in values.into_iter().enumerate() {
            match serde_json::from_value::<Turn>(val) {
                Ok(turn) => turns.push(turn),
                Err(e) => errors.push((i, format!("{e}"))),
            }
        }
        (turns, errors)
    }
}
