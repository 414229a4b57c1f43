use crate::turn::Turn;
use serde::{Deserialize, Serialize};
use std::fmt;

// ===================================================================
// Message — normalized, role-tagged output unit
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Human,
    Bot,
    Debug,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Human => "HUMAN",
            Role::Bot => "BOT",
            Role::Debug => "DEBUG",
        }
    }

    /// Parse a role label as written in saved transcript dumps. Accepts the
    /// older `DEBUG (Tags)` label as well.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "HUMAN" => Some(Role::Human),
            "BOT" => Some(Role::Bot),
            "DEBUG" | "DEBUG (Tags)" => Some(Role::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// The originating turn's `startTime`, or empty when absent.
    pub timestamp: String,
}

impl Message {
    fn from_turn(role: Role, content: &str, turn: &Turn) -> Self {
        Self {
            role,
            content: content.to_string(),
            timestamp: turn.start_time().unwrap_or_default().to_string(),
        }
    }
}

// ===================================================================
// Classifier
// ===================================================================

/// Which debug turns count as category annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugFilter {
    /// A debug message matches when it contains any of these substrings.
    #[serde(default = "default_debug_markers")]
    pub debug_markers: Vec<String>,

    /// When set, the nested debug `type` must equal this (e.g. `"code"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_payload_type: Option<String>,
}

pub fn default_debug_markers() -> Vec<String> {
    vec!["CategoryFilter".into()]
}

impl Default for DebugFilter {
    fn default() -> Self {
        Self {
            debug_markers: default_debug_markers(),
            debug_payload_type: None,
        }
    }
}

impl DebugFilter {
    fn matches(&self, debug_type: Option<&str>, message: &str) -> bool {
        if let Some(want) = &self.debug_payload_type {
            if debug_type != Some(want.as_str()) {
                return false;
            }
        }
        self.debug_markers.iter().any(|m| message.contains(m.as_str()))
    }
}

/// Turns a transcript's raw turn log into an ordered list of messages.
///
/// Rules are tried per turn; a turn that matches none of them is dropped.
/// Never fails: absent payload keys simply mean "no match".
pub struct Classifier<'a> {
    filter: &'a DebugFilter,
}

impl<'a> Classifier<'a> {
    pub fn new(filter: &'a DebugFilter) -> Self {
        Self { filter }
    }

    pub fn classify(&self, turns: &[Turn]) -> Vec<Message> {
        turns.iter().filter_map(|t| self.classify_turn(t)).collect()
    }

    fn classify_turn(&self, turn: &Turn) -> Option<Message> {
        match turn {
            Turn::Request(_) => {
                let query = turn.query().filter(|q| !q.is_empty())?;
                Some(Message::from_turn(Role::Human, query, turn))
            }
            Turn::Text(_) => {
                let message = turn.bot_message()?;
                Some(Message::from_turn(Role::Bot, message, turn))
            }
            Turn::Debug(_) => {
                let body = turn.debug_body()?;
                let message = body.message.as_deref()?;
                if !self.filter.matches(body.debug_type.as_deref(), message) {
                    return None;
                }
                Some(Message::from_turn(Role::Debug, message, turn))
            }
            Turn::Other => None,
        }
    }
}

/// Number of HUMAN messages in a slice.
pub fn human_count(messages: &[Message]) -> u64 {
    messages.iter().filter(|m| m.role == Role::Human).count() as u64
}
