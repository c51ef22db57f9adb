// Wire types shared between the subscription manager, the dispatch engine
// and the downstream command sink.
use serde::{Deserialize, Serialize};
use std::fmt;

/// One batch of timestamped path/value updates from the upstream stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryDelta {
    pub context: String,
    #[serde(default)]
    pub updates: Vec<TelemetryUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryUpdate {
    pub source: String,
    pub timestamp: i64,
    #[serde(default)]
    pub values: Vec<TelemetryValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryValue {
    pub path: String,
    pub value: serde_json::Value,
}

/// Per-path delivery settings carried in a subscribe request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSubscription {
    pub path: String,
    pub period: u32,
    pub format: String,
    pub policy: String,
    #[serde(rename = "minPeriod")]
    pub min_period: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub context: String,
    pub subscribe: Vec<PathSubscription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribePattern {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    pub context: String,
    pub unsubscribe: Vec<UnsubscribePattern>,
}

impl UnsubscribeRequest {
    /// The wildcard unsubscribe sent before every fresh subscription.
    pub fn all() -> Self {
        Self {
            context: "*".to_string(),
            unsubscribe: vec![UnsubscribePattern {
                path: "*".to_string(),
            }],
        }
    }
}

/// One line of the downstream textual command protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Change {
        object_id: u16,
        instance_id: u16,
        resource_id: u16,
        value: serde_json::Value,
    },
    Update {
        server_id: u16,
    },
    Ls,
    Quit,
}

impl Command {
    pub fn change(
        object_id: u16,
        instance_id: u16,
        resource_id: u16,
        value: serde_json::Value,
    ) -> Self {
        Command::Change {
            object_id,
            instance_id,
            resource_id,
            value,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Change {
                object_id,
                instance_id,
                resource_id,
                value,
            } => write!(
                f,
                "change /{}/{}/{} {}",
                object_id,
                instance_id,
                resource_id,
                render_value(value)
            ),
            Command::Update { server_id } => write!(f, "update {}", server_id),
            Command::Ls => write!(f, "ls"),
            Command::Quit => write!(f, "quit"),
        }
    }
}

// Strings go on the wire unquoted; everything else keeps its JSON form.
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
