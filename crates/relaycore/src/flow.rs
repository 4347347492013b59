use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw entry in an externally supplied flow definition.
///
/// Flow definitions arrive as a flat JSON array mixing processing nodes with
/// editor artifacts (`tab` containers, wire-less comment records). Every
/// field beyond the known ones is collected into `config` and handed to the
/// node's handler untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wires: Option<Vec<String>>,

    #[serde(flatten)]
    pub config: Map<String, Value>,
}

/// Validated processing node in a flow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,

    /// Handler type identifier. For the socket transport this doubles as the
    /// network target host.
    #[serde(rename = "type")]
    pub kind: String,

    /// Successor node ids, in forwarding order. Empty for tail nodes.
    pub wires: Vec<String>,

    /// Arbitrary handler configuration.
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            wires: Vec::new(),
            config: Map::new(),
        }
    }

    pub fn with_wires<I, S>(mut self, wires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wires = wires.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    pub fn is_tail(&self) -> bool {
        self.wires.is_empty()
    }
}
