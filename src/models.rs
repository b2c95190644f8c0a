/// Wire types shared by the RPC client and the update channel

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Requests
// ============================================================================

/// Request to create a worker or attach it to a manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    /// Port the worker serves on (0 picks a free port)
    #[serde(default)]
    pub wport: u16,
    #[serde(default)]
    pub delete_temp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Discover the manager instead of using `ip`/`port`
    #[serde(default)]
    pub zeroconf: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Connection timeout in seconds; the worker defaults to 20 when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Config that finds the manager through zeroconf discovery
    pub fn zeroconf(name: impl Into<String>) -> Self {
        Self {
            zeroconf: true,
            ..Self::new(name)
        }
    }

    /// Config that targets a manager at a fixed address
    pub fn direct(name: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: Some(ip.into()),
            port: Some(port),
            ..Self::new(name)
        }
    }
}

// ============================================================================
// Worker / node snapshots
// ============================================================================

/// Snapshot of a running worker as reported by the worker itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerState {
    pub id: String,
    pub name: String,
    pub nodes: HashMap<String, NodeState>,
    pub ip: String,
    pub port: u16,
    pub tempfolder: String,
    /// Only present on snapshots pushed by the worker UI server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_to_manager: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub id: String,
    pub name: String,
    pub port: u16,
    pub fsm: NodeFsm,
    pub registered_methods: HashMap<String, RegisteredMethod>,
    pub logdir: String,
    #[serde(alias = "diagonostics")]
    pub diagnostics: NodeDiagnostics,
}

/// Node lifecycle state. Transitions are decided by the worker; the client only observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeFsm {
    Null,
    Initialized,
    Connected,
    Ready,
    Previewing,
    Recording,
    Stopped,
    Saved,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredMethod {
    pub name: String,
    pub style: String,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDiagnostics {
    pub timestamp: String,
    pub latency: f64,
    pub payload_size: f64,
    pub memory_usage: f64,
    pub cpu_usage: f64,
    pub num_of_steps: u64,
}

// ============================================================================
// Update channel
// ============================================================================

/// Envelope of every message pushed on the updates channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEnvelope {
    pub data: serde_json::Value,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
