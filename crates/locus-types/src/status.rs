use serde::{Deserialize, Serialize};

/// Version reported by every node at `/`.
pub const NODE_VERSION: u64 = 1;

/// State a node reports at `/`. A node only answers once it is serving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Running,
}

/// Index document: `{"version": 1, "status": "running"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub version: u64,
    pub status: ServerStatus,
}

impl NodeInfo {
    pub fn running() -> Self {
        Self { version: NODE_VERSION, status: ServerStatus::Running }
    }
}
