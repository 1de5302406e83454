use axum::response::Json;

use locus_types::NodeInfo;

/// Index handler shared by every node: `{"version": 1, "status": "running"}`.
pub async fn index_handler() -> Json<NodeInfo> {
    Json(NodeInfo::running())
}
