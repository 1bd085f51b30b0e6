use axum::Json;

use crate::models::openai::ModelList;
use crate::services::catalog;

/// GET /v1/models
pub async fn list_models() -> Json<ModelList> {
    Json(ModelList {
        object: "list",
        data: catalog::all_models(),
    })
}
