use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::models::openai::{wants_base64, MediaResponse, VideoGenerationRequest};
use crate::routes::auth::BearerTokens;
use crate::routes::error::validated;
use crate::routes::images::media_data;
use crate::services::classifier::ApiError;
use crate::services::generation::{Generated, VideoRequest};

/// POST /v1/videos/generations
pub async fn create_video(
    State(state): State<AppState>,
    tokens: BearerTokens,
    payload: Result<Json<VideoGenerationRequest>, JsonRejection>,
) -> Result<Json<MediaResponse>, ApiError> {
    let body = validated(payload)?;
    let prompt = body.prompt.clone();
    let request = VideoRequest {
        model: body.model,
        prompt: body.prompt,
        ratio: body.ratio,
        resolution: body.resolution,
        duration: body.duration,
    };

    let generated = state
        .generation
        .generate_video(&request, tokens.pick(), None)
        .await?;
    let Generated::Video { url, .. } = generated else {
        return Err(ApiError::generation_failed("video job produced an image result"));
    };

    let mut data = media_data(&state, vec![url], wants_base64(body.response_format.as_deref())).await?;
    for entry in &mut data {
        entry.revised_prompt = Some(prompt.clone());
    }
    Ok(Json(MediaResponse {
        created: chrono::Utc::now().timestamp(),
        data,
    }))
}
