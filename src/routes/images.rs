use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::models::openai::{wants_base64, ImageGenerationRequest, MediaData, MediaResponse};
use crate::routes::auth::BearerTokens;
use crate::routes::error::validated;
use crate::services::classifier::ApiError;
use crate::services::generation::{Generated, ImageRequest};

/// POST /v1/images/generations
pub async fn create_images(
    State(state): State<AppState>,
    tokens: BearerTokens,
    payload: Result<Json<ImageGenerationRequest>, JsonRejection>,
) -> Result<Json<MediaResponse>, ApiError> {
    let body = validated(payload)?;
    let request = ImageRequest {
        model: body.model,
        prompt: body.prompt,
        negative_prompt: body.negative_prompt,
        ratio: body.ratio,
        resolution: body.resolution,
        sample_strength: body.sample_strength,
        intelligent_ratio: body.intelligent_ratio,
    };

    let generated = state
        .generation
        .generate_images(&request, tokens.pick(), None)
        .await?;
    let Generated::Images { mut urls, .. } = generated else {
        return Err(ApiError::generation_failed("image job produced a video result"));
    };
    if let Some(n) = body.n {
        urls.truncate(n);
    }

    let data = media_data(&state, urls, wants_base64(body.response_format.as_deref())).await?;
    Ok(Json(MediaResponse {
        created: chrono::Utc::now().timestamp(),
        data,
    }))
}

/// Result URLs as response entries, downloaded and encoded when the caller
/// asked for `b64_json`.
pub(crate) async fn media_data(state: &AppState, urls: Vec<String>, base64: bool) -> Result<Vec<MediaData>, ApiError> {
    if !base64 {
        return Ok(urls
            .into_iter()
            .map(|url| MediaData {
                url: Some(url),
                b64_json: None,
                revised_prompt: None,
            })
            .collect());
    }

    let downloads = urls.iter().map(|url| state.vendor.fetch_base64(url));
    futures::future::try_join_all(downloads)
        .await
        .map(|encoded| {
            encoded
                .into_iter()
                .map(|b64_json| MediaData {
                    url: None,
                    b64_json: Some(b64_json),
                    revised_prompt: None,
                })
                .collect()
        })
}
