use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::models::openai::{TokenCheckRequest, TokenCheckResponse, TokenPoints};
use crate::routes::auth::BearerTokens;
use crate::routes::error::validated;
use crate::services::classifier::ApiError;

/// POST /token/check: whether the vendor still accepts a session token.
pub async fn check_token(
    State(state): State<AppState>,
    payload: Result<Json<TokenCheckRequest>, JsonRejection>,
) -> Result<Json<TokenCheckResponse>, ApiError> {
    let body = validated(payload)?;
    let live = state.vendor.token_live(body.token.trim()).await?;
    Ok(Json(TokenCheckResponse { live }))
}

/// POST /token/points: credit balance for every token in the Authorization header.
///
/// One failing token does not fail the batch; its entry carries the error.
pub async fn token_points(State(state): State<AppState>, tokens: BearerTokens) -> Json<Vec<TokenPoints>> {
    let lookups = tokens.all().iter().map(|token| {
        let vendor = &state.vendor;
        async move {
            match vendor.get_credit(token).await {
                Ok(points) => TokenPoints {
                    token: token.clone(),
                    points: Some(points),
                    error: None,
                },
                Err(err) => {
                    tracing::warn!(kind = %err.kind, error = %err.message, "Credit lookup failed");
                    TokenPoints {
                        token: token.clone(),
                        points: None,
                        error: Some(err.to_string()),
                    }
                }
            }
        }
    });
    Json(futures::future::join_all(lookups).await)
}
