use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use rand::seq::SliceRandom;

use crate::services::classifier::ApiError;

/// Session tokens from `Authorization: Bearer tok1,tok2,...`.
#[derive(Debug, Clone)]
pub struct BearerTokens {
    tokens: Vec<String>,
}

impl BearerTokens {
    pub fn parse(header: &str) -> Result<Self, ApiError> {
        let raw = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .unwrap_or(header);
        let tokens: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();
        if tokens.is_empty() {
            return Err(ApiError::unauthorized("no session token in Authorization header"));
        }
        Ok(Self { tokens })
    }

    /// One token, chosen at random to spread load across accounts.
    pub fn pick(&self) -> &str {
        self.tokens
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn all(&self) -> &[String] {
        &self.tokens
    }
}

impl<S> FromRequestParts<S> for BearerTokens
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| ApiError::unauthorized("missing Authorization header"))?
            .to_str()
            .map_err(|_| ApiError::unauthorized("Authorization header is not valid text"))?;

        let tokens = Self::parse(header)?;
        tracing::debug!(count = tokens.tokens.len(), "Extracted session tokens");
        Ok(tokens)
    }
}
