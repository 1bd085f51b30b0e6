use std::sync::Arc;
use std::time::Instant;

use crate::services::{generation::GenerationService, ids::IdGenerator, vendor::DreaminaClient};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub generation: Arc<GenerationService>,
    /// Account helpers and result downloads that sit outside the job lifecycle.
    pub vendor: Arc<DreaminaClient>,
    pub ids: Arc<dyn IdGenerator>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(generation: GenerationService, vendor: Arc<DreaminaClient>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            generation: Arc::new(generation),
            vendor,
            ids,
            started_at: Instant::now(),
        }
    }
}
