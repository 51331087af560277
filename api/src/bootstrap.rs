use std::sync::Arc;

use account_state::InMemoryAccountStateCache;

use crate::{config::AppConfig, state::AppState};

/// Builds the one owned registry instance for this process. Handlers get
/// it injected through `AppState`; tests build their own instances.
pub fn build_state(config: &AppConfig) -> AppState {
    AppState {
        config: config.clone(),
        accounts: Arc::new(InMemoryAccountStateCache::default()),
    }
}
