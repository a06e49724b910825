//! Shared state handed to every handler.

use std::time::Instant;

use reportflow::Services;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            started_at: Instant::now(),
        }
    }
}
