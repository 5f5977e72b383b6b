//! Application state for the API server

use crate::{Config, GrabClient};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
#[derive(Clone)]
pub struct AppState {
    /// The grab client whose jobs are served
    pub client: Arc<GrabClient>,

    /// Configuration (read only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(client: Arc<GrabClient>, config: Arc<Config>) -> Self {
        Self { client, config }
    }
}
