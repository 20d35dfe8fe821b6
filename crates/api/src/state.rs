use std::sync::Arc;

use ferrous_dns_application::ports::ConfigSource;

#[derive(Clone)]
pub struct AppState {
    pub config_source: Arc<dyn ConfigSource>,
}

impl AppState {
    pub fn new(config_source: Arc<dyn ConfigSource>) -> Self {
        Self { config_source }
    }
}
