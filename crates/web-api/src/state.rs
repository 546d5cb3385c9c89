use std::sync::Arc;

use application::TokenService;

#[derive(Clone)]
pub struct AppState {
    pub token_service: Arc<TokenService>,
}

impl AppState {
    pub fn new(token_service: Arc<TokenService>) -> Self {
        Self { token_service }
    }
}
