pub mod client;
pub mod config;
pub mod provider;
pub mod web;

use std::sync::Arc;

use actix_web::web::Data;
use tera::Tera;

use provider::GeminiClient;
use web::auth::Authenticator;

// App state structure
pub struct AppState {
    pub tera: Tera,
    pub provider: Data<GeminiClient>,
    pub authenticator: Arc<dyn Authenticator>,
}
