use std::env;

use anyhow::{Context, Result};

/// Everything the server reads from the environment, resolved once at
/// startup. Handlers and the provider client never touch `env::var`
/// themselves.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub host: String,
    pub port: u16,
    /// Secret path that issues the auth cookie and redirects to `/`.
    pub auth_login_path: String,
    /// Value the `auth-token` cookie must carry to pass the gate.
    pub auth_cookie_value: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY must be set")?;

        let gemini_base_url = env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);

        let auth_login_path =
            env::var("AUTH_LOGIN_PATH").unwrap_or_else(|_| "/login".to_string());
        let auth_cookie_value =
            env::var("AUTH_COOKIE_VALUE").unwrap_or_else(|_| "authenticated".to_string());

        Ok(Self {
            gemini_api_key,
            gemini_base_url,
            host,
            port,
            auth_login_path,
            auth_cookie_value,
        })
    }
}
