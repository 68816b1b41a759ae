use actix_files as fs;
use actix_web::{web::Data, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use tera::Tera;

use gemini_web_chat::config::AppConfig;
use gemini_web_chat::provider::GeminiClient;
use gemini_web_chat::web::auth::{CookieAuthenticator, LoginToken};
use gemini_web_chat::web::routes;
use gemini_web_chat::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Gemini web chat");

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // The provider client is built once and injected; handlers never read
    // credentials themselves.
    let provider = Data::new(GeminiClient::from_config(&config));

    // Initialize template engine
    let mut tera = match Tera::new("templates/**/*") {
        Ok(t) => t,
        Err(e) => {
            error!("Template parsing error: {}", e);
            std::process::exit(1);
        }
    };
    tera.autoescape_on(vec![".html", ".sql"]);

    let authenticator = Arc::new(CookieAuthenticator::new(config.auth_cookie_value.clone()));
    let app_state = Data::new(AppState {
        tera,
        provider: provider.clone(),
        authenticator,
    });
    let login_token = Data::new(LoginToken(config.auth_cookie_value.clone()));
    let login_path = config.auth_login_path.clone();

    info!("Listening on {}:{}", config.host, config.port);

    // Start web server
    HttpServer::new(move || {
        let login_path = login_path.clone();
        App::new()
            .app_data(app_state.clone())
            .app_data(provider.clone())
            .app_data(login_token.clone())
            .configure(move |cfg| routes::configure(cfg, &login_path))
            .service(fs::Files::new("/static", "./static"))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
