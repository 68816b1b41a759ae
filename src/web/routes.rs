use actix_web::web;

use crate::web::{auth, handlers};

pub fn configure(cfg: &mut web::ServiceConfig, login_path: &str) {
    cfg.service(
        web::scope("/api")
            .route("/chat", web::post().to(handlers::chat)),
    )
    .route("/", web::get().to(handlers::index))
    .route("/health", web::get().to(handlers::health_check))
    .route(login_path, web::get().to(auth::login));
}
