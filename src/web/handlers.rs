use actix_web::{web, HttpRequest, HttpResponse, Responder};
use bytes::Bytes;
use futures_util::StreamExt;
use log::{error, info};
use serde_json::json;
use tera::Context;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::provider::ProviderError;
use crate::web::auth;
use crate::web::models::{done_frame, ChatRequest, StreamEvent};
use crate::AppState;

// Index page handler
pub async fn index(data: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if !data.authenticator.authenticate(&req) {
        return auth::denied();
    }
    let context = Context::new();
    match data.tera.render("index.html", &context) {
        Ok(html) => HttpResponse::Ok().content_type("text/html").body(html),
        Err(e) => {
            error!("Template error: {}", e);
            HttpResponse::InternalServerError().body("Template error")
        }
    }
}

// Health check endpoint
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Chat relay endpoint. Validates the turn, opens one streaming call to
/// the provider, and re-emits each text fragment as a wire frame followed
/// by the terminal sentinel.
pub async fn chat(
    data: web::Data<AppState>,
    http_req: HttpRequest,
    req: web::Json<ChatRequest>,
) -> HttpResponse {
    if !data.authenticator.authenticate(&http_req) {
        return auth::denied();
    }

    let req = req.into_inner();
    if req.is_empty_turn() {
        return HttpResponse::BadRequest().body("Message or images are required");
    }

    info!(
        "Chat request: model {}, {} history entries, {} images",
        req.settings.model(),
        req.history.len(),
        req.images.len()
    );

    let mut fragments = match data.provider.stream_generate(&req).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Provider call failed before streaming: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "error": "Internal Server Error",
                "details": e.to_string(),
            }));
        }
    };

    let (tx, rx) = mpsc::channel::<Result<Bytes, ProviderError>>(32);
    tokio::spawn(async move {
        while let Some(item) = fragments.next().await {
            match item {
                Ok(text) => {
                    let frame = StreamEvent::text(text).to_frame();
                    if tx.send(Ok(frame)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    // Mid-stream failure: abort the response body. The
                    // consumer sees a read error instead of the sentinel.
                    error!("Provider stream failed mid-flight: {}", e);
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
        let _ = tx.send(Ok(done_frame())).await;
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("Connection", "keep-alive"))
        .streaming(ReceiverStream::new(rx))
}
