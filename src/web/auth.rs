use actix_web::cookie::time::Duration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::info;
use serde_json::json;

pub const AUTH_COOKIE: &str = "auth-token";

/// Decides whether a request may reach the gated routes. Kept behind a
/// trait so the cookie gate can be swapped for per-user auth without
/// touching the relay.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, req: &HttpRequest) -> bool;
}

/// The shared-secret gate: a single cookie whose value must match.
pub struct CookieAuthenticator {
    expected: String,
}

impl CookieAuthenticator {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl Authenticator for CookieAuthenticator {
    fn authenticate(&self, req: &HttpRequest) -> bool {
        req.cookie(AUTH_COOKIE)
            .map(|c| c.value() == self.expected)
            .unwrap_or(false)
    }
}

pub fn denied() -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({ "error": "Authentication required" }))
}

/// Handler for the secret login path: issues the auth cookie and redirects
/// to the chat page.
pub async fn login(value: web::Data<LoginToken>) -> impl Responder {
    info!("Issuing auth cookie");
    let cookie = Cookie::build(AUTH_COOKIE, value.0.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(Duration::days(30))
        .finish();
    HttpResponse::Found()
        .append_header(("Location", "/"))
        .cookie(cookie)
        .finish()
}

/// The cookie value the login route hands out, injected as app data.
#[derive(Clone)]
pub struct LoginToken(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn cookie_authenticator_accepts_matching_cookie() {
        let auth = CookieAuthenticator::new("authenticated");
        let req = TestRequest::default()
            .cookie(Cookie::new(AUTH_COOKIE, "authenticated"))
            .to_http_request();
        assert!(auth.authenticate(&req));
    }

    #[test]
    fn cookie_authenticator_rejects_missing_or_wrong_cookie() {
        let auth = CookieAuthenticator::new("authenticated");
        let req = TestRequest::default().to_http_request();
        assert!(!auth.authenticate(&req));

        let req = TestRequest::default()
            .cookie(Cookie::new(AUTH_COOKIE, "guessed"))
            .to_http_request();
        assert!(!auth.authenticate(&req));
    }
}
