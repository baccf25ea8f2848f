//! Session cookie handling.
//!
//! The browser holds only a random session id; conversation memory stays
//! server-side in the orchestrator's memory store.

use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "ledger_session";

fn session_cookie(id: Uuid) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Session id from the request cookie, if present and well formed.
pub fn current_session(cookies: &Cookies) -> Option<Uuid> {
    cookies
        .get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok())
}

/// Existing session id, or a fresh one set on the response.
pub fn ensure_session(cookies: &Cookies) -> Uuid {
    match current_session(cookies) {
        Some(id) => id,
        None => issue_session(cookies),
    }
}

/// Always set a fresh session id on the response.
pub fn issue_session(cookies: &Cookies) -> Uuid {
    let id = Uuid::new_v4();
    cookies.add(session_cookie(id));
    id
}
