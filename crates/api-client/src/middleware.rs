//! Request/response middleware composed around every API call.
//!
//! Each step takes the session explicitly and returns what the caller should
//! do next; nothing here sends a request itself.

use reqwest::Request;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use tracing::debug;

use crate::session::Session;

/// Per-request switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Send without a bearer token and without the 401 refresh-and-retry
    /// step (login, public endpoints).
    pub skip_auth: bool,
}

impl RequestOptions {
    pub fn anonymous() -> Self {
        Self { skip_auth: true }
    }
}

/// What to do after a request came back `401 Unauthorized`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unauthorized {
    /// Send the request again, once, with this token.
    Resubmit(String),
    /// Give up and hand the 401 to the caller. The session has ended.
    Reject,
}

/// Request side: make sure the token is fresh, then attach it.
///
/// Best effort: a failed proactive refresh never keeps the request from being
/// sent; it simply goes out with whatever token is left (possibly none).
pub async fn authorize(session: &Session, mut request: Request, options: RequestOptions) -> Request {
    if options.skip_auth {
        return request;
    }
    session.ensure_fresh().await;
    if let Some(token) = session.token() {
        set_bearer(&mut request, &token);
    }
    request
}

/// Response side: decide how to handle a 401.
///
/// The first 401 of a request triggers exactly one refresh; a token coming
/// back means "resubmit". A 401 on the resubmitted request, a request sent
/// without a token, or a refresh with nothing to refresh all end the session.
/// A failed refresh has already ended it.
///
/// `sent_with` is the token the rejected request carried; when another
/// request already replaced it, the replacement is reused. `since` is
/// [`Session::expirations`] read before the request was authorized: if the
/// session ended after that, it is not ended (and redirected) a second time.
pub async fn on_unauthorized(
    session: &Session,
    sent_with: Option<&str>,
    since: u64,
    already_retried: bool,
) -> Unauthorized {
    if already_retried {
        session.expire_once(since);
        return Unauthorized::Reject;
    }
    let Some(stale) = sent_with else {
        debug!("401 on an unauthenticated request");
        session.expire_once(since);
        return Unauthorized::Reject;
    };
    match session.refresh_replacing(stale).await {
        Ok(Some(token)) => Unauthorized::Resubmit(token),
        Ok(None) => {
            session.expire_once(since);
            Unauthorized::Reject
        }
        Err(err) => {
            debug!(error = %err, "refresh after 401 failed");
            Unauthorized::Reject
        }
    }
}

/// The bearer token attached to `request`, if any.
pub fn bearer_of(request: &Request) -> Option<String> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::to_string)
}

/// Set `Authorization: Bearer <token>`, replacing any previous value.
pub fn set_bearer(request: &mut Request, token: &str) -> bool {
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
            true
        }
        Err(_) => {
            debug!("token is not a valid header value, sending without it");
            false
        }
    }
}
