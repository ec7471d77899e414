//! Bearer-token claims: decoding, identity extraction and expiry checks.
//!
//! Tokens are `header.payload.signature` JWTs. Signatures are verified by the
//! backend; the client only reads the payload to know who is signed in and
//! when the token has to be refreshed. Every function here is total: malformed
//! input yields `None`/`false`, never an error.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Refresh this many seconds before `exp` by default.
pub const DEFAULT_SKEW_SECS: i64 = 60;

const ID_CLAIMS: &[&str] = &[
    "sub",
    "id",
    "userId",
    "nameid",
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier",
];
const NAME_CLAIMS: &[&str] = &[
    "name",
    "unique_name",
    "given_name",
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name",
];
const EMAIL_CLAIMS: &[&str] = &[
    "email",
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress",
];
const ROLE_CLAIMS: &[&str] = &[
    "role",
    "roles",
    "http://schemas.microsoft.com/ws/2008/06/identity/claims/role",
];

/// Identity of the signed-in user as carried by the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct AuthUser {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Current wall-clock time in epoch seconds.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Decode the payload segment of a `header.payload.signature` token.
///
/// Accepts both the URL-safe and the standard base64 alphabet, with or
/// without padding. Returns `None` for anything that is not a dot-delimited
/// token whose second segment is base64-encoded JSON.
pub fn decode_token(token: &str) -> Option<Value> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;

    let normalized: String = payload
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let bytes = URL_SAFE_NO_PAD.decode(normalized).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Extract identity fields from decoded claims.
///
/// Each field is looked up in a list of alternative claim names (plain JWT,
/// then ASP.NET identity URIs); the first non-null one wins. Returns `None`
/// when `claims` is not a JSON object.
pub fn user_from_claims(claims: &Value) -> Option<AuthUser> {
    let claims = claims.as_object()?;
    let pick = |names: &[&str]| {
        names
            .iter()
            .filter_map(|name| claims.get(*name))
            .find_map(claim_string)
    };
    Some(AuthUser {
        id: pick(ID_CLAIMS),
        name: pick(NAME_CLAIMS),
        email: pick(EMAIL_CLAIMS),
        role: pick(ROLE_CLAIMS),
    })
}

/// The `exp` claim in epoch seconds.
pub fn expires_at(claims: &Value) -> Option<i64> {
    match claims.get("exp")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `true` once `now` has reached `exp`. Claims without `exp` never expire.
pub fn is_token_expired(claims: &Value, now: i64) -> bool {
    expires_at(claims).is_some_and(|exp| exp <= now)
}

/// `true` when `exp` falls within `skew_secs` of the current time.
pub fn is_token_near_expiry(claims: &Value, skew_secs: i64) -> bool {
    is_token_near_expiry_at(claims, skew_secs, now_unix())
}

/// [`is_token_near_expiry`] against an explicit clock.
pub fn is_token_near_expiry_at(claims: &Value, skew_secs: i64, now: i64) -> bool {
    expires_at(claims).is_some_and(|exp| exp <= now.saturating_add(skew_secs))
}

fn claim_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(claim_string),
        _ => None,
    }
}
