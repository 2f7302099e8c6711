//! Per-browser session context.
//!
//! The whole context (identity plus guest cart) travels as a signed HS256
//! token, either in the session cookie or as a bearer token. Handlers read it
//! through the [`Session`] extractor and record changes; `SessionMiddleware`
//! writes them back onto the response.

use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{CartItem, SessionIdentity};

pub const SESSION_COOKIE: &str = "bookgenie_session";
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionIdentity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guest_cart: Vec<CartItem>,
}

impl SessionContext {
    pub fn authenticated(identity: SessionIdentity) -> Self {
        SessionContext { user: Some(identity), guest_cart: Vec::new() }
    }

    pub fn is_guest(&self) -> bool {
        self.user.is_none()
    }

    pub fn require_identity(&self) -> AppResult<&SessionIdentity> {
        self.user.as_ref().ok_or(AppError::Unauthenticated)
    }
}

#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    context: SessionContext,
    exp: usize,
}

/// Signing material and cookie policy for session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
    secure: bool,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64, secure: bool) -> Self {
        SessionKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: chrono::Duration::hours(ttl_hours),
            secure,
        }
    }

    pub fn encode(&self, context: &SessionContext) -> AppResult<String> {
        let exp = chrono::Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Session("session expiry overflow".into()))?
            .timestamp();
        let claims = Claims {
            context: context.clone(),
            exp: usize::try_from(exp).map_err(|e| AppError::Session(e.to_string()))?,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| AppError::Session(e.to_string()))
    }

    /// Expired, tampered or garbled tokens yield `None`.
    pub fn decode(&self, token: &str) -> Option<SessionContext> {
        match decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256)) {
            Ok(data) => Some(data.claims.context),
            Err(e) => {
                log::debug!("discarding session token: {}", e);
                None
            }
        }
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, token)
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(actix_web::cookie::time::Duration::seconds(self.ttl.num_seconds()))
            .finish()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
        cookie.make_removal();
        cookie
    }
}

/// Change recorded by a handler, applied by the middleware on the way out.
#[derive(Debug, Clone)]
pub enum SessionChange {
    Renew(SessionContext),
    Purge,
}

/// Extractor giving handlers the current context and a way to replace it.
pub struct Session {
    request: HttpRequest,
    context: SessionContext,
}

impl Session {
    pub fn context(&self) -> SessionContext {
        self.context.clone()
    }

    pub fn renew(&self, context: SessionContext) {
        self.request.extensions_mut().insert(SessionChange::Renew(context));
    }

    pub fn purge(&self) {
        self.request.extensions_mut().insert(SessionChange::Purge);
    }
}

impl FromRequest for Session {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let context = req.extensions().get::<SessionContext>().cloned().unwrap_or_default();
        ready(Ok(Session { request: req.clone(), context }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> SessionIdentity {
        SessionIdentity { user_id: 7, username: "ada".into(), email: "ada@example.com".into() }
    }

    #[test]
    fn token_carries_identity() {
        let keys = SessionKeys::new("secret", 1, false);
        let token = keys.encode(&SessionContext::authenticated(identity())).unwrap();
        let context = keys.decode(&token).unwrap();
        assert_eq!(context.user, Some(identity()));
        assert!(context.guest_cart.is_empty());
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let ours = SessionKeys::new("secret", 1, false);
        let theirs = SessionKeys::new("other", 1, false);
        let token = theirs.encode(&SessionContext::authenticated(identity())).unwrap();
        assert!(ours.decode(&token).is_none());
        assert!(ours.decode("not-a-token").is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = SessionKeys::new("secret", -2, false);
        let token = keys.encode(&SessionContext::default()).unwrap();
        assert!(keys.decode(&token).is_none());
    }

    #[test]
    fn anonymous_context_requires_login() {
        let context = SessionContext::default();
        assert!(context.is_guest());
        assert!(matches!(context.require_identity(), Err(AppError::Unauthenticated)));
    }
}
