//! Cookie backed sessions.
//!
//! A [`SessionStore`] keeps one session value per client in a cookie named by
//! [`SessionStore::cookie_name`]. Two stores are provided:
//!
//! - [`RandomIdStore`]: the cookie holds a random identifier, the value lives
//!   in an application supplied [`SessionBackend`]
//! - [`SignedTokenStore`]: the cookie holds the value itself, signed with
//!   HMAC-SHA256, so nothing is kept on the server
//!
//! Cookies are always issued as
//! `name=value; Path=/; Secure; HttpOnly; SameSite=strict`.

use async_trait::async_trait;
use http::header::{COOKIE, SET_COOKIE};
use http::HeaderValue;
use minihttp::exchange::Exchange;
use minihttp::protocol::HandlerError;

mod random_id;
mod signed_token;

pub use random_id::{RandomIdStore, SessionBackend, DEFAULT_ID_LENGTH};
pub use signed_token::SignedTokenStore;

pub const DEFAULT_COOKIE_NAME: &str = "session";

const COOKIE_ATTRIBUTES: &str = "; Path=/; Secure; HttpOnly; SameSite=strict";

/// Stores a session value of type `T` for the client of an exchange.
///
/// Exchanges are taken by `&mut` because they are not `Sync`, which the
/// returned futures would otherwise require.
#[async_trait]
pub trait SessionStore<T: Send + 'static>: Send + Sync {
    fn cookie_name(&self) -> &str {
        DEFAULT_COOKIE_NAME
    }

    /// Saves `session` and sets the session cookie on the response.
    async fn set_session(&self, exchange: &mut Exchange<'_>, session: T) -> Result<(), HandlerError>;

    /// Looks up the session of the request, `None` when it carries no session
    /// cookie or the store has nothing for it.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Forbidden`] when the cookie is present but not
    /// valid for this store.
    async fn find_session(&self, exchange: &mut Exchange<'_>) -> Result<Option<T>, HandlerError>;

    /// Forgets the session and clears the cookie. A request without session
    /// cookie is left alone.
    async fn delete_session(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError>;

    async fn exists_session(&self, exchange: &mut Exchange<'_>) -> bool {
        matches!(self.find_session(exchange).await, Ok(Some(_)))
    }

    /// Like [`find_session`](SessionStore::find_session), but a missing
    /// session is [`HandlerError::Forbidden`].
    async fn get_session(&self, exchange: &mut Exchange<'_>) -> Result<T, HandlerError> {
        self.find_session(exchange).await?.ok_or_else(|| HandlerError::forbidden("Forbidden"))
    }
}

/// Finds the value of cookie `name` in the request `Cookie` headers.
///
/// Every header is split on `;` and the first segment starting with `name=`
/// wins.
pub fn cookie_value<'e>(exchange: &'e Exchange<'_>, name: &str) -> Option<&'e str> {
    exchange.request_headers(COOKIE).flat_map(|header| header.split(';')).find_map(|cookie| {
        let value = cookie.trim().strip_prefix(name)?.strip_prefix('=')?;
        Some(value.trim())
    })
}

/// Builds the `Set-Cookie` value for a session cookie; an empty `value`
/// clears it.
pub fn session_cookie(name: &str, value: &str) -> Result<HeaderValue, HandlerError> {
    HeaderValue::try_from(format!("{name}={value}{COOKIE_ATTRIBUTES}")).map_err(HandlerError::internal)
}

pub(crate) fn set_session_cookie(exchange: &mut Exchange<'_>, name: &str, value: &str) -> Result<(), HandlerError> {
    let cookie = session_cookie(name, value)?;
    exchange.set_response_header(SET_COOKIE, cookie);
    Ok(())
}
