use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use minihttp::exchange::Exchange;
use minihttp::protocol::HandlerError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, warn};

use super::{cookie_value, set_session_cookie, SessionStore, DEFAULT_COOKIE_NAME};

type HmacSha256 = Hmac<Sha256>;

const INVALID_SESSION: &str = "Invalid session";

/// Stateless session store: the cookie is the session.
///
/// A token is `payload.signature` where `payload` is the base64url (no
/// padding) encoded JSON of the session and `signature` the base64url encoded
/// HMAC-SHA256 of the payload text under the store key. A token whose
/// signature does not match, or that is not made of exactly two parts, is
/// rejected as [`HandlerError::Forbidden`].
///
/// ```
/// use minihttp_web::session::SignedTokenStore;
///
/// let store = SignedTokenStore::<Vec<String>>::new(b"server secret").unwrap();
/// let token = store.sign(&vec!["admin".to_owned()]).unwrap();
/// assert_eq!(store.verify(&token).unwrap(), ["admin"]);
/// ```
pub struct SignedTokenStore<T> {
    mac: HmacSha256,
    cookie_name: String,
    _session: PhantomData<fn() -> T>,
}

impl<T> SignedTokenStore<T> {
    /// # Errors
    ///
    /// HMAC accepts keys of any length, so this only fails if the underlying
    /// implementation rejects `key`.
    pub fn new(key: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(key)?,
            cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
            _session: PhantomData,
        })
    }

    #[must_use]
    pub fn with_cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.cookie_name = cookie_name.into();
        self
    }

    /// Signs raw payload bytes into a token.
    pub fn sign_payload(&self, payload: &[u8]) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(payload);
        let signature = URL_SAFE_NO_PAD.encode(self.signature(&encoded));
        format!("{encoded}.{signature}")
    }

    /// Checks the signature of `token` and returns its payload bytes.
    pub fn verify_payload(&self, token: &str) -> Result<Vec<u8>, HandlerError> {
        let mut parts = token.split('.');
        let (Some(encoded), Some(signature), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(HandlerError::forbidden(INVALID_SESSION));
        };

        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| HandlerError::forbidden(INVALID_SESSION))?;
        let mut mac = self.mac.clone();
        mac.update(encoded.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            warn!("rejected session token with a bad signature");
            return Err(HandlerError::forbidden(INVALID_SESSION));
        }

        URL_SAFE_NO_PAD.decode(encoded).map_err(|_| HandlerError::forbidden(INVALID_SESSION))
    }

    fn signature(&self, encoded: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(encoded.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

impl<T: Serialize> SignedTokenStore<T> {
    pub fn sign(&self, session: &T) -> Result<String, HandlerError> {
        let json = serde_json::to_vec(session).map_err(HandlerError::internal)?;
        Ok(self.sign_payload(&json))
    }
}

impl<T: DeserializeOwned> SignedTokenStore<T> {
    pub fn verify(&self, token: &str) -> Result<T, HandlerError> {
        let json = self.verify_payload(token)?;
        serde_json::from_slice(&json).map_err(|_| HandlerError::forbidden(INVALID_SESSION))
    }
}

impl<T> fmt::Debug for SignedTokenStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedTokenStore").field("cookie_name", &self.cookie_name).finish_non_exhaustive()
    }
}

#[async_trait]
impl<T> SessionStore<T> for SignedTokenStore<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    async fn set_session(&self, exchange: &mut Exchange<'_>, session: T) -> Result<(), HandlerError> {
        let token = self.sign(&session)?;
        set_session_cookie(exchange, &self.cookie_name, &token)
    }

    async fn find_session(&self, exchange: &mut Exchange<'_>) -> Result<Option<T>, HandlerError> {
        cookie_value(exchange, &self.cookie_name).map(|token| self.verify(token)).transpose()
    }

    async fn delete_session(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        if cookie_value(exchange, &self.cookie_name).is_none() {
            return Ok(());
        }
        debug!(cookie = %self.cookie_name, "cleared session cookie");
        set_session_cookie(exchange, &self.cookie_name, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::with_exchange;
    use futures::executor::block_on;
    use http::header::SET_COOKIE;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
    struct User {
        name: String,
        roles: Vec<String>,
    }

    fn user() -> User {
        User { name: "alice".to_owned(), roles: vec!["admin".to_owned()] }
    }

    fn store() -> SignedTokenStore<User> {
        SignedTokenStore::new(b"0123456789abcdef").unwrap()
    }

    fn is_forbidden(result: Result<User, HandlerError>) -> bool {
        matches!(result, Err(HandlerError::Forbidden { message, .. }) if message == INVALID_SESSION)
    }

    #[test]
    fn round_trip() {
        let store = store();
        let token = store.sign(&user()).unwrap();

        assert_eq!(token.matches('.').count(), 1);
        assert!(!token.contains('='));
        assert_eq!(store.verify(&token).unwrap(), user());
    }

    #[test]
    fn raw_payload_round_trip() {
        let store = store();
        for payload in [&b""[..], b"x", b"\x00\xff binary \x7f", b"{\"a\":1}"] {
            assert_eq!(store.verify_payload(&store.sign_payload(payload)).unwrap(), payload);
        }
    }

    #[test]
    fn tampering_any_character_is_rejected() {
        let store = store();
        let token = store.sign(&user()).unwrap();

        for i in 0..token.len() {
            let mut tampered = token.clone().into_bytes();
            tampered[i] = if tampered[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(tampered).unwrap();

            assert!(is_forbidden(store.verify(&tampered)), "accepted tampered token at {i}: {tampered}");
        }
    }

    #[test]
    fn other_key_is_rejected() {
        let token = store().sign(&user()).unwrap();
        let other = SignedTokenStore::<User>::new(b"another key").unwrap();

        assert!(is_forbidden(other.verify(&token)));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let store = store();
        let token = store.sign(&user()).unwrap();

        for bad in ["", "abc", "a.b.c", &format!("{token}.x"), &format!(".{token}"), "!!!.???"] {
            assert!(is_forbidden(store.verify(bad)), "accepted {bad}");
        }
    }

    #[test]
    fn session_cookie_flow() {
        let store = store();
        let token = store.sign(&user()).unwrap();

        let set_cookie = with_exchange("GET / HTTP/1.1\n\n", |exchange| {
            block_on(store.set_session(exchange, user())).unwrap();
            exchange.response_header(SET_COOKIE).map(str::to_owned)
        });
        assert_eq!(set_cookie, Some(format!("session={token}; Path=/; Secure; HttpOnly; SameSite=strict")));

        with_exchange(&format!("GET / HTTP/1.1\nCookie: session={token}\n\n"), |exchange| {
            assert_eq!(block_on(store.get_session(exchange)).unwrap(), user());
            assert!(block_on(store.exists_session(exchange)));

            block_on(store.delete_session(exchange)).unwrap();
            assert_eq!(exchange.response_header(SET_COOKIE), Some("session=; Path=/; Secure; HttpOnly; SameSite=strict"));
        });
    }

    #[test]
    fn missing_and_invalid_cookies() {
        let store = store();

        with_exchange("GET / HTTP/1.1\n\n", |exchange| {
            assert!(block_on(store.find_session(exchange)).unwrap().is_none());
            assert!(matches!(
                block_on(store.get_session(exchange)),
                Err(HandlerError::Forbidden { message, .. }) if message == "Forbidden"
            ));
        });

        with_exchange("GET / HTTP/1.1\nCookie: session=forged.token\n\n", |exchange| {
            assert!(is_forbidden(block_on(store.get_session(exchange))));
            assert!(!block_on(store.exists_session(exchange)));
        });
    }
}
