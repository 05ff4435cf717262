//! URL-encoded form parsing.

use std::collections::HashMap;

use http::header::CONTENT_TYPE;
use mime::Mime;
use minihttp::exchange::Exchange;
use tracing::debug;

use super::FormError;

const URL_ENCODED: &str = "application/x-www-form-urlencoded";

/// Decodes an `application/x-www-form-urlencoded` body.
///
/// The body is split on `&` and every segment on its first `=`; names and
/// values are percent-decoded with `+` as space. A segment without `=` maps
/// to an empty value and a repeated name keeps its last value.
///
/// # Errors
///
/// Returns [`FormError::UnsupportedContentType`] unless `content_type` is
/// `application/x-www-form-urlencoded` (parameters such as `charset` are
/// allowed).
pub fn parse_url_encoded(content_type: Option<&str>, body: &[u8]) -> Result<HashMap<String, String>, FormError> {
    ensure_url_encoded(content_type)?;

    let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)?;
    debug!(fields = pairs.len(), "parsed url encoded form");
    Ok(pairs.into_iter().collect())
}

/// Reads the request body of `exchange` and decodes it as a URL-encoded form.
///
/// The content type is checked before any body byte is read.
pub async fn read_url_encoded(exchange: &mut Exchange<'_>) -> Result<HashMap<String, String>, FormError> {
    let content_type = exchange.request_header(CONTENT_TYPE).map(str::to_owned);
    ensure_url_encoded(content_type.as_deref())?;

    let body = exchange.read_body().await?;
    parse_url_encoded(content_type.as_deref(), &body)
}

fn ensure_url_encoded(content_type: Option<&str>) -> Result<(), FormError> {
    let found = content_type.unwrap_or_default();
    if found.parse::<Mime>().is_ok_and(|mime| mime.essence_str() == URL_ENCODED) {
        Ok(())
    } else {
        Err(FormError::unsupported_content_type(URL_ENCODED, found))
    }
}
