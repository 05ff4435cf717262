//! Error responses.
//!
//! Failures are answered with a small JSON document:
//!
//! ```text
//! {"success":false,"code":400,"errorCode":400,"message":"name is missing"}
//! ```
//!
//! The generic internal error omits `errorCode`. Any `Content-Length` the
//! handler set is replaced by the length of the error body. All functions
//! here are no-ops once the response of the exchange has been sent.

use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, StatusCode};
use serde::Serialize;
use tracing::{error, warn};

use crate::exchange::Exchange;
use crate::protocol::{HandlerError, SendError};

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    code: u16,
    #[serde(rename = "errorCode", skip_serializing_if = "Option::is_none")]
    error_code: Option<u16>,
    message: &'a str,
}

/// Renders a [`HandlerError`] into the response and sends it.
pub async fn render_error(exchange: &mut Exchange<'_>, error: &HandlerError) -> Result<(), SendError> {
    match error {
        HandlerError::InvalidInput { error_code, message } => {
            respond_error(exchange, StatusCode::BAD_REQUEST, *error_code, message).await
        }
        HandlerError::Forbidden { error_code, message } => {
            respond_error(exchange, StatusCode::FORBIDDEN, *error_code, message).await
        }
        HandlerError::NotFound => {
            if exchange.is_response_sent() {
                return Ok(());
            }
            exchange.reset_framing();
            exchange.set_status(StatusCode::NOT_FOUND);
            exchange.send(bytes::Bytes::new());
            exchange.send_response().await
        }
        HandlerError::Redirect { location } => {
            if exchange.is_response_sent() {
                return Ok(());
            }
            match HeaderValue::from_str(location) {
                Ok(value) => {
                    exchange.reset_framing();
                    exchange.set_status(StatusCode::FOUND);
                    exchange.set_response_header(LOCATION, value);
                    exchange.send(bytes::Bytes::new());
                    exchange.send_response().await
                }
                Err(e) => {
                    warn!(cause = %e, "redirect location is not a valid header value");
                    respond_internal_error(exchange).await
                }
            }
        }
        HandlerError::Internal(cause) => {
            error!(cause = %cause, "handler failed");
            respond_internal_error(exchange).await
        }
    }
}

/// Sends `status` with a JSON error body carrying `error_code` and `message`.
pub async fn respond_error(
    exchange: &mut Exchange<'_>,
    status: StatusCode,
    error_code: u16,
    message: &str,
) -> Result<(), SendError> {
    let body = ErrorBody { success: false, code: status.as_u16(), error_code: Some(error_code), message };
    send_json(exchange, status, &body).await
}

/// Sends the generic `500 Internal Error` JSON response.
pub async fn respond_internal_error(exchange: &mut Exchange<'_>) -> Result<(), SendError> {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    let body = ErrorBody { success: false, code: status.as_u16(), error_code: None, message: "Internal Error" };
    send_json(exchange, status, &body).await
}

async fn send_json(exchange: &mut Exchange<'_>, status: StatusCode, body: &ErrorBody<'_>) -> Result<(), SendError> {
    if exchange.is_response_sent() {
        warn!(status = status.as_u16(), "response already sent, dropping error response");
        return Ok(());
    }

    let json = serde_json::to_vec(body).map_err(SendError::invalid_body)?;
    let content_type = HeaderValue::from_str(mime::APPLICATION_JSON.as_ref()).map_err(SendError::invalid_body)?;
    exchange.reset_framing();
    exchange.set_status(status);
    exchange.set_response_header(CONTENT_TYPE, content_type);
    exchange.send(json);
    exchange.send_response().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::HeadParser;
    use bytes::Bytes;
    use http::header::CONTENT_LENGTH;

    async fn render(error: HandlerError) -> String {
        let head = HeadParser.parse(Bytes::from_static(b"GET / HTTP/1.1\r\n\r\n")).unwrap();
        let mut reader: &[u8] = b"";
        let mut writer = Vec::new();
        {
            let mut exchange = Exchange::new(head, &mut reader, &mut writer, None).unwrap();
            render_error(&mut exchange, &error).await.unwrap();
        }
        String::from_utf8(writer).unwrap()
    }

    #[tokio::test]
    async fn invalid_input_body() {
        let text = render(HandlerError::invalid_input_with_code(4001, "name is missing")).await;

        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("content-type: application/json\r\n"));
        assert!(text.ends_with(r#"{"success":false,"code":400,"errorCode":4001,"message":"name is missing"}"#));
    }

    #[tokio::test]
    async fn forbidden_body() {
        let text = render(HandlerError::forbidden("bad signature")).await;

        assert!(text.starts_with("HTTP/1.1 403 Forbidden\r\n"));
        assert!(text.ends_with(r#"{"success":false,"code":403,"errorCode":403,"message":"bad signature"}"#));

        let text = render(HandlerError::forbidden_with_code(4031, "expired")).await;
        assert!(text.ends_with(r#"{"success":false,"code":403,"errorCode":4031,"message":"expired"}"#));
    }

    #[tokio::test]
    async fn handler_framing_is_replaced() {
        let head = HeadParser.parse(Bytes::from_static(b"GET / HTTP/1.1\r\n\r\n")).unwrap();
        let mut reader: &[u8] = b"";
        let mut writer = Vec::new();
        {
            let mut exchange = Exchange::new(head, &mut reader, &mut writer, None).unwrap();
            exchange.set_response_header(CONTENT_LENGTH, HeaderValue::from_static("999"));
            exchange.send_text("partial");
            render_error(&mut exchange, &HandlerError::invalid_input("bad")).await.unwrap();
        }
        let text = String::from_utf8(writer).unwrap();
        let body = r#"{"success":false,"code":400,"errorCode":400,"message":"bad"}"#;

        assert!(!text.contains("999"));
        assert!(text.contains(&format!("content-length: {}\r\n", body.len())));
        assert!(text.ends_with(body));

        let head = HeadParser.parse(Bytes::from_static(b"GET / HTTP/1.1\r\n\r\n")).unwrap();
        let mut writer = Vec::new();
        {
            let mut exchange = Exchange::new(head, &mut reader, &mut writer, None).unwrap();
            exchange.set_no_content_length();
            render_error(&mut exchange, &HandlerError::NotFound).await.unwrap();
        }
        assert!(String::from_utf8(writer).unwrap().contains("content-length: 0\r\n"));
    }

    #[tokio::test]
    async fn internal_error_body() {
        let text = render(HandlerError::internal("database down")).await;

        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(text.ends_with(r#"{"success":false,"code":500,"message":"Internal Error"}"#));
        assert!(!text.contains("database down"));
    }

    #[tokio::test]
    async fn redirect_and_not_found() {
        let text = render(HandlerError::redirect("/login")).await;
        assert!(text.starts_with("HTTP/1.1 302 Found\r\n"));
        assert!(text.contains("location: /login\r\n"));
        assert!(text.contains("content-length: 0\r\n"));

        let text = render(HandlerError::NotFound).await;
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn nothing_written_after_send() {
        let head = HeadParser.parse(Bytes::from_static(b"GET / HTTP/1.1\r\n\r\n")).unwrap();
        let mut reader: &[u8] = b"";
        let mut writer = Vec::new();
        {
            let mut exchange = Exchange::new(head, &mut reader, &mut writer, None).unwrap();
            exchange.send_text("ok");
            exchange.send_response().await.unwrap();
            respond_internal_error(&mut exchange).await.unwrap();
        }
        let text = String::from_utf8(writer).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(!text.contains("500"));
    }
}
