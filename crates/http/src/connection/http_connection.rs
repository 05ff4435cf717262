use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use http::header::CONNECTION;
use http::{HeaderMap, HeaderValue, StatusCode, Version};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::select;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{HeadEncoder, HeadFramer, HeadParser, HeadStatus, ResponseHead};
use crate::exchange::Exchange;
use crate::handler::Handler;
use crate::protocol::{HandlerError, HttpError, ParseError, SendError};
use crate::responder::{render_error, respond_internal_error};

/// An HTTP connection that serves requests one after another
///
/// `HttpConnection` runs the per-connection loop:
/// - Frames and parses the next request head
/// - Builds an [`Exchange`] and hands it to the handler
/// - Skips whatever request body the handler left unread
/// - Sends the response (or an error response)
/// - Decides whether to keep the connection open
///
/// Pipelined requests are answered strictly in arrival order: the next head
/// is only read after the previous response has been written.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
///
pub struct HttpConnection<R, W> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
    framer: HeadFramer,
    remote_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            framer: HeadFramer::default(),
            remote_addr: None,
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    #[must_use]
    pub fn with_max_head_size(mut self, max_head_size: usize) -> Self {
        self.framer = HeadFramer::new(max_head_size);
        self
    }

    /// Stops the loop once `shutdown` is cancelled.
    ///
    /// Cancellation is observed between requests and while waiting for the
    /// next one; a request in progress is always answered first.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
    {
        let mut buf = BytesMut::with_capacity(self.framer.capacity());

        loop {
            if !self.wait_for_request().await? {
                return Ok(());
            }

            let head = match self.framer.read_head(&mut self.reader, &mut buf).await {
                Ok(HeadStatus::Complete(_)) => match HeadParser.parse(buf.split().freeze()) {
                    Ok(head) => head,
                    Err(e) => return reject(&mut self.writer, e).await,
                },
                Ok(HeadStatus::Closed { read }) => {
                    if read > 0 {
                        warn!(read, "connection closed in the middle of a request head");
                    }
                    return Ok(());
                }
                Err(e @ ParseError::Io { .. }) => return Err(e.into()),
                Err(e) => return reject(&mut self.writer, e).await,
            };

            let mut exchange = match Exchange::new(head, &mut self.reader, &mut self.writer, self.remote_addr) {
                Ok(exchange) => exchange,
                Err(e) => return reject(&mut self.writer, e).await,
            };

            if !serve(&mut exchange, handler.as_ref()).await? {
                debug!("connection close requested, shutting down");
                return Ok(());
            }
        }
    }

    /// Waits until the next request starts arriving.
    ///
    /// Returns `false` when the connection should end instead: the peer closed
    /// it or shutdown was requested.
    async fn wait_for_request(&mut self) -> Result<bool, HttpError> {
        if self.shutdown.is_cancelled() {
            info!("shutdown requested, closing connection");
            return Ok(false);
        }

        let filled = select! {
            biased;
            () = self.shutdown.cancelled() => None,
            filled = self.reader.fill_buf() => Some(filled.map(|available| !available.is_empty())),
        };

        match filled {
            None => {
                info!("shutdown requested, closing idle connection");
                Ok(false)
            }
            Some(Ok(has_data)) => {
                if !has_data {
                    debug!("cant read more request, break this connection down");
                }
                Ok(has_data)
            }
            Some(Err(e)) => Err(ParseError::io(e).into()),
        }
    }
}

/// Runs the handler for one exchange and answers it.
///
/// Returns whether the connection stays open.
async fn serve<H: Handler>(exchange: &mut Exchange<'_>, handler: &H) -> Result<bool, HttpError> {
    let handled: Result<(), Box<dyn Error + Send + Sync>> = handler.handle(exchange).await.map_err(Into::into);

    exchange.drain_body().await?;

    match &handled {
        Ok(()) => exchange.send_response().await?,
        Err(e) => send_error_response(exchange, &**e).await?,
    }

    exchange.notify_complete(handled.as_ref().err().map(|e| &**e));
    Ok(!exchange.should_close_connection())
}

async fn send_error_response(exchange: &mut Exchange<'_>, e: &(dyn Error + Send + Sync + 'static)) -> Result<(), SendError> {
    if let Some(handler_error) = e.downcast_ref::<HandlerError>() {
        if matches!(handler_error, HandlerError::Internal(cause) if cause.is::<ParseError>()) {
            exchange.close_after_response();
        }
        return render_error(exchange, handler_error).await;
    }

    if e.is::<ParseError>() {
        exchange.close_after_response();
    }
    error!(cause = %e, "handle response error");
    respond_internal_error(exchange).await
}

/// Answers an unusable request head with a bare 500 and ends the connection.
async fn reject<W>(writer: &mut BufWriter<W>, e: ParseError) -> Result<(), HttpError>
where
    W: AsyncWrite + Send + Unpin,
{
    error!(cause = %e, "can't receive next request");

    let mut headers = HeaderMap::new();
    headers.insert(CONNECTION, HeaderValue::from_static("close"));

    let mut dst = BytesMut::new();
    HeadEncoder.encode(
        ResponseHead {
            version: Version::HTTP_11,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            reason: None,
            headers: &headers,
            content_length: Some(0),
        },
        &mut dst,
    )?;
    writer.write_all(&dst).await.map_err(SendError::io)?;
    writer.flush().await.map_err(SendError::io)?;

    Err(e.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, DuplexStream};

    struct TestHandler;

    #[async_trait]
    impl Handler for TestHandler {
        type Error = HandlerError;

        async fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
            let path = exchange.path().to_owned();
            match path.as_str() {
                "/echo" => {
                    let body = exchange.read_body().await?;
                    exchange.send(body);
                }
                "/fail" => return Err(HandlerError::invalid_input("bad name")),
                "/boom" => return Err(HandlerError::internal("boom")),
                _ => exchange.send_text(format!("path={path}")),
            }
            Ok(())
        }
    }

    fn serve_duplex(token: CancellationToken, max_head_size: usize) -> (DuplexStream, tokio::task::JoinHandle<Result<(), HttpError>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let connection = HttpConnection::new(reader, writer).with_shutdown(token).with_max_head_size(max_head_size);
        let task = tokio::spawn(connection.process(Arc::new(TestHandler)));
        (client, task)
    }

    async fn exchange_all(input: &[u8]) -> (String, Result<(), HttpError>) {
        exchange_all_with(input, 8 * 1024).await
    }

    async fn exchange_all_with(input: &[u8], max_head_size: usize) -> (String, Result<(), HttpError>) {
        let (mut client, task) = serve_duplex(CancellationToken::new(), max_head_size);
        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        (String::from_utf8(output).unwrap(), task.await.unwrap())
    }

    /// Reads one response with a `content-length` body.
    async fn read_response(client: &mut DuplexStream) -> String {
        let mut head = Vec::new();
        while !head.ends_with(b"\r\n\r\n") {
            head.push(client.read_u8().await.unwrap());
        }
        let head = String::from_utf8(head).unwrap();
        let length: usize = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length: "))
            .map_or(0, |value| value.trim().parse().unwrap());

        let mut body = vec![0; length];
        client.read_exact(&mut body).await.unwrap();
        head + &String::from_utf8(body).unwrap()
    }

    #[tokio::test]
    async fn pipelined_requests_answered_in_order() {
        let input = b"GET /a HTTP/1.1\r\n\r\n\
            POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello\
            GET /c HTTP/1.1\r\nConnection: close\r\n\r\n\
            GET /never HTTP/1.1\r\n\r\n";

        let (output, result) = exchange_all(input).await;

        assert!(result.is_ok());
        assert_eq!(output.matches("HTTP/1.1 200 OK\r\n").count(), 3);
        let a = output.find("path=/a").unwrap();
        let echo = output.find("hello").unwrap();
        let c = output.find("path=/c").unwrap();
        assert!(a < echo && echo < c);
        assert!(!output.contains("/never"));
    }

    #[tokio::test]
    async fn unread_body_is_skipped() {
        let input = b"POST /ignore HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789\
            GET /next HTTP/1.1\r\nConnection: close\r\n\r\n";

        let (output, _) = exchange_all(input).await;

        assert!(output.contains("path=/ignore"));
        assert!(output.ends_with("path=/next"));
        assert!(!output.contains("0123456789"));
    }

    #[tokio::test]
    async fn http_10_closes_by_default() {
        let (output, _) = exchange_all(b"GET /x HTTP/1.0\r\n\r\nGET /y HTTP/1.0\r\n\r\n").await;

        assert!(output.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(output.ends_with("path=/x"));
        assert!(!output.contains("path=/y"));
    }

    #[tokio::test]
    async fn http_10_keep_alive() {
        let (output, _) =
            exchange_all(b"GET /x HTTP/1.0\r\nConnection: keep-alive\r\n\r\nGET /y HTTP/1.0\r\n\r\nGET /z HTTP/1.0\r\n\r\n").await;

        assert!(output.contains("connection: keep-alive\r\n"));
        assert!(output.contains("path=/x"));
        assert!(output.ends_with("path=/y"));
        assert!(!output.contains("path=/z"));
    }

    #[tokio::test]
    async fn http_10_keep_alive_token_any_case() {
        let (output, _) = exchange_all(b"GET /x HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\nGET /y HTTP/1.0\r\n\r\n").await;

        assert!(output.contains("connection: keep-alive\r\n"));
        assert!(output.ends_with("path=/y"));
    }

    #[tokio::test]
    async fn latin1_target_served() {
        let (output, result) = exchange_all(b"GET /caf\xe9 HTTP/1.1\r\nConnection: close\r\n\r\n").await;

        assert!(result.is_ok());
        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(output.ends_with("path=/caf\u{e9}"));
    }

    #[tokio::test]
    async fn http_09_gets_body_only() {
        let (output, _) = exchange_all(b"GET /old\r\n\r\nGET /more\r\n\r\n").await;
        assert_eq!(output, "path=/old");
    }

    #[tokio::test]
    async fn handler_error_rendered_and_connection_kept() {
        let (output, _) = exchange_all(b"GET /fail HTTP/1.1\r\n\r\nGET /boom HTTP/1.1\r\nConnection: close\r\n\r\n").await;

        assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(output.contains(r#"{"success":false,"code":400,"errorCode":400,"message":"bad name"}"#));
        assert!(output.contains("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(output.ends_with(r#"{"success":false,"code":500,"message":"Internal Error"}"#));
    }

    #[tokio::test]
    async fn oversized_head_rejected() {
        let mut input = b"GET /".to_vec();
        input.extend(std::iter::repeat(b'a').take(2048));

        let (output, result) = exchange_all_with(&input, 1024).await;

        assert!(output.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(output.contains("connection: close\r\n"));
        assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::HeadTooLarge { max_size: 1024 } })));
    }

    #[tokio::test]
    async fn unknown_protocol_rejected() {
        let (output, result) = exchange_all(b"GET / HTTP/2.0\r\n\r\nGET / HTTP/1.1\r\n\r\n").await;

        assert!(output.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(!output.contains("path=/"));
        assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::InvalidVersion(_) })));
    }

    #[tokio::test]
    async fn continue_before_body() {
        let (mut client, task) = serve_duplex(CancellationToken::new(), 8 * 1024);
        client
            .write_all(b"POST /echo HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 5\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut interim = [0u8; 25];
        client.read_exact(&mut interim).await.unwrap();
        assert_eq!(&interim, b"HTTP/1.1 100 Continue\r\n\r\n");

        client.write_all(b"hello").await.unwrap();
        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();

        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(output.ends_with("hello"));
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn shutdown_closes_idle_connection() {
        let token = CancellationToken::new();
        let (mut client, task) = serve_duplex(token.clone(), 8 * 1024);

        client.write_all(b"GET /first HTTP/1.1\r\n\r\n").await.unwrap();
        let response = read_response(&mut client).await;
        assert!(response.ends_with("path=/first"));

        token.cancel();
        assert!(task.await.unwrap().is_ok());

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let (mut client, task) = serve_duplex(token, 8 * 1024);

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        assert!(task.await.unwrap().is_ok());

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        assert!(output.is_empty());
    }
}
