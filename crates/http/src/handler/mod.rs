//! Request handler abstraction.
//!
//! A [`Handler`] receives the [`Exchange`] of each request, reads what it needs
//! from the request side and fills in the response. The connection sends the
//! response after the handler returns, so a handler only calls
//! [`Exchange::send_response`] itself when it wants the response on the wire
//! early.
//!
//! Returning an error hands the response over to the connection: a
//! [`HandlerError`](crate::protocol::HandlerError) is rendered according to its
//! variant, anything else becomes a generic 500.

use std::error::Error;
use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::exchange::Exchange;

#[async_trait]
pub trait Handler: Send + Sync {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    async fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), Self::Error>;
}

/// A [`Handler`] backed by a closure, see [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Err> Handler for HandlerFn<F>
where
    F: for<'a, 'b> Fn(&'a mut Exchange<'b>) -> BoxFuture<'a, Result<(), Err>> + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    type Error = Err;

    async fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), Self::Error> {
        (self.f)(exchange).await
    }
}

/// Wraps a closure into a [`Handler`].
///
/// The closure returns a boxed future borrowing the exchange:
///
/// ```no_run
/// use minihttp::handler::handler_fn;
/// use minihttp::protocol::HandlerError;
///
/// let hello = handler_fn(|exchange| {
///     Box::pin(async move {
///         exchange.send_text("hello");
///         Ok::<_, HandlerError>(())
///     })
/// });
/// ```
pub fn handler_fn<F, Err>(f: F) -> HandlerFn<F>
where
    F: for<'a, 'b> Fn(&'a mut Exchange<'b>) -> BoxFuture<'a, Result<(), Err>> + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    HandlerFn { f }
}
