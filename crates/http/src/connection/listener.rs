use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::connection::HttpConnection;
use crate::handler::Handler;

/// Runs a task in the background and returns a handle to it.
///
/// The listener runs every accepted connection through it, so the embedding
/// application decides where connection tasks run. Any
/// `Fn(BoxFuture<'static, ()>) -> JoinHandle<()>` qualifies.
pub trait Spawn: Send + Sync + 'static {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> JoinHandle<()>;
}

impl<F> Spawn for F
where
    F: Fn(BoxFuture<'static, ()>) -> JoinHandle<()> + Send + Sync + 'static,
{
    fn spawn(&self, task: BoxFuture<'static, ()>) -> JoinHandle<()> {
        self(task)
    }
}

fn tokio_spawn(task: BoxFuture<'static, ()>) -> JoinHandle<()> {
    tokio::spawn(task)
}

/// Registry entry of an accepted connection.
struct ConnectionEntry {
    remote_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ConnectionEntry {
    fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }
}

#[derive(Default)]
struct Registry {
    connections: Mutex<Vec<ConnectionEntry>>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, Vec<ConnectionEntry>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A bound TCP listener serving every accepted connection with one handler.
///
/// ```no_run
/// use std::sync::Arc;
/// use minihttp::config::ServerConfig;
/// use minihttp::connection::Listener;
/// use minihttp::handler::handler_fn;
/// use minihttp::protocol::HandlerError;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let handler = Arc::new(handler_fn(|exchange| {
///     Box::pin(async move {
///         exchange.send_text("hello");
///         Ok::<_, HandlerError>(())
///     })
/// }));
///
/// let listener = Listener::start(ServerConfig::new("127.0.0.1:8080".parse()?), handler)?;
/// tokio::signal::ctrl_c().await?;
/// listener.stop();
/// listener.join().await;
/// # Ok(())
/// # }
/// ```
pub struct Listener {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    registry: Arc<Registry>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    /// Binds `config.address` and starts accepting on a tokio task.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is invalid or the
    /// address can't be bound.
    pub fn start<H>(config: ServerConfig, handler: Arc<H>) -> Result<Self, ConfigError>
    where
        H: Handler + 'static,
    {
        Self::start_with_spawner(config, handler, tokio_spawn)
    }

    /// Like [`start`](Self::start), spawning tasks through `spawner`.
    pub fn start_with_spawner<H, S>(config: ServerConfig, handler: Arc<H>, spawner: S) -> Result<Self, ConfigError>
    where
        H: Handler + 'static,
        S: Spawn,
    {
        config.validate()?;
        let tcp_listener = bind(&config).map_err(|e| ConfigError::bind(config.address, e))?;
        let local_addr = tcp_listener.local_addr().map_err(|e| ConfigError::bind(config.address, e))?;
        info!(%local_addr, backlog = config.backlog, "start listening");

        let shutdown = CancellationToken::new();
        let registry = Arc::new(Registry::default());
        let accept_loop = AcceptLoop {
            tcp_listener,
            handler,
            spawner: Arc::new(spawner),
            registry: Arc::clone(&registry),
            shutdown: shutdown.clone(),
            max_head_size: config.max_head_size,
        };
        let accept_task = tokio::spawn(accept_loop.run());

        Ok(Self { local_addr, shutdown, registry, accept_task: Mutex::new(Some(accept_task)) })
    }

    /// Returns the bound address, with the actual port when port 0 was configured.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the number of connections still being served.
    pub fn connection_count(&self) -> usize {
        let mut connections = self.registry.lock();
        connections.retain(ConnectionEntry::is_alive);
        connections.len()
    }

    /// Stops accepting and asks every open connection to close.
    ///
    /// Returns immediately; connections finish the request they are serving
    /// and close before reading another. Calling it again has no effect.
    pub fn stop(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        self.shutdown.cancel();
        let connections = self.registry.lock();
        for connection in connections.iter() {
            connection.shutdown.cancel();
        }
        info!(connections = connections.len(), "listener stopped");
    }

    /// Waits for the accept loop and all connection tasks to finish.
    pub async fn join(&self) {
        let accept_task = self.accept_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(accept_task) = accept_task {
            if let Err(e) = accept_task.await {
                warn!(cause = %e, "accept loop ended abnormally");
            }
        }

        let connections = std::mem::take(&mut *self.registry.lock());
        for connection in connections {
            if let Err(e) = connection.task.await {
                warn!(remote_addr = %connection.remote_addr, cause = %e, "connection task ended abnormally");
            }
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr)
            .field("stopped", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn bind(config: &ServerConfig) -> std::io::Result<TcpListener> {
    let socket = if config.address.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
    socket.set_reuseaddr(true)?;
    socket.bind(config.address)?;
    socket.listen(config.backlog)
}

struct AcceptLoop<H> {
    tcp_listener: TcpListener,
    handler: Arc<H>,
    spawner: Arc<dyn Spawn>,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
    max_head_size: usize,
}

impl<H: Handler + 'static> AcceptLoop<H> {
    async fn run(self) {
        loop {
            let (tcp_stream, remote_addr) = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                accepted = self.tcp_listener.accept() => match accepted {
                    Ok(stream_and_addr) => stream_and_addr,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
            };

            let connection_shutdown = CancellationToken::new();
            let (reader, writer) = tcp_stream.into_split();
            let connection = HttpConnection::new(reader, writer)
                .with_remote_addr(remote_addr)
                .with_max_head_size(self.max_head_size)
                .with_shutdown(connection_shutdown.clone());

            let handler = Arc::clone(&self.handler);
            let task = self.spawner.spawn(Box::pin(async move {
                match connection.process(handler).await {
                    Ok(()) => debug!(%remote_addr, "finished process, connection shutdown"),
                    Err(e) => warn!(%remote_addr, cause = %e, "service has error, connection shutdown"),
                }
            }));

            let mut connections = self.registry.lock();
            connections.retain(ConnectionEntry::is_alive);
            if self.shutdown.is_cancelled() {
                connection_shutdown.cancel();
            }
            connections.push(ConnectionEntry { remote_addr, shutdown: connection_shutdown, task });
            debug!(%remote_addr, open = connections.len(), "accepted connection");
        }

        info!("accept loop stopped");
    }
}
