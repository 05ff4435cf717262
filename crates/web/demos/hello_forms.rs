//! A small sign-in flow built on forms, parameters and signed sessions.
//!
//! ```text
//! curl -v -d "email=bob@example.com&remember=true" http://127.0.0.1:8080/login
//! curl -v -H "Cookie: session=<token>" "http://127.0.0.1:8080/hello?times=3"
//! curl -v -F "file=@image.gif" http://127.0.0.1:8080/upload
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, StatusCode};
use minihttp::config::ServerConfig;
use minihttp::connection::Listener;
use minihttp::exchange::Exchange;
use minihttp::handler::Handler;
use minihttp::protocol::HandlerError;
use minihttp_web::form::{read_multipart, read_url_encoded};
use minihttp_web::params;
use minihttp_web::session::{SessionStore, SignedTokenStore};
use serde::{Deserialize, Serialize};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Serialize, Deserialize, Debug)]
struct Login {
    email: String,
    remember: bool,
}

#[derive(Debug)]
struct App {
    sessions: SignedTokenStore<Login>,
}

impl App {
    async fn login(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        let form = read_url_encoded(exchange).await?;
        let login = Login {
            email: params::mandatory_email(&form, "email")?.to_owned(),
            remember: params::optional_bool(&form, "remember", false)?,
        };

        info!(email = %login.email, "signing in");
        self.sessions.set_session(exchange, login).await?;
        exchange.send_text("signed in\r\n");
        Ok(())
    }

    async fn hello(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        let login = self.sessions.get_session(exchange).await?;
        let times = params::bounded_number(&*exchange, "times", 1, 1, 10)?;

        exchange.send_text(format!("hello {}\r\n", login.email).repeat(times));
        Ok(())
    }

    async fn upload(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        let parts = read_multipart(exchange).await?;
        let summary: String = parts
            .iter()
            .map(|part| format!("{} bytes of {}\r\n", part.data().len(), part.content_type().unwrap_or("unknown")))
            .collect();

        exchange.set_status(StatusCode::CREATED);
        exchange.send_text(summary);
        Ok(())
    }

    async fn logout(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        self.sessions.delete_session(exchange).await?;
        Err(HandlerError::redirect("/"))
    }
}

#[async_trait]
impl Handler for App {
    type Error = HandlerError;

    async fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), Self::Error> {
        let path = exchange.path().to_owned();
        match (exchange.method().clone(), path.as_str()) {
            (Method::POST, "/login") => self.login(exchange).await,
            (Method::GET, "/hello") => self.hello(exchange).await,
            (Method::POST, "/upload") => self.upload(exchange).await,
            (Method::GET, "/logout") => self.logout(exchange).await,
            _ => Err(HandlerError::NotFound),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let app = App { sessions: SignedTokenStore::new(b"change me before deploying").map_err(|e| e.to_string())? };
    let listener = Listener::start(ServerConfig::new("127.0.0.1:8080".parse()?), Arc::new(app))?;
    info!(address = %listener.local_addr(), "listening");

    tokio::signal::ctrl_c().await?;
    listener.stop();
    listener.join().await;
    Ok(())
}
