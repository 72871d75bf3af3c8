use std::convert::Infallible;

use anyhow::Result;
use hyper::service::{make_service_fn, service_fn};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use hyper_websocket_server::endpoints::request_router;
use hyper_websocket_server::{AppConfig, ConnectionEvent, Server, ServerEvent};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Every text message a client sends is relayed to all clients.
fn relay_chat(server: &Server) {
    let relay = server.clone();
    server.on_connect(move |ServerEvent::Connect(connection)| {
        let relay = relay.clone();
        let id = connection.id();
        connection.on(move |event| {
            match event {
                ConnectionEvent::Message(message) => {
                    let delivered = relay.broadcast_with(&message.payload, message.kind);
                    debug!(conn_id = %id, delivered, "relayed message");
                }
                ConnectionEvent::Close => info!(conn_id = %id, "client left"),
                ConnectionEvent::Error(e) => debug!(conn_id = %id, error = %e, "client error"),
            }
            Ok(())
        });
        Ok(())
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let config = AppConfig::from_env()?;

    let server = Server::new(config.server.clone());
    relay_chat(&server);

    let service = make_service_fn(move |_addr| {
        let server = server.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| request_router(req, server.clone())))
        }
    });

    let http = hyper::Server::try_bind(&config.addr)?.serve(service);
    info!("Listening at http://{}", config.addr);
    http.await?;

    Ok(())
}
