use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONNECTION, SEC_WEBSOCKET_ACCEPT, UPGRADE,
};
use hyper::{Body, Request, Response, StatusCode};
use tracing::{debug, warn};

use super::plain::bad_request;
use crate::ws::handshake::{accept_key, sec_websocket_key};
use crate::ws::Server;

/// Answers a websocket upgrade request and hands the upgraded stream to
/// `server` once hyper releases it.
pub fn handle_ws(mut req: Request<Body>, server: Server) -> Response<Body> {
    debug!("ws incoming connection");
    let sec_accept = match sec_websocket_key(req.headers()) {
        Ok(key) => accept_key(key.as_bytes()),
        Err(e) => {
            warn!(error = %e, "rejecting upgrade");
            return bad_request(&e.to_string());
        }
    };
    let sec_accept = match HeaderValue::from_str(&sec_accept) {
        Ok(value) => value,
        Err(e) => return bad_request(&e.to_string()),
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(&mut req).await {
            Ok(upgraded) => {
                let connection = server.accept(upgraded);
                debug!(conn_id = %connection.id(), "upgraded");
            }
            Err(e) => warn!(error = %e, "upgrade error"),
        }
    });

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(SEC_WEBSOCKET_ACCEPT, sec_accept);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_with_accept_token() {
        let req = Request::builder()
            .uri("/ws")
            .header("upgrade", "websocket")
            .header("connection", "Upgrade")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let response = handle_ws(req, Server::default());
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(
            response.headers()[SEC_WEBSOCKET_ACCEPT],
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
        assert_eq!(response.headers()[UPGRADE], "websocket");
    }

    #[tokio::test]
    async fn missing_key_is_rejected() {
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let response = handle_ws(req, Server::default());
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
