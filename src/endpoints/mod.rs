mod plain;
mod ws;

pub use plain::{bad_request, hello, not_found};
pub use ws::handle_ws;

use std::convert::Infallible;

use hyper::{Body, Request, Response};
use tracing::debug;

use crate::shared::types::StdResult;
use crate::ws::Server;

pub async fn request_router(req: Request<Body>, server: Server) -> StdResult<Response<Body>, Infallible> {
    debug!(uri = %req.uri(), "request");
    let path = req.uri().path().to_string();
    let response = match path.as_str() {
        "/" => hello(),
        "/ws" => handle_ws(req, server),
        _ => not_found(),
    };
    Ok(response)
}
