use hyper::{Body, Response, StatusCode};

use crate::utils::*;

fn plain(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    apply_cors(&mut response);
    apply_content_type(&mut response);
    *response.status_mut() = status;
    response
}

pub fn hello() -> Response<Body> {
    plain(StatusCode::OK, "Hello from hyper!")
}

pub fn not_found() -> Response<Body> {
    plain(StatusCode::NOT_FOUND, "Not found")
}

pub fn bad_request(reason: &str) -> Response<Body> {
    plain(StatusCode::BAD_REQUEST, reason.to_string())
}
