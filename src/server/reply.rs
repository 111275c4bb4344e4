//! Plain text replies for every error the data endpoint can return. Bodies are fixed strings so
//! nothing about the filesystem or the identity service leaks to the caller

use warp::http::StatusCode;
use warp::reply::Response;
use warp::Reply;

pub const NOT_FOUND: &str = "Not Found";
pub const UNAUTHORIZED: &str = "Unauthorized";
pub const FORBIDDEN: &str = "Forbidden";
pub const IS_DIRECTORY: &str = "Is directory";
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

/// A `text/plain` reply with the given status
pub fn text(body: &'static str, status: StatusCode) -> Response {
    warp::reply::with_status(body, status).into_response()
}

pub fn not_found() -> Response {
    text(NOT_FOUND, StatusCode::NOT_FOUND)
}

pub fn unauthorized() -> Response {
    text(UNAUTHORIZED, StatusCode::UNAUTHORIZED)
}

pub fn forbidden() -> Response {
    text(FORBIDDEN, StatusCode::FORBIDDEN)
}

pub fn is_directory() -> Response {
    text(IS_DIRECTORY, StatusCode::BAD_REQUEST)
}

pub fn internal_error() -> Response {
    text(INTERNAL_SERVER_ERROR, StatusCode::INTERNAL_SERVER_ERROR)
}
