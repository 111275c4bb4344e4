use std::convert::Infallible;
use std::path::PathBuf;

use bytes::BytesMut;
use futures::TryStreamExt;
use hyper::Body;
use tokio::fs::File;
use tokio_util::codec::{BytesCodec, FramedRead};
use tracing::{debug, error, info, instrument};
use warp::http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use warp::reply::Response;

use super::reply;
use crate::authn::AuthData;
use crate::authz::Authorizer;
use crate::client::IdentityClient;
use crate::path::get_valid_path;
use crate::AliveResponse;

const OCTET_STREAM_MIME_TYPE: &str = "application/octet-stream";

/// Serves a single file from the data root. Checks run in a fixed order and stop at the first
/// failure: path validity (404), user validity (401), authorization (403), existence (404) and
/// finally that the path is not a directory (400)
#[instrument(level = "trace", skip(tail, auth_data, authorizer, data_root), fields(path = %tail.as_str()))]
pub async fn serve_data<A>(
    tail: warp::path::Tail,
    auth_data: AuthData,
    authorizer: A,
    data_root: Option<PathBuf>,
) -> Result<Response, Infallible>
where
    A: Authorizer + Send + Sync,
{
    let request_path = format!("/{}", tail.as_str());
    let path = match get_valid_path(&request_path, data_root.as_deref()) {
        Some(p) => p,
        None => {
            info!(path = %request_path, "Invalid path");
            return Ok(reply::not_found());
        }
    };

    if !authorizer.is_user_valid(&auth_data).await {
        info!("Unauthorized request");
        return Ok(reply::unauthorized());
    }
    if !authorizer.is_user_authorized(&path, &auth_data).await {
        info!(path = %path.display(), "Forbidden request");
        return Ok(reply::forbidden());
    }

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) => {
            info!(path = %path.display(), error = %e, "File not found");
            return Ok(reply::not_found());
        }
    };
    if metadata.is_dir() {
        info!(path = %path.display(), "Path is a directory");
        return Ok(reply::is_directory());
    }

    let file = match File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Unable to open file");
            return Ok(reply::internal_error());
        }
    };
    debug!(path = %path.display(), size = metadata.len(), "Streaming file");

    // Dropping the body (e.g. on client disconnect) drops the stream and closes the file
    let display_path = path.display().to_string();
    let stream = FramedRead::new(file, BytesCodec::new())
        .map_ok(BytesMut::freeze)
        .map_err(move |e| {
            error!(path = %display_path, error = %e, "Error while streaming file");
            e
        });

    let mut resp = Response::new(Body::wrap_stream(stream));
    let headers = resp.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(OCTET_STREAM_MIME_TYPE),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    Ok(resp)
}

/// Reports this server's status together with the status of the identity service
#[instrument(level = "trace", skip(client))]
pub async fn alive(client: IdentityClient) -> Result<impl warp::Reply, Infallible> {
    let (fractal_server_alive, fractal_server_version) = match client.alive().await {
        Ok(status) => (status.alive, status.version),
        Err(e) => {
            debug!(error = %e, "Unable to reach the identity service");
            (false, None)
        }
    };
    Ok(warp::reply::json(&AliveResponse {
        alive: true,
        version: env!("CARGO_PKG_VERSION").to_owned(),
        fractal_server_alive,
        fractal_server_version,
    }))
}
