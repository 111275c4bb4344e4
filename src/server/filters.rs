use std::convert::Infallible;
use std::path::PathBuf;

use tracing::{debug, instrument};
use warp::filters::BoxedFilter;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::authn::AuthData;
use crate::authz::Authorizer;
use crate::client::IdentityClient;

/// A warp filter that matches the configured base path, one segment at a time. A base path of `/`
/// matches everything
pub fn base_path(base: &str) -> BoxedFilter<()> {
    base.split('/')
        .filter(|segment| !segment.is_empty())
        .fold(warp::any().boxed(), |filter, segment| {
            filter.and(warp::path(segment.to_owned())).boxed()
        })
}

/// A warp filter that collects the authentication-related headers of a request. Both headers are
/// optional as some schemes allow anonymous access
pub fn auth_data() -> impl Filter<Extract = (AuthData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::header::optional::<String>("cookie"))
        .map(|auth_header, cookie_header| AuthData {
            auth_header,
            cookie_header,
        })
}

pub fn with_authorizer<A>(
    authorizer: A,
) -> impl Filter<Extract = (A,), Error = Infallible> + Clone
where
    A: Authorizer + Clone + Send,
{
    // We have to clone for this to be Fn instead of FnOnce
    warp::any().map(move || authorizer.clone())
}

pub fn with_client(
    client: IdentityClient,
) -> impl Filter<Extract = (IdentityClient,), Error = Infallible> + Clone {
    warp::any().map(move || client.clone())
}

pub fn with_data_root(
    data_root: Option<PathBuf>,
) -> impl Filter<Extract = (Option<PathBuf>,), Error = Infallible> + Clone {
    warp::any().map(move || data_root.clone())
}

/// Turns warp's own "no route matched" rejection into the same plain text 404 the data endpoint
/// uses. Everything else is left to warp
#[instrument(level = "trace", skip(err))]
pub(crate) async fn handle_not_found(err: Rejection) -> Result<impl Reply, Rejection> {
    if err.is_not_found() {
        debug!("Handling rejection as not found");
        Ok(super::reply::not_found())
    } else {
        Err(err)
    }
}
