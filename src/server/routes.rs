use warp::Filter;

use super::{filters, handlers};
use crate::authz::Authorizer;
use crate::client::IdentityClient;
use crate::config::Config;

/// Assembles every route served under the configured base path: the data endpoint, the alive
/// endpoint and the static viewer bundle, in that order
pub fn api<A>(
    authorizer: A,
    client: IdentityClient,
    config: &Config,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone
where
    A: Authorizer + Clone + Send + Sync + 'static,
{
    data(authorizer, config)
        .or(alive(client, &config.base_path))
        .or(viewer(config))
        .recover(filters::handle_not_found)
        .with(warp::log::custom(|info| {
            tracing::debug!("{} - {}", info.method(), info.path())
        }))
}

pub fn data<A>(
    authorizer: A,
    config: &Config,
) -> impl Filter<Extract = (warp::reply::Response,), Error = warp::Rejection> + Clone
where
    A: Authorizer + Clone + Send + Sync + 'static,
{
    filters::base_path(&config.base_path)
        .and(warp::path("data"))
        .and(warp::get())
        .and(warp::path::tail())
        .and(filters::auth_data())
        .and(filters::with_authorizer(authorizer))
        .and(filters::with_data_root(config.zarr_data_base_path.clone()))
        .and_then(handlers::serve_data)
}

pub fn alive(
    client: IdentityClient,
    base_path: &str,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    filters::base_path(base_path)
        .and(warp::path("alive"))
        .and(warp::path::end())
        .and(warp::get())
        .and(filters::with_client(client))
        .and_then(handlers::alive)
}

/// Serves the viewer bundle. Requests for a directory get its `index.html`
pub fn viewer(
    config: &Config,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    filters::base_path(&config.base_path)
        .and(warp::get())
        .and(warp::fs::dir(config.vizarr_static_files_path.clone()))
}
