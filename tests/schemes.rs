//! End-to-end tests for every authorization scheme: configuration is validated, the authorizer is
//! built from it and requests go through the full route stack, with the identity service mocked

mod common;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{TestEnv, IMAGE_BYTES};
use serde_json::json;
use vizarr_gate::client::IdentityClient;
use vizarr_gate::server::routes;
use vizarr_gate::{Config, SchemeAuthorizer};
use warp::http::StatusCode;
use warp::Filter;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UNREACHABLE: &str = "http://127.0.0.1:1";

fn api(
    config: &Config,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let client = IdentityClient::new(config.fractal_server_url.as_str(), config.client_options())
        .expect("client should build");
    let authorizer =
        SchemeAuthorizer::from_config(config, client.clone()).expect("authorizer should build");
    routes::api(authorizer, client, config)
}

fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

#[tokio::test]
async fn test_none_scheme() {
    let env = TestEnv::new();
    let api = api(&env.config("none", UNREACHABLE));

    let res = warp::test::request()
        .path(&env.data_url("alice/img.zarr/0/0"))
        .reply(&api)
        .await;
    assert_eq!(StatusCode::OK, res.status());
    assert_eq!(IMAGE_BYTES, res.body().as_ref());

    // The data root still bounds everything
    let res = warp::test::request()
        .path(&env.data_url("../secret.txt"))
        .reply(&api)
        .await;
    assert_eq!(StatusCode::NOT_FOUND, res.status());
}

#[tokio::test]
async fn test_testing_basic_auth_scheme() {
    let env = TestEnv::new();
    let api = api(&env.config("testing-basic-auth", UNREACHABLE));
    let url = env.data_url("bob/img.zarr/0/0");

    let res = warp::test::request()
        .path(&url)
        .header("authorization", basic("test", "password"))
        .reply(&api)
        .await;
    assert_eq!(StatusCode::OK, res.status());

    let res = warp::test::request()
        .path(&url)
        .header("authorization", basic("test", "wrong"))
        .reply(&api)
        .await;
    assert_eq!(StatusCode::FORBIDDEN, res.status());

    let res = warp::test::request().path(&url).reply(&api).await;
    assert_eq!(StatusCode::UNAUTHORIZED, res.status());
}

async fn mock_current_user(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/auth/current-user/"))
        .and(header("cookie", "fastapiusersauth=alice-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": 1, "email": "alice@example.com"})),
        )
        .mount(server)
        .await;
}

fn alice() -> (&'static str, &'static str) {
    ("cookie", "fastapiusersauth=alice-token")
}

#[tokio::test]
async fn test_user_folders_scheme() {
    let server = MockServer::start().await;
    mock_current_user(&server).await;
    Mock::given(method("GET"))
        .and(path("/auth/current-user/settings/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"slurm_user": "alice", "project_dir": null})),
        )
        .mount(&server)
        .await;

    let env = TestEnv::new();
    let api = api(&env.config("user-folders", &server.uri()));
    let (name, value) = alice();

    let res = warp::test::request()
        .path(&env.data_url("alice/img.zarr/0/0"))
        .header(name, value)
        .reply(&api)
        .await;
    assert_eq!(StatusCode::OK, res.status());

    let res = warp::test::request()
        .path(&env.data_url("bob/img.zarr/0/0"))
        .header(name, value)
        .reply(&api)
        .await;
    assert_eq!(StatusCode::FORBIDDEN, res.status());

    let res = warp::test::request()
        .path(&env.data_url("alice/img.zarr/0/0"))
        .header("cookie", "fastapiusersauth=someone-else")
        .reply(&api)
        .await;
    assert_eq!(
        StatusCode::UNAUTHORIZED,
        res.status(),
        "unknown tokens are rejected by the identity service"
    );
}

#[tokio::test]
async fn test_viewer_paths_scheme() {
    let server = MockServer::start().await;
    let env = TestEnv::new();
    mock_current_user(&server).await;
    Mock::given(method("GET"))
        .and(path("/auth/current-user/settings/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"project_dir": null})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/current-user/viewer-paths/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([env.data_root.join("alice")])),
        )
        .mount(&server)
        .await;

    let api = api(&env.config("fractal-server-viewer-paths", &server.uri()));
    let (name, value) = alice();

    let res = warp::test::request()
        .path(&env.data_url("alice/img.zarr/0/0"))
        .header(name, value)
        .reply(&api)
        .await;
    assert_eq!(StatusCode::OK, res.status());

    let res = warp::test::request()
        .path(&env.data_url("alice/../bob/img.zarr/0/0"))
        .header(name, value)
        .reply(&api)
        .await;
    assert_eq!(StatusCode::FORBIDDEN, res.status());
}

#[tokio::test]
async fn test_fractal_server_scheme_without_data_root() {
    let server = MockServer::start().await;
    let env = TestEnv::new();
    Mock::given(method("GET"))
        .and(path("/auth/current-user/"))
        .and(header("authorization", "Bearer alice-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": 1, "email": "alice@example.com"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/current-user/allowed-viewer-paths/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([env.data_root.join("alice")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut raw = env.raw_config("fractal-server", &server.uri());
    raw.zarr_data_base_path = None;
    let api = api(&raw.validate().expect("config should be valid"));

    // Without a data root, request paths are absolute filesystem paths
    let absolute = env.data_root.join("alice/img.zarr/0/0");
    let url = format!("/vizarr/data{}", absolute.display());
    let requests = (0..10).map(|_| {
        warp::test::request()
            .path(&url)
            .header("authorization", "Bearer alice-token")
            .reply(&api)
    });
    for res in futures::future::join_all(requests).await {
        assert_eq!(StatusCode::OK, res.status());
        assert_eq!(IMAGE_BYTES, res.body().as_ref());
    }

    let res = warp::test::request()
        .path(&env.data_url("alice/img.zarr/0/0"))
        .header("authorization", "Bearer alice-token")
        .reply(&api)
        .await;
    assert_eq!(
        StatusCode::FORBIDDEN,
        res.status(),
        "without a data root the path is taken as is and is not in the allowed list"
    );
}

#[tokio::test]
async fn test_anonymous_never_reaches_identity_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let env = TestEnv::new();
    for scheme in ["user-folders", "fractal-server-viewer-paths", "fractal-server"] {
        let api = api(&env.config(scheme, &server.uri()));
        let res = warp::test::request()
            .path(&env.data_url("alice/img.zarr/0/0"))
            .reply(&api)
            .await;
        assert_eq!(StatusCode::UNAUTHORIZED, res.status(), "scheme {}", scheme);
        assert_eq!(res.body(), "Unauthorized", "scheme {}", scheme);
    }
}
