use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vizarr_gate::{server::server, IdentityClient, RawConfig, SchemeAuthorizer};

const DESCRIPTION: &str = r#"
The Vizarr Gate Server

Serves Zarr image data to the Vizarr viewer, checking every request against an
authorization scheme backed by a Fractal server.
"#;

#[derive(Parser)]
#[clap(name = "vizarr-gate-server", version = clap::crate_version!(), about = DESCRIPTION)]
struct Opts {
    #[clap(long = "port", env = "PORT", help = "the port to listen on [default: 3000]")]
    port: Option<u16>,
    #[clap(
        long = "bind-address",
        env = "BIND_ADDRESS",
        help = "the IP address to listen on [default: 0.0.0.0]"
    )]
    bind_address: Option<String>,
    #[clap(
        long = "fractal-server-url",
        env = "FRACTAL_SERVER_URL",
        help = "the base URL of the Fractal server used to resolve users"
    )]
    fractal_server_url: Option<String>,
    #[clap(
        long = "base-path",
        env = "BASE_PATH",
        help = "the URL prefix every route is served under [default: /vizarr]"
    )]
    base_path: Option<String>,
    #[clap(
        long = "static-files-path",
        env = "VIZARR_STATIC_FILES_PATH",
        help = "the directory containing the built viewer"
    )]
    vizarr_static_files_path: Option<PathBuf>,
    #[clap(
        long = "authorization-scheme",
        env = "AUTHORIZATION_SCHEME",
        help = "one of: none, testing-basic-auth, user-folders, fractal-server-viewer-paths, fractal-server"
    )]
    authorization_scheme: Option<String>,
    #[clap(
        long = "data-path",
        env = "ZARR_DATA_BASE_PATH",
        help = "the absolute path under which all data is served. Required for the none, testing-basic-auth and user-folders schemes"
    )]
    zarr_data_base_path: Option<PathBuf>,
    #[clap(
        long = "testing-username",
        env = "TESTING_USERNAME",
        help = "the username accepted by the testing-basic-auth scheme"
    )]
    testing_username: Option<String>,
    #[clap(
        long = "testing-password",
        env = "TESTING_PASSWORD",
        hide_env_values = true,
        help = "the password accepted by the testing-basic-auth scheme"
    )]
    testing_password: Option<String>,
    #[clap(
        long = "cache-expiration-time",
        env = "CACHE_EXPIRATION_TIME",
        help = "seconds a resolved user, settings or path list is cached [default: 60]"
    )]
    cache_expiration_time: Option<u64>,
    #[clap(
        long = "upstream-timeout",
        env = "UPSTREAM_TIMEOUT",
        help = "timeout in seconds for every request to the Fractal server [default: 10]"
    )]
    upstream_timeout: Option<u64>,
    #[clap(
        long = "cache-wait-timeout",
        env = "CACHE_WAIT_TIMEOUT",
        help = "seconds a request waits for another request's lookup of the same credential [default: 30]"
    )]
    cache_wait_timeout: Option<u64>,
    #[clap(
        long = "cache-max-entries",
        env = "CACHE_MAX_ENTRIES",
        help = "how many credentials each cache remembers before evicting the least recently used [default: 10000]"
    )]
    cache_max_entries: Option<usize>,
    #[clap(
        name = "config_file",
        long = "config-path",
        help = "the path to a configuration file [default: $XDG_CONFIG_HOME/vizarr-gate/server.toml]"
    )]
    config_file: Option<PathBuf>,
    #[clap(
        long = "log-level",
        env = "LOG_LEVEL_CONSOLE",
        default_value = "info",
        help = "the log level (or filter directives) for console output. RUST_LOG takes precedence"
    )]
    log_level_console: String,
    #[clap(
        long = "log-file",
        env = "LOG_FILE",
        help = "a file to append log output to"
    )]
    log_file: Option<PathBuf>,
    #[clap(
        long = "log-level-file",
        env = "LOG_LEVEL_FILE",
        default_value = "info",
        help = "the log level (or filter directives) for the log file"
    )]
    log_level_file: String,
}

impl Opts {
    fn raw_config(&self) -> RawConfig {
        RawConfig {
            port: self.port,
            bind_address: self.bind_address.clone(),
            fractal_server_url: self.fractal_server_url.clone(),
            base_path: self.base_path.clone(),
            vizarr_static_files_path: self.vizarr_static_files_path.clone(),
            authorization_scheme: self.authorization_scheme.clone(),
            zarr_data_base_path: self.zarr_data_base_path.clone(),
            testing_username: self.testing_username.clone(),
            testing_password: self.testing_password.clone(),
            cache_expiration_time: self.cache_expiration_time,
            upstream_timeout: self.upstream_timeout,
            cache_wait_timeout: self.cache_wait_timeout,
            cache_max_entries: self.cache_max_entries,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    init_logging(&opts)?;

    // load config file if it exists. A missing default file is fine, a missing file that was
    // asked for explicitly is not
    let config_file = match &opts.config_file {
        Some(path) => Some(load_toml::<RawConfig>(path.clone()).await?),
        None => match default_config_file() {
            Some(path) if path.is_file() => Some(load_toml::<RawConfig>(path).await?),
            _ => None,
        },
    };

    // Settings are taken from
    //   1. cli options or environment if set
    //   2. config file if set
    //   3. default
    let raw = match config_file {
        Some(file) => opts.raw_config().or(file),
        None => opts.raw_config(),
    };
    let config = match raw.validate() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };
    config.log_settings();

    let client = IdentityClient::new(config.fractal_server_url.as_str(), config.client_options())?;
    let authorizer = match SchemeAuthorizer::from_config(&config, client.clone()) {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    info!(
        "Starting server at {}:{}{}, using authorization scheme {}",
        config.bind_address, config.port, config.base_path, config.authorization_scheme
    );

    server(authorizer, client, &config).await
}

/// Logs to stderr and, if a log file is given, to that file as well. Each output has its own level
fn init_logging(opts: &Opts) -> anyhow::Result<()> {
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(&opts.log_level_console)?,
    };
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file = match &opts.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("failed to open log file {}: {}", path.display(), e))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::try_new(&opts.log_level_file)?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry().with(console).with(file).init();
    Ok(())
}

fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|v| v.join("vizarr-gate/server.toml"))
}

async fn load_toml<T>(file: PathBuf) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let raw_data = tokio::fs::read(&file)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read TOML file {}: {}", file.display(), e))?;
    let res = toml::from_slice::<T>(&raw_data)?;
    Ok(res)
}
