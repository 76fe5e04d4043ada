use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use spi_token_fetcher::{
    BootstrapError, CancellationToken, DEFAULT_NAMESPACE, FetchError, FetcherConfig, KubeStore,
    Permission, Permissions, SpiTokenFetcher, TokenRequest,
};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

#[derive(Debug, Parser)]
#[command(
    name = "spi-token-fetcher",
    about = "Obtain an access token for a repository through SPI and print the Authorization header value."
)]
struct Cli {
    /// Repository the token must grant access to.
    #[arg(long, env = "SPI_REPO_URL")]
    repo_url: String,

    #[arg(long, env = "SPI_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Required permission as TYPE:AREA, e.g. rw:repository. Repeatable.
    #[arg(long = "permission", value_name = "TYPE:AREA")]
    permissions: Vec<Permission>,

    /// Additional provider-specific scope. Repeatable.
    #[arg(long = "scope", value_name = "SCOPE")]
    scopes: Vec<String>,

    /// API server to use instead of the in-cluster configuration.
    #[arg(long, env = "SPI_API_SERVER", requires = "token_file")]
    api_server: Option<Url>,

    /// Bearer token file for --api-server.
    #[arg(long, env = "SPI_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Seconds to wait for the binding to be linked to a token.
    #[arg(long, default_value_t = 60)]
    link_timeout: u64,

    /// Seconds to wait for the token to become ready, login included.
    #[arg(long, default_value_t = 600)]
    token_timeout: u64,

    /// Print the login URL without opening a browser.
    #[arg(long)]
    no_browser: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let store = match (&cli.api_server, &cli.token_file) {
        (Some(api_server), Some(token_file)) => {
            KubeStore::from_token_file(api_server.clone(), token_file)?
        }
        _ => KubeStore::in_cluster()?,
    };

    let config = FetcherConfig::new()
        .with_namespace(cli.namespace.clone())
        .with_link_timeout(Duration::from_secs(cli.link_timeout))
        .with_token_timeout(Duration::from_secs(cli.token_timeout));
    let fetcher = SpiTokenFetcher::new(store, config);

    let mut request = TokenRequest::new(cli.repo_url.clone());
    if let Some(permissions) = requested_permissions(&cli, fetcher.config()) {
        request = request.with_permissions(permissions);
    }
    let open_browser = !cli.no_browser;
    let request = request.on_login(move |url| {
        eprintln!("Authorization URL:\n{url}");
        if open_browser {
            if let Err(err) = webbrowser::open(&url) {
                eprintln!("Failed to open browser automatically: {err}");
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let header = fetcher.acquire_token_with_cancel(request, cancel).await?;
    println!("{}", header.as_str());
    Ok(())
}

fn requested_permissions(cli: &Cli, config: &FetcherConfig) -> Option<Permissions> {
    if cli.permissions.is_empty() && cli.scopes.is_empty() {
        return None;
    }
    let required = if cli.permissions.is_empty() {
        config.default_permissions.required.clone()
    } else {
        cli.permissions.clone()
    };
    Some(Permissions {
        required,
        additional_scopes: cli.scopes.clone(),
    })
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}
