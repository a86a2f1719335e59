use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may set RUST_LOG, so it loads before the subscriber
    let _ = dotenvy::dotenv();

    let default_filter = match sitecrawl::cli::is_verbose() {
        true => "sitecrawl=info",
        false => "sitecrawl=warn",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    sitecrawl::cli::run().await
}
