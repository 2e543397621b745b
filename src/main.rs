use clap::Parser;
use querycache::app::App;
use querycache::cli::Args;
use querycache::config::Config;
use querycache::logging::setup_logging;
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = Config::from_env().expect("Failed to load config");
    if let Some(port) = args.port {
        config.port = port;
    }
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting querycache"
    );

    let app = App::new(config).expect("Failed to initialize application");
    app.run().await
}
