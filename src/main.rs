use std::sync::Arc;

use clap::Parser;
use voicegate::cli::{Cli, Commands};
use voicegate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("voicegate=info".parse()?),
        )
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Status => voicegate::commands::show_status(&config),
        Commands::HealthCheck => voicegate::commands::health_check(&config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!(bind_addr = %config.server.bind_addr, "starting voicegate");

    let transcriber: Arc<dyn voicegate::transcribe::Transcriber> = if Config::testing_mode() {
        Arc::new(voicegate::transcribe::mock::MockTranscriber::default())
    } else {
        Arc::new(voicegate::transcribe::openai::OpenAiTranscriber::new(
            &config.transcription.openai,
        )?)
    };

    let config = Arc::new(config);
    let connections = Arc::new(voicegate::connection_manager::ConnectionManager::new(
        Arc::clone(&config),
        transcriber,
    ));
    let app = voicegate::server::build_router(connections);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!(bind_addr = %config.server.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
