use std::sync::Arc;

use nostr_directory_bot::{
    AppState,
    commands::Handler,
    config::Config,
    db::Store,
    directory::Directory,
    export::{Exporter, GithubSink, PublishSink, Remote},
    render::Renderer,
    telegram::{Bot, TelegramChannel},
    web,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    let store = Store::open(&config.database_url).await?;
    let bot = Bot::new(&config.bot_token, config.poll_timeout_secs)?;

    let remote = match &config.github {
        Some(github) => {
            let sink: Arc<dyn PublishSink> = Arc::new(GithubSink::new(github)?);
            Some(Remote {
                sink,
                path: github.path.clone(),
            })
        }
        None => None,
    };
    let exporter = Exporter::new(
        store.clone(),
        config.viewer_base_url.clone(),
        config.export_path.clone(),
        remote,
    );
    let directory = Directory::new(
        store.clone(),
        Arc::new(TelegramChannel::new(bot.clone(), config.allowed_thread_id)),
        Renderer::new(config.viewer_base_url.clone(), config.max_chunk_size),
        exporter,
    );
    let handler = Handler::new(bot, store.clone(), directory, config.clone());

    let app = web::router(AppState {
        store: store.clone(),
        config: config.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.http_bind).await?;
    info!(addr = %config.http_bind, "serving directory document");
    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!("http server stopped: {err}");
        }
    });

    tokio::select! {
        _ = handler.run() => {}
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    server.abort();
    store.close().await;
    Ok(())
}
