mod discord_commands;
use anyhow::Context as _;
use chrono::TimeDelta;
use poise::{Framework, FrameworkOptions, serenity_prelude as serenity};
use shardwatch_backend::config::Config;
use shardwatch_backend::monitor::{Monitor, SharedStore};
use shardwatch_backend::notifier::Dispatcher;
use shardwatch_backend::source::GraphQlSource;
use shardwatch_backend::{RateLimitConfig, create_app};
use shardwatch_db::StateStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

type Context<'a> = poise::Context<'a, crate::Data, crate::discord_commands::Error>;

pub(crate) struct Data {
    pub(crate) store: SharedStore,
    pub(crate) stale_after: TimeDelta,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging; RUST_LOG overrides the default
    #[cfg(debug_assertions)]
    let log_level = "debug";
    #[cfg(not(debug_assertions))]
    let log_level = "info";

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting shardwatch...");

    let config = Config::from_env().context("invalid configuration")?;
    tracing::info!(
        "Configuration: source={}, poll={}s, notify={}s, db_path={}, port={}, recipients={}",
        config.status_api_url,
        config.intervals.poll.as_secs(),
        config.intervals.notify.as_secs(),
        config.database_path,
        config.port,
        config.recipient_count()
    );

    let (store, prior) = StateStore::open(&config.database_path)
        .await
        .with_context(|| format!("unable to open state store at {}", config.database_path))?;
    tracing::info!(?prior, "state store ready");
    let store: SharedStore = Arc::new(Mutex::new(store));

    let source = GraphQlSource::new(&config.status_api_url, config.status_api_timeout)
        .context("unable to build status client")?;
    let discord_http = config
        .discord_token
        .as_deref()
        .map(|token| Arc::new(serenity::Http::new(token)));
    let notify_http = reqwest::Client::builder()
        .timeout(config.notify_timeout)
        .build()
        .context("unable to build notice client")?;
    let dispatcher = Dispatcher::new(
        config.recipients.clone(),
        notify_http,
        discord_http,
        config.pushover_app_token.clone(),
        config.notice_title.clone(),
        config.notify_timeout,
    );
    let monitor = Monitor::new(Arc::clone(&store), source, dispatcher, config.intervals);

    let app = create_app(
        Arc::clone(&store),
        config.request_body_limit,
        config.request_timeout,
        RateLimitConfig {
            per_sec: config.rate_limit_per_sec,
            burst: config.rate_limit_burst,
        },
        config.stale_after,
    );
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("unable to bind {addr}"))?;
    tracing::info!("Server listening on {}", addr);

    let bot = async {
        let Some(token) = config.discord_token.as_deref() else {
            tracing::info!("DISCORD_TOKEN not set, bot disabled");
            return std::future::pending::<()>().await;
        };
        let data_store = Arc::clone(&store);
        let stale_after = config.stale_after;
        let framework = Framework::builder()
            .options(FrameworkOptions {
                commands: vec![discord_commands::servers(), discord_commands::server()],
                pre_command: |ctx| {
                    Box::pin(async move {
                        tracing::info!(
                            "Executing command '{}' by user '{}'",
                            ctx.command().name,
                            ctx.author().name
                        );
                    })
                },
                ..Default::default()
            })
            .setup(move |ctx, _ready, framework| {
                Box::pin(async move {
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    Ok(Data {
                        store: data_store,
                        stale_after,
                    })
                })
            })
            .build();

        let client = serenity::ClientBuilder::new(token, serenity::GatewayIntents::default())
            .framework(framework)
            .await;
        match client {
            Ok(mut client) => {
                if let Err(e) = client.start().await {
                    tracing::error!("Discord client error: {:?}", e);
                }
            }
            Err(e) => tracing::error!("Error creating Discord client: {:?}", e),
        }
        // the monitor keeps running without the bot
        std::future::pending::<()>().await
    };

    tokio::select! {
        _ = monitor.run() => {}
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            if let Err(e) = result {
                tracing::error!("Axum server error: {}", e);
            }
        }
        _ = bot => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    if let Err(err) = store.lock().await.persist().await {
        tracing::error!(%err, "unable to write server state on shutdown");
    }
    tracing::info!("Stopped");
    Ok(())
}
