use std::io::IsTerminal;
use std::sync::Arc;

use tokio::sync::watch;

use hourbell_bot::auth::{Caller, RoleAuthorizer};
use hourbell_bot::console::{CommandHandler, run_console};
use hourbell_bot::supervisor::spawn_supervised;
use hourbell_common::config::{AppConfig, RuntimeConfig};
use hourbell_common::platform::ChatPlatform;
use hourbell_common::types::UserId;
use hourbell_engine::{AdminService, DriftWatchdog, JsonFileStorage, SubscriptionStore, TickScheduler};
use hourbell_notifier::{DiscordRest, MessageDispatcher};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "hourbell_bot=info,hourbell_engine=info,hourbell_notifier=info".into()
    });

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so LOG_FORMAT / RUST_LOG from .env apply
    let config = AppConfig::from_env()?;
    init_tracing();

    tracing::info!("Hourbell starting...");

    let timezone = config.home_timezone();
    let runtime_config = Arc::new(RuntimeConfig::from_app_config(&config)?);
    let platform: Arc<dyn ChatPlatform> =
        Arc::new(DiscordRest::new(&config.discord_api_base, &config.discord_bot_token)?);

    // The channel may come online later; alerts to it are dropped until then
    match platform.resolve_channel(runtime_config.active_channel()).await {
        Ok(Some(_)) => tracing::info!(channel_id = %runtime_config.active_channel(), "Alert channel resolved"),
        Ok(None) => tracing::warn!(channel_id = %runtime_config.active_channel(), "Alert channel not found"),
        Err(e) => tracing::warn!(error = %e, "Could not check alert channel"),
    }

    let store = Arc::new(SubscriptionStore::load(Arc::new(JsonFileStorage::new(
        &config.subscriptions_path,
    ))));

    let dispatcher = Arc::new(MessageDispatcher::new(
        Arc::clone(&platform),
        config.dispatch_concurrency,
    ));
    dispatcher.start(config.dispatch_workers);

    let scheduler = Arc::new(TickScheduler::new(
        Arc::clone(&store),
        dispatcher.clone(),
        Arc::clone(&runtime_config),
        timezone,
    ));

    let (shutdown, shutdown_rx) = watch::channel(false);
    let mut tasks = vec![
        spawn_supervised("scheduler", shutdown_rx.clone(), move || {
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.run().await }
        }),
        spawn_supervised("watchdog", shutdown_rx.clone(), || {
            DriftWatchdog::default().run()
        }),
    ];

    if std::io::stdin().is_terminal() {
        let admin = AdminService::new(
            RoleAuthorizer::new(config.admin_role_name.clone()),
            Arc::clone(&runtime_config),
            Arc::clone(&platform),
            Arc::clone(&store),
            dispatcher.clone(),
            timezone,
        );
        let handler = Arc::new(CommandHandler::new(admin, Arc::clone(&store), Arc::clone(&runtime_config)));
        let operator = Caller::new(UserId(0), vec![config.admin_role_name.clone()]);
        tasks.push(tokio::spawn(run_console(handler, operator, shutdown_rx.clone())));
    }

    tracing::info!(
        workers = config.dispatch_workers,
        timezone = %timezone,
        "Hourbell running"
    );

    // Run until Ctrl+C
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Received shutdown signal, stopping gracefully...");

    shutdown.send_replace(true);
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Background task ended abnormally");
        }
    }
    dispatcher.stop().await;

    tracing::info!("Hourbell stopped.");
    Ok(())
}
