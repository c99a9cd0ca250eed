use {
    std::path::PathBuf,
    serenity::{
        Client,
        all::GatewayIntents,
    },
    crate::{
        discord_bot::Handler,
        extract::VisionClient,
        identity::RiotClient,
        pending::PendingConfirmations,
        prelude::*,
        wizard::SessionStore,
        worker::WorkerPool,
    },
};

mod account;
mod config;
mod db;
mod discord_bot;
mod extract;
mod identity;
mod nav;
mod pending;
mod prelude;
mod ranking;
mod register;
mod stats;
mod submission;
mod wizard;
mod worker;

include!(concat!(env!("OUT_DIR"), "/version.rs"));

/// How often idle wizard sessions and pending confirmations are looked for, at most.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[derive(clap::Parser)]
#[clap(version = CLAP_VERSION)]
struct Args {
    /// Path to the config file. Defaults to `scrim-ledger.json` in the XDG config directories.
    #[clap(long)]
    config: Option<PathBuf>,
    /// Path to the SQLite database, overriding `databasePath` from the config.
    #[clap(long)]
    database: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)] Config(#[from] config::Error),
    #[error(transparent)] Db(#[from] db::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error(transparent)] Serenity(#[from] serenity::Error),
}

/// Drops wizard sessions and unconfirmed matches nobody has touched for `max_idle`.
async fn evict_idle(sessions: Arc<SessionStore>, pending: Arc<PendingConfirmations>, max_idle: Duration) {
    let mut interval = tokio::time::interval(max_idle.min(EVICTION_INTERVAL).max(Duration::from_secs(1)));
    loop {
        interval.tick().await;
        let sessions = sessions.evict_idle(max_idle);
        let pending = pending.evict_idle(max_idle);
        if sessions > 0 || pending > 0 {
            log::info!("evicted {sessions} idle match entry sessions and {pending} unconfirmed matches");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let Args { config, database } = clap::Parser::parse();
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    let default_panic_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!("Thread panic: {info:?}");
        default_panic_hook(info)
    }));
    let config = Config::load(config.as_deref()).await?;
    let db_pool = db::connect(database.as_deref().unwrap_or(config.database_path.as_path())).await?;
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("scrim-ledger/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(60))
        .use_rustls_tls()
        .https_only(true)
        .build()?;
    let sessions = Arc::<SessionStore>::default();
    let pending = Arc::<PendingConfirmations>::default();
    if let Some(max_idle) = config.session_idle_timeout() {
        log::info!("dropping match entries idle for more than {max_idle:?}");
        tokio::spawn(evict_idle(Arc::clone(&sessions), Arc::clone(&pending), max_idle));
    }
    let handler = Handler {
        db_pool,
        sessions,
        pending,
        extractor: Arc::new(VisionClient::new(http_client.clone(), &config)),
        verifier: Arc::new(RiotClient::new(http_client, &config)),
        workers: WorkerPool::new(config.workers),
        config: config.clone(),
    };
    let mut client = Client::builder(&config.discord.bot_token, GatewayIntents::GUILDS)
        .event_handler(handler)
        .await?;
    client.start().await?;
    Ok(())
}
