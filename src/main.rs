use std::{sync::Arc, time::Duration};

use color_eyre::Result;
use teloxide::prelude::*;
use tracing::{debug, info};

use crate::{
    config::Config,
    flow::SessionHandler,
    language::WhatlangClassifier,
    translate::SubprocessEngine,
};

mod config;
mod flow;
mod language;
mod session;
mod telegram;
mod translate;
mod utils;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    utils::pre_flight()?;

    let config = Config::from_env()?;
    info!(?config, "Loaded configuration");

    let engine = SubprocessEngine::new(&config.translator);
    info!(device = %engine.device(), "Translation engine ready");
    let handler = Arc::new(SessionHandler::new(
        Box::new(WhatlangClassifier),
        Arc::new(engine),
        config.session_ttl,
    ));

    tokio::spawn(sweep_sessions(handler.clone()));

    let bot = Bot::new(config.bot_token);
    let me = bot.get_me().await?;
    info!(?me, "Starting with");

    Dispatcher::builder(bot, telegram::schema())
        .dependencies(dptree::deps![handler])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}

async fn sweep_sessions(handler: Arc<SessionHandler>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let purged = handler.sessions().purge_expired().await;
        if purged > 0 {
            let remaining = handler.sessions().len().await;
            debug!(purged, remaining, "purged expired sessions");
        }
    }
}
