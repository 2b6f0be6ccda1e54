mod catalog;
mod config;
mod downloader;
mod kinopoisk;
mod rehost;
mod scraper;
mod storage;
mod tg;

use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::downloader::Downloader;
use crate::kinopoisk::KinopoiskClient;
use crate::rehost::ChannelRehoster;
use crate::scraper::{ChromeLauncher, SiteProfile, StreamResolver};
use crate::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let mut bot = Bot::new(&config.bot_token);
    // локальный Bot API снимает лимит 50 МБ на загрузку
    if let Some(api) = &config.telegram_api_url {
        bot = bot.set_api_url(reqwest::Url::parse(api)?);
    }

    let storage = Storage::connect(&config.database_url).await?;

    let kinopoisk = config
        .kinopoisk_token
        .clone()
        .map(|token| KinopoiskClient::new(token, config.kinopoisk_api_url.clone()));
    if kinopoisk.is_none() {
        info!("KINOPOISK_TOKEN is not set, metadata lookups disabled");
    }

    let launcher = ChromeLauncher::new(config.headless, config.chrome_path.clone());
    let resolver = StreamResolver::new(Arc::new(launcher), SiteProfile::new(config.site_url.clone()));
    info!(site = %resolver.site().base_url, "stream resolver ready");

    let downloader = Downloader::new(
        config.download_dir.clone(),
        config.max_upload_bytes,
        config.accept_invalid_certs,
    )?;
    let rehoster = ChannelRehoster::new(bot.clone(), config.channel_id, downloader);

    let catalog = Catalog::new(
        storage,
        Arc::new(resolver),
        Arc::new(rehoster),
        config.max_browser_sessions,
    );

    bot.delete_webhook().drop_pending_updates(true).await?;
    info!("bot started");

    tg::run(bot, tg::App { catalog, kinopoisk }).await;
    Ok(())
}
