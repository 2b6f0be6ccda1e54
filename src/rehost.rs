use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile};
use thiserror::Error;
use tracing::info;

use crate::downloader::{DownloadError, Downloader};

#[derive(Debug, Error)]
pub enum RehostError {
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("upload failed: {0}")]
    Upload(#[from] teloxide::RequestError),
    #[error("channel message has no video")]
    MissingVideo,
}

/// Перезаливка видео в постоянное хранилище; возвращает непрозрачный идентификатор.
#[async_trait]
pub trait Rehost: Send + Sync {
    async fn rehost(&self, url: &str, title: &str) -> Result<String, RehostError>;
}

/// Канал Telegram как CDN: file_id из сообщения канала потом отправляется пользователям.
pub struct ChannelRehoster {
    bot: Bot,
    channel: ChatId,
    downloader: Downloader,
}

impl ChannelRehoster {
    pub fn new(bot: Bot, channel: ChatId, downloader: Downloader) -> Self {
        Self { bot, channel, downloader }
    }
}

#[async_trait]
impl Rehost for ChannelRehoster {
    async fn rehost(&self, url: &str, title: &str) -> Result<String, RehostError> {
        let file = self.downloader.download(url).await?;
        info!(title, "uploading to storage channel");
        let msg = self
            .bot
            .send_video(self.channel, InputFile::file(file.path().to_path_buf()))
            .caption(title)
            .supports_streaming(true)
            .await?;
        // временный файл живёт до конца загрузки
        drop(file);
        msg.video().map(|v| v.file.id.to_string()).ok_or(RehostError::MissingVideo)
    }
}
