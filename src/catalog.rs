use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::kinopoisk::MovieInfo;
use crate::rehost::{Rehost, RehostError};
use crate::scraper::{ResolutionResult, StreamSource};
use crate::storage::{CachedVideo, NewVideo, Storage};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Rehost(#[from] RehostError),
    #[error("storage: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Кеш → поиск потока → перезаливка → запись в кеш.
#[derive(Clone)]
pub struct Catalog {
    storage: Storage,
    source: Arc<dyn StreamSource>,
    rehoster: Arc<dyn Rehost>,
    // ограничение одновременных браузеров: каждая сессия — отдельный Chrome
    sessions: Arc<Semaphore>,
}

impl Catalog {
    pub fn new(
        storage: Storage,
        source: Arc<dyn StreamSource>,
        rehoster: Arc<dyn Rehost>,
        max_sessions: usize,
    ) -> Self {
        Self { storage, source, rehoster, sessions: Arc::new(Semaphore::new(max_sessions.max(1))) }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Попадание только если видео уже перезалито (есть file_id).
    pub async fn cached(&self, title: &str) -> anyhow::Result<Option<CachedVideo>> {
        Ok(self.storage.get_by_title(title).await?.filter(|v| v.file_id.is_some()))
    }

    /// Один повтор с тем же названием, если плеер не успел отдать видео.
    pub async fn resolve(&self, title: &str) -> ResolutionResult {
        let first = self.resolve_once(title).await;
        match first {
            ResolutionResult::NotFound(reason) if reason.retry_same_title() => {
                info!(title, %reason, "retrying resolution once");
                self.resolve_once(title).await
            }
            other => other,
        }
    }

    async fn resolve_once(&self, title: &str) -> ResolutionResult {
        // семафор никогда не закрывается, Err здесь невозможен
        let _permit = self.sessions.acquire().await.ok();
        self.source.resolve(title).await
    }

    pub async fn store(
        &self,
        title: &str,
        video_url: &str,
        meta: Option<&MovieInfo>,
    ) -> Result<CachedVideo, CatalogError> {
        // тот же поток под другим названием уже лежит в канале
        let uploaded = self.storage.get_by_url(video_url).await?.and_then(|v| v.file_id);
        let file_id = match uploaded {
            Some(id) => {
                info!(title, "stream already uploaded, reusing file_id");
                id
            }
            None => match self.rehoster.rehost(video_url, title).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(title, "rehost failed: {}", e);
                    return Err(e.into());
                }
            },
        };
        let saved = self
            .storage
            .upsert(NewVideo {
                title: title.to_string(),
                file_id: Some(file_id),
                video_url: Some(video_url.to_string()),
                kinopoisk_id: meta.map(|m| m.id),
                description: meta.and_then(|m| m.description.clone()),
            })
            .await?;
        info!(title, id = saved.id, "video cached");
        Ok(saved)
    }
}
