use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::CandidateStreamUrl;

/// Накопитель ссылок на видео для одной сессии.
///
/// Клоны делят один список: браузерный обработчик пишет, резолвер читает после teardown.
/// Новый экземпляр создаётся на каждый вызов, глобального состояния нет.
#[derive(Clone, Debug)]
pub struct ResponseInterceptor {
    markers: Arc<[String]>,
    seen: Arc<Mutex<Vec<CandidateStreamUrl>>>,
}

impl ResponseInterceptor {
    pub fn new(markers: &[String]) -> Self {
        let markers: Vec<String> = markers.iter().map(|m| m.to_lowercase()).collect();
        Self { markers: markers.into(), seen: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn is_candidate(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        self.markers.iter().any(|m| lower.contains(m.as_str()))
    }

    /// Возвращает true, если URL новый и попал в список. Никогда не паникует и не ошибается.
    pub fn observe(&self, url: &str) -> bool {
        if url.is_empty() || !self.is_candidate(url) {
            return false;
        }
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.iter().any(|c| c.url == url) {
            return false;
        }
        let order = seen.len();
        seen.push(CandidateStreamUrl { url: url.to_string(), order });
        debug!(order, url = %clip_url(url), "video response captured");
        true
    }

    #[cfg(test)]
    pub fn candidates(&self) -> Vec<CandidateStreamUrl> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn first(&self) -> Option<CandidateStreamUrl> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).first().cloned()
    }
}

fn clip_url(url: &str) -> &str {
    match url.char_indices().nth(80) {
        Some((i, _)) => &url[..i],
        None => url,
    }
}
