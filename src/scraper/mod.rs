//! Поиск прямой ссылки на видео через headless-браузер.
//!
//! Один вызов `StreamResolver::resolve` = одна браузерная сессия:
//! поиск → первый результат → кнопка Play → перехват сетевых ответов.

pub mod browser;
pub mod driver;
pub mod interceptor;
pub mod resolver;
pub mod site;

#[cfg(test)]
pub mod fixture;

use std::fmt;
use thiserror::Error;

pub use browser::ChromeLauncher;
pub use resolver::{StreamResolver, StreamSource};
pub use site::SiteProfile;

/* ====== Запрос ====== */

/// Название фильма, подготовленное для подстановки в URL поиска.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    title: String,
}

impl SearchQuery {
    pub fn new(title: &str) -> Self {
        Self { title: title.trim().to_string() }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Пробелы и не-ASCII кодируются процентами.
    pub fn encoded(&self) -> String {
        urlencoding::encode(&self.title).into_owned()
    }
}

/* ====== Кандидаты и результат ====== */

/// URL, замеченный в сетевых ответах страницы; `order` — порядковый номер первого появления.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateStreamUrl {
    pub url: String,
    pub order: usize,
}

impl fmt::Display for CandidateStreamUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NotFoundReason {
    #[error("no search results")]
    NoSearchResults,
    #[error("no playable response observed")]
    NoPlayableResponse,
    #[error("session deadline exceeded")]
    Timeout,
    #[error("navigation failed")]
    NavigationError,
}

impl NotFoundReason {
    /// Имеет ли смысл повторить тот же запрос ещё раз (гонка таймингов плеера).
    pub fn retry_same_title(self) -> bool {
        matches!(self, NotFoundReason::NoPlayableResponse)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
    Found(CandidateStreamUrl),
    NotFound(NotFoundReason),
}

#[cfg(test)]
impl ResolutionResult {
    pub fn url(&self) -> Option<&str> {
        match self {
            ResolutionResult::Found(c) => Some(&c.url),
            ResolutionResult::NotFound(_) => None,
        }
    }

    /// Совпадает ли "вид" результата (Found / NotFound(reason)) без учёта самого URL.
    pub fn same_kind(&self, other: &ResolutionResult) -> bool {
        match (self, other) {
            (ResolutionResult::Found(_), ResolutionResult::Found(_)) => true,
            (ResolutionResult::NotFound(a), ResolutionResult::NotFound(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_trimmed_and_percent_encoded() {
        let q = SearchQuery::new("  Побег из Шоушенка ");
        assert_eq!(q.title(), "Побег из Шоушенка");
        let enc = q.encoded();
        assert!(!enc.contains(' '));
        assert!(enc.contains("%20"));
        assert_eq!(SearchQuery::new("the matrix").encoded(), "the%20matrix");
    }

    #[test]
    fn only_no_playable_response_is_retried_with_same_title() {
        assert!(NotFoundReason::NoPlayableResponse.retry_same_title());
        assert!(!NotFoundReason::NoSearchResults.retry_same_title());
        assert!(!NotFoundReason::NavigationError.retry_same_title());
        assert!(!NotFoundReason::Timeout.retry_same_title());
    }

    #[test]
    fn result_kind_ignores_url() {
        let a = ResolutionResult::Found(CandidateStreamUrl { url: "a.mp4".into(), order: 0 });
        let b = ResolutionResult::Found(CandidateStreamUrl { url: "b.mp4".into(), order: 3 });
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&ResolutionResult::NotFound(NotFoundReason::Timeout)));
        assert!(!ResolutionResult::NotFound(NotFoundReason::Timeout)
            .same_kind(&ResolutionResult::NotFound(NotFoundReason::NavigationError)));
        assert_eq!(a.url(), Some("a.mp4"));
    }
}
