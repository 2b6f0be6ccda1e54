use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::browser::{BrowserError, PageSession};
use super::site::SiteProfile;
use super::{NotFoundReason, SearchQuery};

/// Этапы сценария; переходы только вперёд.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    SearchLoaded,
    ResultsPresent,
    ResultOpened,
    PlaybackTriggered,
}

/// Куда дошёл драйвер и почему остановился (`None` — сценарий пройден целиком).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveReport {
    pub reached: Stage,
    pub stopped: Option<NotFoundReason>,
}

#[derive(Debug)]
enum StepFailure {
    TimedOut(Duration),
    Browser(BrowserError),
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepFailure::TimedOut(d) => write!(f, "timed out after {:?}", d),
            StepFailure::Browser(e) => write!(f, "{}", e),
        }
    }
}

/// Единственное место, где ожидания ограничиваются по времени.
async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, StepFailure>
where
    F: Future<Output = Result<T, BrowserError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(StepFailure::Browser(e)),
        Err(_) => Err(StepFailure::TimedOut(limit)),
    }
}

pub struct NavigationDriver<'a> {
    site: &'a SiteProfile,
}

impl<'a> NavigationDriver<'a> {
    pub fn new(site: &'a SiteProfile) -> Self {
        Self { site }
    }

    #[cfg(test)]
    pub async fn run(&self, page: &mut dyn PageSession, query: &SearchQuery) -> DriveReport {
        let mut reached = Stage::Init;
        let stopped = self.drive(page, query, &mut reached).await;
        DriveReport { reached, stopped }
    }

    /// Ошибки автоматизации не пробрасываются: каждая превращается в причину остановки
    /// на своём шаге. `reached` обновляется по ходу, так что внешний таймаут видит, где всё застряло.
    pub async fn drive(
        &self,
        page: &mut dyn PageSession,
        query: &SearchQuery,
        reached: &mut Stage,
    ) -> Option<NotFoundReason> {
        let t = &self.site.timings;
        let title = query.title();

        // 1. страница поиска
        let url = self.site.search_url(query);
        debug!(title, %url, "loading search page");
        if let Err(e) = bounded(t.page_load, page.goto(&url)).await {
            warn!(title, "search page failed: {}", e);
            return Some(NotFoundReason::NavigationError);
        }
        page.settle(t.after_navigation).await;
        *reached = Stage::SearchLoaded;

        // 2. результаты
        if let Err(e) = bounded(t.results_wait, page.wait_for_selector(&self.site.results_container)).await {
            info!(title, "results did not appear: {}", e);
            return Some(NotFoundReason::NoSearchResults);
        }
        let count = match page.count(&self.site.result_item).await {
            Ok(n) => n,
            Err(e) => {
                warn!(title, "counting results failed: {}", e);
                return Some(NotFoundReason::NavigationError);
            }
        };
        if count == 0 {
            info!(title, "search returned nothing");
            return Some(NotFoundReason::NoSearchResults);
        }
        *reached = Stage::ResultsPresent;
        debug!(title, count, "results present");

        // 3. первый результат; состояние сайта после сбоя неизвестно, поэтому без повторов
        if let Err(e) = page.click_first(&self.site.result_item).await {
            warn!(title, "clicking first result failed: {}", e);
            return Some(NotFoundReason::NavigationError);
        }
        if let Err(e) = bounded(t.page_load, page.wait_for_dom_content()).await {
            warn!(title, "movie page failed: {}", e);
            return Some(NotFoundReason::NavigationError);
        }
        page.settle(t.after_navigation).await;
        *reached = Stage::ResultOpened;
        debug!(title, "movie page opened");

        // 4. плеер: сбои здесь не фатальны
        match bounded(t.play_button_wait, page.wait_until_visible(&self.site.play_button)).await {
            Ok(()) => {
                debug!(title, "pressing play");
                if let Err(e) = page.click_first(&self.site.play_button).await {
                    warn!(title, "play click failed: {}", e);
                }
                page.settle(t.after_play).await;
            }
            Err(e) => {
                debug!(title, "play control not visible ({}), waiting for autoplay", e);
                page.settle(t.autoplay).await;
            }
        }
        *reached = Stage::PlaybackTriggered;
        None
    }
}
