use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::browser::BrowserLauncher;
use super::driver::{DriveReport, NavigationDriver, Stage};
use super::interceptor::ResponseInterceptor;
use super::site::SiteProfile;
use super::{CandidateStreamUrl, NotFoundReason, ResolutionResult, SearchQuery};

/// Источник прямых ссылок по названию фильма.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Название уже проверено вызывающим кодом (непустое после trim).
    async fn resolve(&self, title: &str) -> ResolutionResult;
}

/// Одна попытка = одна свежая браузерная сессия, которая закрывается на любом исходе.
/// Повторов внутри нет: политика повторов у вызывающего.
pub struct StreamResolver {
    launcher: Arc<dyn BrowserLauncher>,
    site: SiteProfile,
}

impl StreamResolver {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, site: SiteProfile) -> Self {
        Self { launcher, site }
    }

    pub fn site(&self) -> &SiteProfile {
        &self.site
    }
}

#[async_trait]
impl StreamSource for StreamResolver {
    async fn resolve(&self, title: &str) -> ResolutionResult {
        let query = SearchQuery::new(title);
        let interceptor = ResponseInterceptor::new(&self.site.media_markers);

        let mut session = match self.launcher.launch(&self.site, interceptor.clone()).await {
            Ok(s) => s,
            Err(e) => {
                warn!(title = query.title(), "browser launch failed: {}", e);
                return ResolutionResult::NotFound(NotFoundReason::NavigationError);
            }
        };

        let driver = NavigationDriver::new(&self.site);
        let deadline = self.site.timings.session_deadline;
        let mut reached = Stage::Init;
        let outcome = tokio::time::timeout(deadline, driver.drive(session.as_mut(), &query, &mut reached)).await;
        let stopped = match outcome {
            Ok(stopped) => stopped,
            Err(_) => {
                warn!(title = query.title(), ?deadline, stage = ?reached, "session deadline exceeded");
                Some(NotFoundReason::Timeout)
            }
        };
        let report = DriveReport { reached, stopped };

        // teardown на любом пути; список кандидатов читаем только после него
        if let Err(e) = session.close().await {
            warn!(title = query.title(), "browser teardown failed: {}", e);
        }
        drop(session);

        let result = decide(interceptor.first(), report);
        match &result {
            ResolutionResult::Found(c) => info!(title = query.title(), url = %c.url, "stream resolved"),
            ResolutionResult::NotFound(reason) => {
                info!(title = query.title(), stage = ?report.reached, %reason, "stream not found")
            }
        }
        result
    }
}

/// Захват после мягкого сбоя тоже успех: берём первый замеченный URL.
fn decide(first: Option<CandidateStreamUrl>, report: DriveReport) -> ResolutionResult {
    match first {
        Some(c) => ResolutionResult::Found(c),
        None => ResolutionResult::NotFound(report.stopped.unwrap_or(NotFoundReason::NoPlayableResponse)),
    }
}
