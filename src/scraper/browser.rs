use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::EventResponseReceived;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Handler, Page};
use futures::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::interceptor::ResponseInterceptor;
use super::site::{SiteProfile, Timings};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("cdp: {0}")]
    Cdp(#[from] CdpError),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("element not found: {0}")]
    ElementMissing(String),
    #[error("unexpected script result: {0}")]
    Script(#[from] serde_json::Error),
}

/* ====== Шов между навигацией и конкретным браузером ======
   Методы ждут без ограничения по времени: все таймауты ставит драйвер. */

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Поднимает изолированный браузер и страницу; перехватчик подключается до первой навигации.
    async fn launch(
        &self,
        site: &SiteProfile,
        interceptor: ResponseInterceptor,
    ) -> Result<Box<dyn PageSession>, BrowserError>;
}

#[async_trait]
pub trait PageSession: Send {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError>;
    async fn wait_for_selector(&mut self, selector: &str) -> Result<(), BrowserError>;
    async fn count(&mut self, selector: &str) -> Result<usize, BrowserError>;
    async fn click_first(&mut self, selector: &str) -> Result<(), BrowserError>;
    async fn wait_for_dom_content(&mut self) -> Result<(), BrowserError>;
    async fn wait_until_visible(&mut self, selector: &str) -> Result<(), BrowserError>;

    async fn settle(&mut self, period: Duration) {
        tokio::time::sleep(period).await;
    }

    async fn close(&mut self) -> Result<(), BrowserError>;
}

/* ====== Chrome через CDP ====== */

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    headless: bool,
    executable: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(headless: bool, executable: Option<PathBuf>) -> Self {
        Self { headless, executable }
    }

    fn config(&self, site: &SiteProfile) -> Result<BrowserConfig, BrowserError> {
        let (width, height) = site.viewport;
        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .viewport(None)
            .arg(format!("--user-agent={}", site.user_agent))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--no-first-run")
            .arg("--mute-audio")
            .request_timeout(cdp_request_timeout(&site.timings))
            .no_sandbox();
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(BrowserError::Launch)
    }
}

/// Таймаут CDP-команд длиннее любого шага: ограничивает только драйвер.
fn cdp_request_timeout(t: &Timings) -> Duration {
    t.session_deadline.max(t.page_load) + Duration::from_secs(10)
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(
        &self,
        site: &SiteProfile,
        interceptor: ResponseInterceptor,
    ) -> Result<Box<dyn PageSession>, BrowserError> {
        let config = self.config(site)?;
        info!(headless = self.headless, "launching browser");
        let (mut browser, handler) = Browser::launch(config).await?;
        let handler_task = spawn_handler(handler);

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                // страница не открылась: процесс всё равно надо закрыть
                shutdown(&mut browser, handler_task).await;
                return Err(e.into());
            }
        };

        let mut responses = match page.event_listener::<EventResponseReceived>().await {
            Ok(s) => s,
            Err(e) => {
                shutdown(&mut browser, handler_task).await;
                return Err(e.into());
            }
        };
        let listener_task = tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                interceptor.observe(&event.response.url);
            }
        });

        Ok(Box::new(ChromeSession {
            browser,
            page,
            handler_task,
            listener_task,
            clicked_from: None,
            closed: false,
        }))
    }
}

async fn shutdown(browser: &mut Browser, handler_task: JoinHandle<()>) {
    if let Err(e) = browser.close().await {
        warn!("closing browser after failed launch: {}", e);
    }
    if let Err(e) = browser.wait().await {
        warn!("waiting for browser process failed: {}", e);
    }
    handler_task.abort();
}

fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("cdp handler event error: {}", e);
            }
        }
    })
}

struct ChromeSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    listener_task: JoinHandle<()>,
    /// location.href до клика по результату: переход считается начатым, когда он сменится.
    clicked_from: Option<String>,
    closed: bool,
}

impl ChromeSession {
    async fn eval_bool(&self, script: &str) -> Result<bool, BrowserError> {
        Ok(self.page.evaluate(script).await?.into_value::<bool>()?)
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.page.evaluate("location.href").await?.into_value::<String>()?)
    }

    /// Опрос до true. Ошибки во время перехода страницы (контекст уничтожен) не фатальны.
    async fn poll_until(&self, script: &str) -> Result<(), BrowserError> {
        loop {
            match self.eval_bool(script).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => debug!("poll script failed, retrying: {}", e),
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageSession for ChromeSession {
    // Page.navigate без ожидания события load: достаточно DOMContentLoaded
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        let from = self.current_url().await?;
        let resp = self.page.execute(NavigateParams::new(url)).await?;
        if let Some(err) = resp.result.error_text.clone() {
            return Err(BrowserError::Navigation(err));
        }
        let script = if from == url { DOM_READY.to_string() } else { left_script(&from)? };
        self.poll_until(&script).await
    }

    async fn wait_for_selector(&mut self, selector: &str) -> Result<(), BrowserError> {
        self.poll_until(&exists_script(selector)?).await
    }

    async fn count(&mut self, selector: &str) -> Result<usize, BrowserError> {
        let script = format!("document.querySelectorAll({}).length", js_string(selector)?);
        Ok(self.page.evaluate(script).await?.into_value::<usize>()?)
    }

    async fn click_first(&mut self, selector: &str) -> Result<(), BrowserError> {
        // клик через DOM, как force-клик: перекрытия элемента не мешают
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return ''; \
             const from = location.href; el.click(); return from; }})()",
            js_string(selector)?
        );
        let from = self.page.evaluate(script).await?.into_value::<String>()?;
        if from.is_empty() {
            return Err(BrowserError::ElementMissing(selector.to_string()));
        }
        self.clicked_from = Some(from);
        Ok(())
    }

    async fn wait_for_dom_content(&mut self) -> Result<(), BrowserError> {
        let script = match self.clicked_from.take() {
            Some(from) => left_script(&from)?,
            None => DOM_READY.to_string(),
        };
        self.poll_until(&script).await
    }

    async fn wait_until_visible(&mut self, selector: &str) -> Result<(), BrowserError> {
        self.poll_until(&visible_script(selector)?).await
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!("waiting for browser process failed: {}", e);
        }
        self.listener_task.abort();
        self.handler_task.abort();
        closed?;
        debug!("browser closed");
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        // на случай паники между launch и close; сам процесс Chrome убивает Drop у Browser
        self.listener_task.abort();
        self.handler_task.abort();
    }
}

/* ====== JS ====== */

const DOM_READY: &str = "document.readyState !== 'loading'";

fn js_string(s: &str) -> Result<String, BrowserError> {
    Ok(serde_json::to_string(s)?)
}

/// Документ уже другой и дочитан до DOMContentLoaded.
fn left_script(from: &str) -> Result<String, BrowserError> {
    Ok(format!("location.href !== {} && {}", js_string(from)?, DOM_READY))
}

fn exists_script(selector: &str) -> Result<String, BrowserError> {
    Ok(format!("document.querySelector({}) !== null", js_string(selector)?))
}

fn visible_script(selector: &str) -> Result<String, BrowserError> {
    Ok(format!(
        "(() => {{ const el = document.querySelector({}); if (!el) return false; \
         const r = el.getBoundingClientRect(); const s = getComputedStyle(el); \
         return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }})()",
        js_string(selector)?
    ))
}
