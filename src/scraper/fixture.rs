//! Управляемый "сайт" для тестов: реализует браузерный шов без Chrome и считает сессии.

use std::future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::browser::{BrowserError, BrowserLauncher, PageSession};
use super::interceptor::ResponseInterceptor;
use super::site::SiteProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Load {
    Ok,
    Hang,
    Fail,
}

#[derive(Debug, Clone)]
pub struct FixtureSite {
    search_page: Load,
    results: Option<usize>,
    movie_page: Load,
    play_button: bool,
    play_click_fails: bool,
    on_search: Vec<String>,
    on_movie_page: Vec<String>,
    on_play: Vec<String>,
    on_autoplay: Vec<String>,
}

fn owned(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|u| u.to_string()).collect()
}

impl FixtureSite {
    /// По умолчанию контейнер результатов не появляется никогда.
    pub fn new() -> Self {
        Self {
            search_page: Load::Ok,
            results: None,
            movie_page: Load::Ok,
            play_button: true,
            play_click_fails: false,
            on_search: owned(&["http://fixture.test/app.js", "http://fixture.test/logo.png"]),
            on_movie_page: Vec::new(),
            on_play: Vec::new(),
            on_autoplay: Vec::new(),
        }
    }

    pub fn search_page(mut self, load: Load) -> Self {
        self.search_page = load;
        self
    }

    pub fn results(mut self, n: usize) -> Self {
        self.results = Some(n);
        self
    }

    pub fn movie_page(mut self, load: Load) -> Self {
        self.movie_page = load;
        self
    }

    pub fn no_play_button(mut self) -> Self {
        self.play_button = false;
        self
    }

    pub fn play_click_fails(mut self) -> Self {
        self.play_click_fails = true;
        self
    }

    pub fn on_search(mut self, urls: &[&str]) -> Self {
        self.on_search.extend(owned(urls));
        self
    }

    pub fn on_movie_page(mut self, urls: &[&str]) -> Self {
        self.on_movie_page = owned(urls);
        self
    }

    pub fn on_play(mut self, urls: &[&str]) -> Self {
        self.on_play = owned(urls);
        self
    }

    pub fn on_autoplay(mut self, urls: &[&str]) -> Self {
        self.on_autoplay = owned(urls);
        self
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Counters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Сессии, открытые и ещё не закрытые.
    pub fn live(&self) -> usize {
        self.launches() - self.closes()
    }
}

pub struct FixtureLauncher {
    site: FixtureSite,
    fail_launch: bool,
    pub counters: Arc<Counters>,
}

impl FixtureLauncher {
    pub fn new(site: FixtureSite) -> Self {
        Self { site, fail_launch: false, counters: Arc::new(Counters::default()) }
    }

    pub fn failing() -> Self {
        Self { fail_launch: true, ..Self::new(FixtureSite::new()) }
    }
}

#[async_trait]
impl BrowserLauncher for FixtureLauncher {
    async fn launch(
        &self,
        profile: &SiteProfile,
        interceptor: ResponseInterceptor,
    ) -> Result<Box<dyn PageSession>, BrowserError> {
        if self.fail_launch {
            return Err(BrowserError::Launch("fixture: no browser".to_string()));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixturePage {
            site: self.site.clone(),
            profile: profile.clone(),
            interceptor,
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

struct FixturePage {
    site: FixtureSite,
    profile: SiteProfile,
    interceptor: ResponseInterceptor,
    counters: Arc<Counters>,
    closed: bool,
}

impl FixturePage {
    fn emit(&self, urls: &[String]) {
        for u in urls {
            self.interceptor.observe(u);
        }
    }
}

fn broken(what: &str) -> BrowserError {
    BrowserError::ElementMissing(format!("fixture: {}", what))
}

#[async_trait]
impl PageSession for FixturePage {
    async fn goto(&mut self, _url: &str) -> Result<(), BrowserError> {
        match self.site.search_page {
            Load::Ok => {
                self.emit(&self.site.on_search);
                Ok(())
            }
            Load::Hang => future::pending().await,
            Load::Fail => Err(broken("search page")),
        }
    }

    async fn wait_for_selector(&mut self, selector: &str) -> Result<(), BrowserError> {
        if selector == self.profile.results_container && self.site.results.is_some() {
            return Ok(());
        }
        future::pending().await
    }

    async fn count(&mut self, selector: &str) -> Result<usize, BrowserError> {
        if selector == self.profile.result_item {
            Ok(self.site.results.unwrap_or(0))
        } else {
            Ok(0)
        }
    }

    async fn click_first(&mut self, selector: &str) -> Result<(), BrowserError> {
        if selector == self.profile.result_item {
            return match self.site.results {
                Some(n) if n > 0 => Ok(()),
                _ => Err(broken("result item")),
            };
        }
        if selector == self.profile.play_button {
            if self.site.play_click_fails || !self.site.play_button {
                return Err(broken("play button"));
            }
            self.emit(&self.site.on_play);
            return Ok(());
        }
        Err(broken(selector))
    }

    async fn wait_for_dom_content(&mut self) -> Result<(), BrowserError> {
        match self.site.movie_page {
            Load::Ok => {
                self.emit(&self.site.on_movie_page);
                Ok(())
            }
            Load::Hang => future::pending().await,
            Load::Fail => Err(broken("movie page")),
        }
    }

    async fn wait_until_visible(&mut self, selector: &str) -> Result<(), BrowserError> {
        if selector == self.profile.play_button && self.site.play_button {
            return Ok(());
        }
        // плеер без кнопки стартует сам
        self.emit(&self.site.on_autoplay);
        future::pending().await
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if !self.closed {
            self.closed = true;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
