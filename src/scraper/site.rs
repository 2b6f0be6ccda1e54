use std::time::Duration;

use super::SearchQuery;

pub const DEFAULT_BASE_URL: &str = "https://w140.zona.plus";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Всё, что привязано к вёрстке конкретного сайта: адрес, селекторы, маркеры видео.
/// Тесты подставляют сюда свою фикстуру, не трогая логику навигации.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub base_url: String,
    pub results_container: String,
    pub result_item: String,
    pub play_button: String,
    /// Подстроки URL (в нижнем регистре), по которым ответ считается видео.
    pub media_markers: Vec<String>,
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub timings: Timings,
}

impl SiteProfile {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            results_container: ".results-wrap".to_string(),
            result_item: "a.results-item".to_string(),
            play_button: "button.vjs-big-play-button".to_string(),
            media_markers: vec![".mp4".to_string()],
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: (1920, 1080),
            timings: Timings::default(),
        }
    }

    pub fn search_url(&self, query: &SearchQuery) -> String {
        format!("{}/search/{}", self.base_url.trim_end_matches('/'), query.encoded())
    }
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub page_load: Duration,
    pub results_wait: Duration,
    pub play_button_wait: Duration,
    pub after_play: Duration,
    pub autoplay: Duration,
    pub after_navigation: Duration,
    /// Жёсткий потолок на всю сессию, поверх пошаговых таймаутов.
    pub session_deadline: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(60),
            results_wait: Duration::from_secs(15),
            play_button_wait: Duration::from_secs(10),
            after_play: Duration::from_secs(8),
            autoplay: Duration::from_secs(5),
            after_navigation: Duration::from_secs(3),
            session_deadline: Duration::from_secs(180),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_joins_base_and_encoded_title() {
        let site = SiteProfile::new("https://example.test/");
        let url = site.search_url(&SearchQuery::new(" Бегущий по лезвию "));
        assert!(url.starts_with("https://example.test/search/"));
        assert!(!url.contains(' '));
        assert_eq!(
            SiteProfile::new("http://h").search_url(&SearchQuery::new("the matrix")),
            "http://h/search/the%20matrix"
        );
    }

    #[test]
    fn worst_case_session_fits_under_deadline() {
        let t = Timings::default();
        let steps = t.page_load + t.results_wait + t.page_load + t.play_button_wait + t.after_play
            + t.after_navigation * 2;
        assert!(steps <= t.session_deadline);
    }
}
