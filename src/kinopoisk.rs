use std::time::Duration;

use moka::future::Cache;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::storage::normalize_title;

pub const DEFAULT_API_URL: &str = "https://api.kinopoisk.dev/v1.4";

#[derive(Clone)]
pub struct KinopoiskClient {
    api_key: String,
    base_url: String,
    http: Client,
    // промахи тоже кешируем: повторный поиск того же названия не ходит в API
    searches: Cache<String, Option<MovieInfo>>,
}

impl KinopoiskClient {
    pub fn new(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            searches: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(Duration::from_secs(60 * 60))
                .build(),
        }
    }

    /// Первый найденный фильм с деталями; если деталей нет — данные из поиска.
    pub async fn search(&self, query: &str) -> reqwest::Result<Option<MovieInfo>> {
        let key = normalize_title(query);
        if let Some(hit) = self.searches.get(&key).await {
            debug!(query, "kinopoisk cache hit");
            return Ok(hit);
        }

        let url = format!("{}/movie/search", self.base_url);
        let resp = self
            .http
            .get(url)
            .header("X-API-KEY", &self.api_key)
            .query(&[("query", query), ("limit", "1")])
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "kinopoisk search failed");
            return Ok(None);
        }
        let data: DocsResp = resp.json().await?;
        let found = match data.docs.into_iter().next() {
            None => None,
            Some(doc) => match self.details(doc.id).await? {
                Some(full) => Some(full.into()),
                None => Some(doc.into()),
            },
        };
        self.searches.insert(key, found.clone()).await;
        Ok(found)
    }

    async fn details(&self, id: u64) -> reqwest::Result<Option<Doc>> {
        let url = format!("{}/movie/{}", self.base_url, id);
        let resp = self.http.get(url).header("X-API-KEY", &self.api_key).send().await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        Ok(Some(resp.json().await?))
    }

    /// Случайный фильм из сотни лучших по рейтингу.
    pub async fn random_top(&self) -> reqwest::Result<Option<MovieInfo>> {
        let url = format!("{}/movie", self.base_url);
        let resp = self
            .http
            .get(url)
            .header("X-API-KEY", &self.api_key)
            .query(&[
                ("page", "1"),
                ("limit", "100"),
                ("rating.kp", "7-10"),
                ("sortField", "rating.kp"),
                ("sortType", "-1"),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "kinopoisk top failed");
            return Ok(None);
        }
        let data: DocsResp = resp.json().await?;
        Ok(data.docs.choose(&mut rand::thread_rng()).cloned().map(Into::into))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovieInfo {
    pub id: u64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub genres: Vec<String>,
    pub countries: Vec<String>,
}

/// Страница фильма на сайте Кинопоиска.
pub fn page_url(kinopoisk_id: u64) -> String {
    format!("https://www.kinopoisk.ru/film/{}/", kinopoisk_id)
}

/* ======= DTOs ======= */

#[derive(Deserialize, Debug)]
struct DocsResp {
    #[serde(default)]
    docs: Vec<Doc>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct Doc {
    id: u64,
    name: Option<String>,
    alternative_name: Option<String>,
    en_name: Option<String>,
    description: Option<String>,
    year: Option<i32>,
    rating: Option<Rating>,
    #[serde(default)]
    genres: Vec<Named>,
    #[serde(default)]
    countries: Vec<Named>,
}

#[derive(Deserialize, Debug, Clone)]
struct Rating {
    kp: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
struct Named {
    name: Option<String>,
}

impl From<Doc> for MovieInfo {
    fn from(d: Doc) -> Self {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        MovieInfo {
            id: d.id,
            name: non_empty(d.name)
                .or_else(|| non_empty(d.alternative_name))
                .or_else(|| non_empty(d.en_name)),
            description: non_empty(d.description),
            year: d.year,
            rating: d.rating.and_then(|r| r.kp),
            genres: d.genres.into_iter().filter_map(|g| g.name).collect(),
            countries: d.countries.into_iter().filter_map(|c| c.name).collect(),
        }
    }
}
