use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Ключ поиска по названию: нижний регистр, пробелы схлопнуты.
pub fn normalize_title(title: &str) -> String {
    SPACES.replace_all(title.trim(), " ").to_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedVideo {
    pub id: i64,
    pub title: String,
    pub file_id: Option<String>,
    pub video_url: Option<String>,
    pub kinopoisk_id: Option<u64>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Что записать в кеш; `None` — оставить сохранённое значение.
#[derive(Debug, Clone, Default)]
pub struct NewVideo {
    pub title: String,
    pub file_id: Option<String>,
    pub video_url: Option<String>,
    pub kinopoisk_id: Option<u64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Favorite {
    pub kinopoisk_id: u64,
    pub title: Option<String>,
    pub file_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        let storage = Self { pool };
        storage.create_tables().await?;
        info!(url, "database ready");
        Ok(storage)
    }

    /// Одна in-memory база на весь пул: соединение не закрывается и не пересоздаётся.
    #[cfg(test)]
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let storage = Self { pool };
        storage.create_tables().await?;
        Ok(storage)
    }

    async fn create_tables(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                title_key TEXT NOT NULL,
                file_id TEXT,
                video_url TEXT,
                kinopoisk_id INTEGER,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_favorites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                kinopoisk_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (user_id, kinopoisk_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for stmt in [
            "CREATE INDEX IF NOT EXISTS idx_video_title_key ON video_cache(title_key)",
            "CREATE INDEX IF NOT EXISTS idx_video_kinopoisk_id ON video_cache(kinopoisk_id)",
            "CREATE INDEX IF NOT EXISTS idx_video_url ON video_cache(video_url)",
            "CREATE INDEX IF NOT EXISTS idx_favorites_user ON user_favorites(user_id)",
        ] {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        debug!("tables created");
        Ok(())
    }

    /* ====== Кеш видео ====== */

    pub async fn get_by_title(&self, title: &str) -> anyhow::Result<Option<CachedVideo>> {
        self.latest_where("title_key = ?", Value::Text(normalize_title(title))).await
    }

    pub async fn get_by_url(&self, video_url: &str) -> anyhow::Result<Option<CachedVideo>> {
        self.latest_where("video_url = ?", Value::Text(video_url.to_string())).await
    }

    pub async fn get_by_kinopoisk_id(&self, kinopoisk_id: u64) -> anyhow::Result<Option<CachedVideo>> {
        self.latest_where("kinopoisk_id = ?", Value::Int(kinopoisk_id as i64)).await
    }

    async fn latest_where(&self, cond: &str, value: Value) -> anyhow::Result<Option<CachedVideo>> {
        let sql = format!(
            "SELECT * FROM video_cache WHERE {} ORDER BY updated_at DESC, id DESC LIMIT 1",
            cond
        );
        let query = sqlx::query(&sql);
        let query = match value {
            Value::Text(s) => query.bind(s),
            Value::Int(i) => query.bind(i),
        };
        let row = query.fetch_optional(&self.pool).await?;
        row.map(row_into_video).transpose()
    }

    /// Ищет запись по kinopoisk_id, иначе по URL, иначе по названию; обновляет или создаёт.
    pub async fn upsert(&self, new: NewVideo) -> anyhow::Result<CachedVideo> {
        let now = Utc::now();
        let key = normalize_title(&new.title);
        let kp = new.kinopoisk_id.map(|v| v as i64);
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = if let Some(kp) = kp {
            sqlx::query_scalar("SELECT id FROM video_cache WHERE kinopoisk_id = ? ORDER BY updated_at DESC, id DESC LIMIT 1")
                .bind(kp)
                .fetch_optional(&mut *tx)
                .await?
        } else if let Some(url) = &new.video_url {
            sqlx::query_scalar("SELECT id FROM video_cache WHERE video_url = ? ORDER BY updated_at DESC, id DESC LIMIT 1")
                .bind(url)
                .fetch_optional(&mut *tx)
                .await?
        } else {
            sqlx::query_scalar("SELECT id FROM video_cache WHERE title_key = ? ORDER BY updated_at DESC, id DESC LIMIT 1")
                .bind(&key)
                .fetch_optional(&mut *tx)
                .await?
        };

        let id = match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE video_cache SET
                        file_id = COALESCE(?, file_id),
                        video_url = COALESCE(?, video_url),
                        kinopoisk_id = COALESCE(?, kinopoisk_id),
                        description = COALESCE(?, description),
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&new.file_id)
                .bind(&new.video_url)
                .bind(kp)
                .bind(&new.description)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                debug!(id, title = %new.title, "cache row updated");
                id
            }
            None => {
                let done = sqlx::query(
                    r#"
                    INSERT INTO video_cache
                    (title, title_key, file_id, video_url, kinopoisk_id, description, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&new.title)
                .bind(&key)
                .bind(&new.file_id)
                .bind(&new.video_url)
                .bind(kp)
                .bind(&new.description)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                debug!(title = %new.title, "cache row inserted");
                done.last_insert_rowid()
            }
        };

        let row = sqlx::query("SELECT * FROM video_cache WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        row_into_video(row)
    }

    /* ====== Избранное ====== */

    /// true — добавлено, false — уже было.
    pub async fn add_favorite(&self, user_id: i64, kinopoisk_id: u64) -> anyhow::Result<bool> {
        let done = sqlx::query(
            "INSERT OR IGNORE INTO user_favorites (user_id, kinopoisk_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(kinopoisk_id as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn remove_favorite(&self, user_id: i64, kinopoisk_id: u64) -> anyhow::Result<bool> {
        let done = sqlx::query("DELETE FROM user_favorites WHERE user_id = ? AND kinopoisk_id = ?")
            .bind(user_id)
            .bind(kinopoisk_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Новые сверху; название и file_id подтягиваются из кеша, если фильм уже скачивали.
    pub async fn favorites(&self, user_id: i64) -> anyhow::Result<Vec<Favorite>> {
        let rows = sqlx::query(
            r#"
            SELECT f.kinopoisk_id, f.created_at,
                (SELECT v.title FROM video_cache v WHERE v.kinopoisk_id = f.kinopoisk_id
                    ORDER BY v.updated_at DESC, v.id DESC LIMIT 1) AS title,
                (SELECT v.file_id FROM video_cache v WHERE v.kinopoisk_id = f.kinopoisk_id
                    AND v.file_id IS NOT NULL ORDER BY v.updated_at DESC, v.id DESC LIMIT 1) AS file_id
            FROM user_favorites f
            WHERE f.user_id = ?
            ORDER BY f.created_at DESC, f.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Favorite {
                kinopoisk_id: row.try_get::<i64, _>("kinopoisk_id")? as u64,
                title: row.try_get("title")?,
                file_id: row.try_get("file_id")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(out)
    }
}

enum Value {
    Text(String),
    Int(i64),
}

fn row_into_video(row: SqliteRow) -> anyhow::Result<CachedVideo> {
    Ok(CachedVideo {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        file_id: row.try_get("file_id")?,
        video_url: row.try_get("video_url")?,
        kinopoisk_id: row.try_get::<Option<i64>, _>("kinopoisk_id")?.map(|v| v as u64),
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
