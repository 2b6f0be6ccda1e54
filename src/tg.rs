use crate::catalog::{Catalog, CatalogError};
use crate::kinopoisk::{page_url, KinopoiskClient, MovieInfo};
use crate::scraper::{NotFoundReason, ResolutionResult};
use crate::storage::{normalize_title, CachedVideo, Favorite};
use rand::seq::IteratorRandom;
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    prelude::*,
    types::{
        CallbackQuery, ChatId, FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile,
        KeyboardButton, KeyboardMarkup, MessageId, ParseMode,
    },
    utils::command::BotCommands,
};
use tracing::{info, warn};
use unicode_segmentation::UnicodeSegmentation;

const BTN_FIND: &str = "🎬 Найти фильм";
const BTN_RANDOM: &str = "🎲 Случайный фильм";
const BTN_HELP: &str = "📖 Справка";

/// Подстраховка для /random, когда Кинопоиск недоступен или фильм не нашёлся.
const POPULAR_MOVIES: &[&str] = &[
    "Матрица",
    "Интерстеллар",
    "Начало",
    "Терминатор",
    "Чужой",
    "Бегущий по лезвию",
    "Побег из Шоушенка",
    "Криминальное чтиво",
    "Форрест Гамп",
    "Список Шиндлера",
    "Властелин колец",
    "Гарри Поттер",
];

const DESCRIPTION_LIMIT: usize = 500;

/* ====== Команды ====== */
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Команды:")]
enum Command {
    #[command(description = "начать")]
    Start,
    #[command(description = "помощь")]
    Help,
    /// найти и прислать фильм
    #[command(description = "найти фильм: /film Матрица")]
    Film(String),
    #[command(description = "то же, что /film")]
    Search(String),
    #[command(description = "случайный фильм")]
    Random,
    #[command(description = "избранное")]
    Favorites,
}

#[derive(Clone)]
pub struct App {
    pub catalog: Catalog,
    pub kinopoisk: Option<KinopoiskClient>,
}

pub async fn run(bot: Bot, app: App) {
    let msg_handler = dptree::entry()
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint({
                            let app = app.clone();
                            move |bot: Bot, msg: Message, cmd: Command| {
                                let app = app.clone();
                                async move { on_command(bot, msg, cmd, &app).await }
                            }
                        })
                )
                .branch({
                    let app = app.clone();
                    dptree::endpoint(move |bot: Bot, msg: Message| {
                        let app = app.clone();
                        async move { on_text(bot, msg, &app).await }
                    })
                })
        )
        .branch(
            Update::filter_callback_query().endpoint({
                let app = app.clone();
                move |bot: Bot, q: CallbackQuery| {
                    let app = app.clone();
                    async move { on_callback(bot, q, &app).await }
                }
            })
        );

    Dispatcher::builder(bot, msg_handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

/* ====== Команды ====== */
async fn on_command(bot: Bot, msg: Message, cmd: Command, app: &App) -> ResponseResult<()> {
    let chat = msg.chat.id;
    match cmd {
        Command::Start => {
            bot.send_message(
                chat,
                "Привет! Пришли название фильма, и я найду его и пришлю видео.\n\
                 /random — случайный фильм, /favorites — избранное.",
            )
            .reply_markup(main_keyboard())
            .await?;
        }
        Command::Help => send_help(&bot, chat).await?,
        Command::Film(title) | Command::Search(title) => film_flow(&bot, chat, &title, app).await?,
        Command::Random => random_flow(&bot, chat, app).await?,
        Command::Favorites => {
            let user = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or(chat.0);
            send_favorites(&bot, chat, user, app).await?;
        }
    }
    Ok(())
}

async fn send_help(bot: &Bot, chat: ChatId) -> ResponseResult<()> {
    bot.send_message(chat, Command::descriptions().to_string()).await?;
    Ok(())
}

/* ====== Текст и кнопки клавиатуры ====== */

#[derive(Debug, PartialEq)]
enum TextAction {
    AskTitle,
    Random,
    Help,
    Film(String),
    TooShort,
}

fn classify_text(text: &str) -> TextAction {
    let text = text.trim();
    match text {
        BTN_FIND => TextAction::AskTitle,
        BTN_RANDOM => TextAction::Random,
        BTN_HELP => TextAction::Help,
        // неизвестная команда
        _ if text.starts_with('/') => TextAction::Help,
        _ if text.graphemes(true).count() > 2 => TextAction::Film(text.to_string()),
        _ => TextAction::TooShort,
    }
}

async fn on_text(bot: Bot, msg: Message, app: &App) -> ResponseResult<()> {
    let Some(text) = message_text_any(&msg) else { return Ok(()); };
    let chat = msg.chat.id;
    match classify_text(&text) {
        TextAction::AskTitle => {
            bot.send_message(chat, "Напиши название фильма, например: Интерстеллар").await?;
        }
        TextAction::Random => random_flow(&bot, chat, app).await?,
        TextAction::Help => send_help(&bot, chat).await?,
        TextAction::Film(title) => film_flow(&bot, chat, &title, app).await?,
        TextAction::TooShort => {
            bot.send_message(chat, "Слишком короткое название 🤏").await?;
        }
    }
    Ok(())
}

/* ====== Поиск фильма ====== */

#[derive(Debug)]
enum Miss {
    NotFound(NotFoundReason),
    Upload(CatalogError),
}

async fn film_flow(bot: &Bot, chat: ChatId, title: &str, app: &App) -> ResponseResult<()> {
    let title = title.trim();
    if title.is_empty() {
        bot.send_message(chat, "Укажи название: /film Матрица").await?;
        return Ok(());
    }
    let status = bot
        .send_message(chat, format!("🔍 Ищу «{}»…", html_escape(title)))
        .parse_mode(ParseMode::Html)
        .await?;

    let (meta, result) = locate(app, title).await;
    match result {
        Ok(video) => {
            let _ = bot.delete_message(chat, status.id).await;
            send_video(bot, chat, &video, meta.as_ref()).await?;
        }
        Err(miss) => report_miss(bot, chat, status.id, &miss).await?,
    }
    Ok(())
}

async fn random_flow(bot: &Bot, chat: ChatId, app: &App) -> ResponseResult<()> {
    let status = bot.send_message(chat, "🎲 Выбираю фильм…").await?;

    let top = match &app.kinopoisk {
        Some(kp) => kp.random_top().await.unwrap_or_else(|e| {
            warn!("kinopoisk top failed: {}", e);
            None
        }),
        None => None,
    };
    // метаданные запасного названия ищутся только после промаха кеша
    let (title, top) = match top.and_then(|m| m.name.clone().map(|name| (name, m))) {
        Some((name, m)) => (name, Some(m)),
        None => (fallback_title(None).to_string(), None),
    };

    info!(title = %title, "random pick");
    let _ = bot
        .edit_message_text(chat, status.id, format!("🎲 Пробую «{}»…", html_escape(&title)))
        .parse_mode(ParseMode::Html)
        .await;

    let first = match top {
        Some(m) => {
            let result = match title_hit(app, &title).await {
                Some(hit) => Ok(hit),
                None => fetch_video(app, &title, Some(&m)).await,
            };
            (Some(m), result)
        }
        None => locate(app, &title).await,
    };
    let (meta, result) = match first {
        (_, Err(Miss::NotFound(reason))) => {
            // одна подмена названия, дальше сдаёмся
            let other = fallback_title(Some(&title));
            info!(from = %title, to = other, %reason, "random pick not found, substituting");
            locate(app, other).await
        }
        first => first,
    };

    match result {
        Ok(video) => {
            let _ = bot.delete_message(chat, status.id).await;
            send_video(bot, chat, &video, meta.as_ref()).await?;
        }
        Err(miss) => report_miss(bot, chat, status.id, &miss).await?,
    }
    Ok(())
}

async fn lookup_meta(app: &App, title: &str) -> Option<MovieInfo> {
    let kp = app.kinopoisk.as_ref()?;
    match kp.search(title).await {
        Ok(found) => found,
        Err(e) => {
            warn!(title, "kinopoisk search failed: {}", e);
            None
        }
    }
}

/// Кеш по названию → Кинопоиск → кеш по id Кинопоиска → браузер → перезаливка.
/// При попадании по названию Кинопоиск не запрашивается.
async fn locate(app: &App, title: &str) -> (Option<MovieInfo>, Result<CachedVideo, Miss>) {
    if let Some(hit) = title_hit(app, title).await {
        return (None, Ok(hit));
    }
    let meta = lookup_meta(app, title).await;
    let result = fetch_video(app, title, meta.as_ref()).await;
    (meta, result)
}

async fn fetch_video(app: &App, title: &str, meta: Option<&MovieInfo>) -> Result<CachedVideo, Miss> {
    if let Some(m) = meta {
        match app.catalog.storage().get_by_kinopoisk_id(m.id).await {
            Ok(Some(v)) if v.file_id.is_some() => {
                info!(title, id = v.id, kinopoisk_id = m.id, "served from cache");
                return Ok(v);
            }
            Ok(_) => {}
            Err(e) => warn!("cache lookup failed: {}", e),
        }
    }
    match app.catalog.resolve(title).await {
        ResolutionResult::Found(candidate) => app
            .catalog
            .store(title, &candidate.url, meta)
            .await
            .map_err(Miss::Upload),
        ResolutionResult::NotFound(reason) => Err(Miss::NotFound(reason)),
    }
}

async fn title_hit(app: &App, title: &str) -> Option<CachedVideo> {
    match app.catalog.cached(title).await {
        Ok(Some(hit)) => {
            info!(title, id = hit.id, "served from cache");
            Some(hit)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("cache lookup failed: {}", e);
            None
        }
    }
}

async fn report_miss(bot: &Bot, chat: ChatId, status: MessageId, miss: &Miss) -> ResponseResult<()> {
    let text = match miss {
        Miss::NotFound(reason) => {
            info!(%reason, "film not found");
            "😕 Не нашёл этот фильм. Попробуй другое название или /random"
        }
        Miss::Upload(e) => {
            warn!("upload failed: {}", e);
            "⚠️ Не удалось загрузить видео, попробуй позже"
        }
    };
    bot.edit_message_text(chat, status, text).await?;
    Ok(())
}

async fn send_video(bot: &Bot, chat: ChatId, video: &CachedVideo, meta: Option<&MovieInfo>) -> ResponseResult<()> {
    let Some(file_id) = video.file_id.clone() else {
        bot.send_message(chat, "⚠️ Видео ещё не загружено, попробуй позже").await?;
        return Ok(());
    };
    let req = bot
        .send_video(chat, InputFile::file_id(FileId(file_id)))
        .caption(caption(video, meta))
        .parse_mode(ParseMode::Html)
        .supports_streaming(true);
    match meta.map(|m| m.id).or(video.kinopoisk_id) {
        Some(kp) => req.reply_markup(film_keyboard(kp)).await?,
        None => req.await?,
    };
    Ok(())
}

/* ====== Избранное ====== */

async fn send_favorites(bot: &Bot, chat: ChatId, user: i64, app: &App) -> ResponseResult<()> {
    let list = app.catalog.storage().favorites(user).await.map_err(to_req_err)?;
    if list.is_empty() {
        bot.send_message(chat, "В избранном пусто. Нажми ⭐ под фильмом, чтобы добавить.").await?;
        return Ok(());
    }
    let lines: Vec<String> = list.iter().map(|f| format!("• {}", html_escape(&favorite_title(f)))).collect();
    let txt = format!("<b>Избранное ({}):</b>\n{}", list.len(), lines.join("\n"));
    bot.send_message(chat, txt)
        .parse_mode(ParseMode::Html)
        .reply_markup(favorites_keyboard(&list))
        .await?;
    Ok(())
}

/* ====== Callback-кнопки ======
   fav:<kp>    — добавить в избранное
   unfav:<kp>  — убрать и показать список заново
   play:<kp>   — прислать видео из кеша
*/
async fn on_callback(bot: Bot, q: CallbackQuery, app: &App) -> ResponseResult<()> {
    let Some(data) = q.data.clone() else { return Ok(()); };
    let Some((cmd, id)) = parse_callback(&data) else { return Ok(()); };
    let user = q.from.id.0 as i64;
    let chat_id = q.message.as_ref().map(|m| m.chat().id).unwrap_or(ChatId(user));
    let storage = app.catalog.storage();

    match cmd {
        "fav" => {
            let added = storage.add_favorite(user, id).await.map_err(to_req_err)?;
            answer_cb(&bot, &q, if added { "Добавлено в избранное" } else { "Уже в избранном" }).await?;
        }
        "unfav" => {
            let removed = storage.remove_favorite(user, id).await.map_err(to_req_err)?;
            answer_cb(&bot, &q, if removed { "Удалено" } else { "Не найдено в избранном" }).await?;
            if removed {
                send_favorites(&bot, chat_id, user, app).await?;
            }
        }
        "play" => match storage.get_by_kinopoisk_id(id).await.map_err(to_req_err)? {
            Some(v) if v.file_id.is_some() => {
                answer_cb(&bot, &q, "Отправляю").await?;
                send_video(&bot, chat_id, &v, None).await?;
            }
            Some(v) => {
                answer_cb(&bot, &q, "Ищу видео").await?;
                film_flow(&bot, chat_id, &v.title, app).await?;
            }
            None => answer_cb(&bot, &q, "Этот фильм ещё не скачивали").await?,
        },
        _ => answer_cb(&bot, &q, "Неизвестная команда").await?,
    }
    Ok(())
}

fn parse_callback(data: &str) -> Option<(&str, u64)> {
    let (cmd, id) = data.split_once(':')?;
    Some((cmd, id.parse().ok()?))
}

/* ====== Кнопки ====== */

fn main_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BTN_FIND), KeyboardButton::new(BTN_RANDOM)],
        vec![KeyboardButton::new(BTN_HELP)],
    ])
    .resize_keyboard()
}

fn film_keyboard(kinopoisk_id: u64) -> InlineKeyboardMarkup {
    let mut row = vec![InlineKeyboardButton::callback("⭐ В избранное", format!("fav:{}", kinopoisk_id))];
    if let Ok(url) = reqwest::Url::parse(&page_url(kinopoisk_id)) {
        row.push(InlineKeyboardButton::url("📊 Кинопоиск", url));
    }
    InlineKeyboardMarkup::new(vec![row])
}

fn favorites_keyboard(list: &[Favorite]) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    for f in list {
        let play = InlineKeyboardButton::callback(
            format!("▶️ {}", clip(&favorite_title(f), 40)),
            format!("play:{}", f.kinopoisk_id),
        );
        let del = InlineKeyboardButton::callback("🗑".to_string(), format!("unfav:{}", f.kinopoisk_id));
        rows.push(vec![play, del]);
    }
    InlineKeyboardMarkup::new(rows)
}

/* ====== Вспомогательные ====== */

fn favorite_title(f: &Favorite) -> String {
    f.title.clone().unwrap_or_else(|| format!("Кинопоиск #{}", f.kinopoisk_id))
}

fn fallback_title(exclude: Option<&str>) -> &'static str {
    let exclude = exclude.map(normalize_title);
    POPULAR_MOVIES
        .iter()
        .copied()
        .filter(|t| exclude.as_deref() != Some(normalize_title(t).as_str()))
        .choose(&mut rand::thread_rng())
        .unwrap_or(POPULAR_MOVIES[0])
}

fn caption(video: &CachedVideo, meta: Option<&MovieInfo>) -> String {
    let name = meta.and_then(|m| m.name.as_deref()).unwrap_or(&video.title);
    let mut head = format!("<b>{}</b>", html_escape(name));
    if let Some(y) = meta.and_then(|m| m.year) {
        head.push_str(&format!(" ({})", y));
    }

    let mut info = Vec::new();
    if let Some(r) = meta.and_then(|m| m.rating) {
        info.push(format!("⭐ {:.1}", r));
    }
    if let Some(m) = meta {
        for list in [&m.genres, &m.countries] {
            if !list.is_empty() {
                info.push(html_escape(&list.join(", ")));
            }
        }
    }
    if !info.is_empty() {
        head.push('\n');
        head.push_str(&info.join(" · "));
    }

    let description = meta
        .and_then(|m| m.description.as_deref())
        .or(video.description.as_deref());
    match description {
        // режем до экранирования, чтобы не разорвать сущность
        Some(d) => format!("{}\n\n{}", head, html_escape(&clip(d, DESCRIPTION_LIMIT))),
        None => head,
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn clip(s: &str, max: usize) -> String {
    let mut g = s.graphemes(true);
    let head: String = g.by_ref().take(max).collect();
    if g.next().is_none() { head } else { head + "…" }
}

async fn answer_cb(bot: &Bot, q: &CallbackQuery, text: &str) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone())
        .text(text)
        .show_alert(false)
        .await?;
    Ok(())
}

fn message_text_any(msg: &Message) -> Option<String> {
    if let Some(t) = msg.text() { return Some(t.to_string()); }
    if let Some(c) = msg.caption() { return Some(c.to_string()); }
    None
}

fn to_req_err<E: std::fmt::Display>(e: E) -> teloxide::RequestError {
    teloxide::RequestError::Io(std::sync::Arc::new(std::io::Error::new(
        std::io::ErrorKind::Other,
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn video(title: &str, description: Option<&str>) -> CachedVideo {
        CachedVideo {
            id: 1,
            title: title.to_string(),
            file_id: Some("F".into()),
            video_url: None,
            kinopoisk_id: None,
            description: description.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn matrix() -> MovieInfo {
        MovieInfo {
            id: 301,
            name: Some("Матрица".into()),
            description: Some("Хакер <Нео> & Морфеус".into()),
            year: Some(1999),
            rating: Some(8.49),
            genres: vec!["фантастика".into(), "боевик".into()],
            countries: vec!["США".into()],
        }
    }

    #[test]
    fn text_is_routed_by_buttons_and_length() {
        assert_eq!(classify_text(BTN_FIND), TextAction::AskTitle);
        assert_eq!(classify_text(" 🎲 Случайный фильм "), TextAction::Random);
        assert_eq!(classify_text(BTN_HELP), TextAction::Help);
        assert_eq!(classify_text("/vote"), TextAction::Help);
        assert_eq!(classify_text("Чужой"), TextAction::Film("Чужой".into()));
        assert_eq!(classify_text("  ок "), TextAction::TooShort);
        assert_eq!(classify_text("ёлы"), TextAction::Film("ёлы".into()));
    }

    #[test]
    fn callbacks_are_parsed() {
        assert_eq!(parse_callback("fav:301"), Some(("fav", 301)));
        assert_eq!(parse_callback("unfav:7"), Some(("unfav", 7)));
        assert_eq!(parse_callback("play:x"), None);
        assert_eq!(parse_callback("garbage"), None);
    }

    #[test]
    fn clip_counts_graphemes() {
        assert_eq!(clip("абв", 3), "абв");
        assert_eq!(clip("абвг", 3), "абв…");
        // флаг — один графем из двух code point
        assert_eq!(clip("🇷🇺🇷🇺", 1), "🇷🇺…");
    }

    #[test]
    fn caption_uses_metadata_and_escapes_html() {
        let c = caption(&video("matrix", None), Some(&matrix()));
        assert!(c.starts_with("<b>Матрица</b> (1999)\n⭐ 8.5 · фантастика, боевик · США"));
        assert!(c.contains("Хакер &lt;Нео&gt; &amp; Морфеус"));
    }

    #[test]
    fn caption_falls_back_to_cached_row() {
        assert_eq!(caption(&video("A<B", None), None), "<b>A&lt;B</b>");
        let long = "д".repeat(DESCRIPTION_LIMIT + 100);
        let c = caption(&video("Дюна", Some(&long)), None);
        assert!(c.ends_with('…'));
        assert!(c.graphemes(true).count() <= "<b>Дюна</b>\n\n".chars().count() + DESCRIPTION_LIMIT + 1);
    }

    #[test]
    fn fallback_title_never_repeats_excluded() {
        for _ in 0..50 {
            let t = fallback_title(Some("  матрица "));
            assert_ne!(t, "Матрица");
            assert!(POPULAR_MOVIES.contains(&t));
        }
    }

    #[test]
    fn keyboards_have_expected_callbacks() {
        let kb = film_keyboard(301);
        assert_eq!(kb.inline_keyboard.len(), 1);
        assert_eq!(kb.inline_keyboard[0].len(), 2);
        match &kb.inline_keyboard[0][1].kind {
            teloxide::types::InlineKeyboardButtonKind::Url(u) => assert_eq!(u.as_str(), page_url(301)),
            other => panic!("unexpected button {:?}", other),
        }

        let favs = vec![
            Favorite { kinopoisk_id: 1, title: Some("Чужой".into()), file_id: None, created_at: Utc::now() },
            Favorite { kinopoisk_id: 2, title: None, file_id: None, created_at: Utc::now() },
        ];
        let kb = favorites_keyboard(&favs);
        assert_eq!(kb.inline_keyboard.len(), 2);
        assert!(kb.inline_keyboard.iter().all(|row| row.len() == 2));
        assert_eq!(favorite_title(&favs[1]), "Кинопоиск #2");
    }

    /* ====== Порядок: кеш раньше Кинопоиска ====== */

    mod lookup {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        use async_trait::async_trait;
        use serde_json::json;
        use wiremock::matchers::{any, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        use super::super::*;
        use crate::rehost::{Rehost, RehostError};
        use crate::scraper::StreamSource;
        use crate::storage::{NewVideo, Storage};

        #[derive(Default)]
        struct NothingOnSite {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl StreamSource for NothingOnSite {
            async fn resolve(&self, _title: &str) -> ResolutionResult {
                self.calls.fetch_add(1, Ordering::SeqCst);
                ResolutionResult::NotFound(NotFoundReason::NoSearchResults)
            }
        }

        struct NoUpload;

        #[async_trait]
        impl Rehost for NoUpload {
            async fn rehost(&self, _url: &str, _title: &str) -> Result<String, RehostError> {
                Err(RehostError::MissingVideo)
            }
        }

        async fn app(server: &MockServer, source: Arc<NothingOnSite>) -> App {
            let storage = Storage::in_memory().await.unwrap();
            storage
                .upsert(NewVideo {
                    title: "Матрица".into(),
                    file_id: Some("F301".into()),
                    kinopoisk_id: Some(301),
                    ..Default::default()
                })
                .await
                .unwrap();
            App {
                catalog: Catalog::new(storage, source, Arc::new(NoUpload), 1),
                kinopoisk: Some(KinopoiskClient::new("k".into(), server.uri())),
            }
        }

        #[tokio::test]
        async fn title_hit_skips_kinopoisk_and_browser() {
            let server = MockServer::start().await;
            Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0).mount(&server).await;
            let source = Arc::new(NothingOnSite::default());
            let app = app(&server, source.clone()).await;

            let (meta, video) = locate(&app, "матрица").await;
            assert_eq!(video.unwrap().file_id.as_deref(), Some("F301"));
            assert!(meta.is_none());
            assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn kinopoisk_id_hit_after_title_miss() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/movie/search"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "docs": [{ "id": 301, "name": "Матрица" }] })))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/movie/301"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
            let source = Arc::new(NothingOnSite::default());
            let app = app(&server, source.clone()).await;

            let (meta, video) = locate(&app, "The Matrix").await;
            assert_eq!(video.unwrap().file_id.as_deref(), Some("F301"));
            assert_eq!(meta.map(|m| m.id), Some(301));
            assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn full_miss_reaches_the_site() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/movie/search"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "docs": [] })))
                .mount(&server)
                .await;
            let source = Arc::new(NothingOnSite::default());
            let app = app(&server, source.clone()).await;

            let (meta, video) = locate(&app, "Дюна").await;
            assert!(matches!(video, Err(Miss::NotFound(NotFoundReason::NoSearchResults))));
            assert!(meta.is_none());
            assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        }
    }
}
