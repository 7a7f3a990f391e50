use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use nd_core::types::{join_authors, split_authors};
use nd_core::{
    Article, ArticleStorage, Error, NewArticle, Page, PageQuery, Result, ScoreResult,
    TiebreakHash, UNSCORED,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        site_name TEXT NOT NULL,
        url TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        text TEXT NOT NULL,
        authors TEXT,
        publish_date INTEGER,
        score INTEGER NOT NULL DEFAULT -1,
        summary TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_site ON articles (site_name)",
    "CREATE INDEX IF NOT EXISTS idx_articles_score ON articles (score)",
];

const COLUMNS: &str =
    "id, site_name, url, title, text, authors, publish_date, score, summary, created_at";

pub struct SQLiteStorage {
    pool: SqlitePool,
    hash: TiebreakHash,
}

fn db_error(context: &str) -> impl FnOnce(sqlx::Error) -> Error + '_ {
    move |e| Error::Database(format!("{}: {}", context, e))
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::Database(format!("Invalid timestamp in database: {}", ms)))
}

fn article_from_row(row: &SqliteRow) -> Result<Article> {
    let authors: Option<String> = row.get("authors");
    let publish_date: Option<i64> = row.get("publish_date");
    let score: i64 = row.get("score");
    Ok(Article {
        id: row.get("id"),
        site_name: row.get("site_name"),
        url: row.get("url"),
        title: row.get("title"),
        text: row.get("text"),
        authors: split_authors(authors.as_deref()),
        publish_date: publish_date.map(from_millis).transpose()?,
        score: score as i32,
        summary: row.get("summary"),
        created_at: from_millis(row.get("created_at"))?,
    })
}

/// Appends `WHERE site_name IN (..)` plus the optional score floor and publish window.
fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, query: &PageQuery) {
    builder.push(" WHERE site_name IN (");
    let mut sites = builder.separated(", ");
    for site in &query.site_names {
        sites.push_bind(site.clone());
    }
    builder.push(")");
    if let Some(min) = query.min_score {
        builder
            .push(" AND score <> ")
            .push_bind(UNSCORED)
            .push(" AND score >= ")
            .push_bind(min);
    }
    if let Some(since) = query.since {
        builder.push(" AND publish_date >= ").push_bind(to_millis(since));
    }
    if let Some(until) = query.until {
        builder.push(" AND publish_date < ").push_bind(to_millis(until));
    }
}

impl SQLiteStorage {
    /// Open (or create) the database file at `db_path` and bootstrap the schema.
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        Self::connect(options, 5).await
    }

    /// Accepts `sqlite:<path>`, `sqlite://<path>` and `sqlite::memory:`.
    pub async fn new_with_url(url: &str) -> Result<Self> {
        if url.contains(":memory:") {
            let options = SqliteConnectOptions::from_str(url).map_err(db_error("Invalid database URL"))?;
            // Every connection to :memory: is its own database.
            return Self::connect(options, 1).await;
        }
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        Self::new_with_path(&PathBuf::from(path)).await
    }

    async fn connect(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(db_error("Failed to connect to database"))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }

        Ok(Self {
            pool,
            hash: TiebreakHash::default(),
        })
    }

    pub fn with_tiebreak(mut self, hash: TiebreakHash) -> Self {
        self.hash = hash;
        self
    }
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    async fn insert_if_absent(&self, article: &NewArticle) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles
            (site_name, url, title, text, authors, publish_date, score, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&article.site_name)
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.text)
        .bind(join_authors(&article.authors))
        .bind(article.publish_date.map(to_millis))
        .bind(UNSCORED)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to store article"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_score(&self, url: &str, result: &ScoreResult) -> Result<bool> {
        let done = sqlx::query("UPDATE articles SET score = ?, summary = ? WHERE url = ? AND score = ?")
            .bind(result.score())
            .bind(result.summary())
            .bind(url)
            .bind(UNSCORED)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to update score"))?;

        Ok(done.rows_affected() > 0)
    }

    async fn fetch_unscored(&self) -> Result<Vec<Article>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM articles WHERE score = ? ORDER BY id",
            COLUMNS
        ))
        .bind(UNSCORED)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to fetch unscored articles"))?;

        rows.iter().map(article_from_row).collect()
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Page> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM articles");
        push_filter(&mut count, query);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to count articles"))?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM articles", COLUMNS));
        push_filter(&mut select, query);
        select
            .push(" ORDER BY (score = ")
            .push_bind(UNSCORED)
            .push(") ASC, score DESC, ((id * ")
            .push_bind(self.hash.multiplier())
            .push(" + ")
            .push_bind(self.hash.seed())
            .push(") % ")
            .push_bind(self.hash.modulus())
            .push(") ASC, id ASC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(query.offset));

        debug!(sql = select.sql(), "ranked page query");
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to fetch article page"))?;

        Ok(Page {
            articles: rows.iter().map(article_from_row).collect::<Result<_>>()?,
            total: total as u64,
        })
    }

    async fn urls_for_site(&self, site_name: &str) -> Result<HashSet<String>> {
        let urls: Vec<String> = sqlx::query_scalar("SELECT url FROM articles WHERE site_name = ?")
            .bind(site_name)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to fetch processed urls"))?;

        Ok(urls.into_iter().collect())
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<Article>> {
        let row = sqlx::query(&format!("SELECT {} FROM articles WHERE url = ?", COLUMNS))
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to fetch article"))?;

        row.as_ref().map(article_from_row).transpose()
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query("DELETE FROM articles WHERE created_at < ?")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete old articles"))?;

        Ok(done.rows_affected())
    }
}
