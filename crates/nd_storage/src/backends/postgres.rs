use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use nd_core::types::{join_authors, split_authors};
use nd_core::{
    Article, ArticleStorage, Error, NewArticle, Page, PageQuery, Result, ScoreResult,
    TiebreakHash, UNSCORED,
};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id BIGSERIAL PRIMARY KEY,
        site_name TEXT NOT NULL,
        url TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        text TEXT NOT NULL,
        authors TEXT,
        publish_date BIGINT,
        score INTEGER NOT NULL DEFAULT -1,
        summary TEXT,
        created_at BIGINT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_site ON articles (site_name)",
    "CREATE INDEX IF NOT EXISTS idx_articles_score ON articles (score)",
];

const COLUMNS: &str =
    "id, site_name, url, title, text, authors, publish_date, score, summary, created_at";

/// PostgreSQL backend for production deployments. Same table layout and
/// ranking as [`crate::SQLiteStorage`].
pub struct PgStorage {
    pool: PgPool,
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

fn article_from_row(row: &PgRow) -> Result<Article> {
    let authors: Option<String> = row.get("authors");
    let publish_date: Option<i64> = row.get("publish_date");
    Ok(Article {
        id: row.get("id"),
        site_name: row.get("site_name"),
        url: row.get("url"),
        title: row.get("title"),
        text: row.get("text"),
        authors: split_authors(authors.as_deref()),
        publish_date: publish_date.map(from_millis).transpose()?,
        score: row.get("score"),
        summary: row.get("summary"),
        created_at: from_millis(row.get("created_at"))?,
    })
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, query: &PageQuery) {
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

fn count_query(query: &PageQuery) -> QueryBuilder<'static, Postgres> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM articles");
    push_filter(&mut count, query);
    count
}

fn ranked_query(query: &PageQuery, hash: &TiebreakHash) -> QueryBuilder<'static, Postgres> {
    let mut select = QueryBuilder::new(format!("SELECT {} FROM articles", COLUMNS));
    push_filter(&mut select, query);
    select
        .push(" ORDER BY (score = ")
        .push_bind(UNSCORED)
        .push(") ASC, score DESC, ((id * ")
        .push_bind(hash.multiplier())
        .push(" + ")
        .push_bind(hash.seed())
        .push(") % ")
        .push_bind(hash.modulus())
        .push(") ASC, id ASC LIMIT ")
        .push_bind(i64::from(query.limit))
        .push(" OFFSET ")
        .push_bind(i64::from(query.offset));
    select
}

impl PgStorage {
    /// Connect with a `postgres://` or `postgresql://` URL and bootstrap the schema.
    pub async fn new_with_url(url: &str) -> Result<Self> {
        let options = PgConnectOptions::from_str(url).map_err(db_error("Invalid database URL"))?;
        Self::new_with_options(options).await
    }

    pub async fn new_with_options(options: PgConnectOptions) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
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
impl ArticleStorage for PgStorage {
    async fn insert_if_absent(&self, article: &NewArticle) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles
            (site_name, url, title, text, authors, publish_date, score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (url) DO NOTHING
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
        let done = sqlx::query(
            "UPDATE articles SET score = $1, summary = $2 WHERE url = $3 AND score = $4",
        )
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
            "SELECT {} FROM articles WHERE score = $1 ORDER BY id",
            COLUMNS
        ))
        .bind(UNSCORED)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to fetch unscored articles"))?;

        rows.iter().map(article_from_row).collect()
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Page> {
        let total: i64 = count_query(query)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to count articles"))?;

        let mut select = ranked_query(query, &self.hash);
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
        let urls: Vec<String> = sqlx::query_scalar("SELECT url FROM articles WHERE site_name = $1")
            .bind(site_name)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to fetch processed urls"))?;

        Ok(urls.into_iter().collect())
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<Article>> {
        let row = sqlx::query(&format!("SELECT {} FROM articles WHERE url = $1", COLUMNS))
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to fetch article"))?;

        row.as_ref().map(article_from_row).transpose()
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query("DELETE FROM articles WHERE created_at < $1")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete old articles"))?;

        Ok(done.rows_affected())
    }
}
