use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use nd_core::{ArticleStorage, PageQuery, SourcesConfig};
use nd_inference::{create_model, ModelConfig, RateLimiter, RelevanceClient, ScoringPipeline};
use nd_scrappers::{HtmlScraper, IngestManager};
use nd_web::{create_app, AppState};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

mod duration;
mod logging;
mod schedule;

use duration::HumanDuration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Scrape news sites, score articles for a reader, serve them ranked", long_about = None)]
pub struct Cli {
    /// `sqlite:<path>`, `postgres://...` (with the postgres feature) or `memory`
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:articles.db")]
    database: String,
    /// YAML file with categories and sources
    #[arg(long, env = "NEWSDESK_SOURCES", default_value = "sources.yaml")]
    sources: PathBuf,
    #[arg(long, env = "NEWSDESK_MODEL", default_value = "openai", help = "Scoring backend. Available models: openai (default), dummy")]
    model: String,
    #[arg(long, env = "OPENAI_API_BASE")]
    api_base: Option<String>,
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "OPENAI_MODEL")]
    openai_model: Option<String>,
    /// Requests per minute sent to the scoring model
    #[arg(long, env = "OPENAI_RATE_LIMIT", default_value = "10")]
    rate_limit: NonZeroU32,
    /// Timeout of a single model request (e.g. 120s, 2m)
    #[arg(long, default_value = "120s")]
    request_timeout: HumanDuration,
    /// Articles scored concurrently (calls are still rate limited)
    #[arg(long, default_value_t = nd_inference::pipeline::DEFAULT_CONCURRENCY)]
    concurrency: usize,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API and run the periodic jobs
    Serve {
        #[arg(long, env = "NEWSDESK_BIND", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
        #[arg(long, default_value = "30m")]
        scrape_every: HumanDuration,
        #[arg(long, default_value = "1h")]
        score_every: HumanDuration,
        /// Only serve the API, never scrape or score in the background
        #[arg(long)]
        no_schedule: bool,
    },
    /// Scrape every source once, or only the named one
    Scrape { site: Option<String> },
    /// Score every unscored article once
    Score,
    /// List categories and their sources
    Sources,
    /// Print the best ranked articles of a category or site
    Top {
        #[arg(long, conflicts_with = "site")]
        category: Option<String>,
        #[arg(long)]
        site: Option<String>,
        /// Only articles published within this window (e.g. 1d)
        #[arg(long)]
        within: Option<HumanDuration>,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Delete articles ingested longer ago than the given age
    Prune {
        #[arg(long, default_value = "30d")]
        older_than: HumanDuration,
    },
}

impl Cli {
    fn model_config(&self) -> ModelConfig {
        ModelConfig {
            backend: self.model.clone(),
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            model: self.openai_model.clone(),
            timeout: self.request_timeout.0,
        }
    }

    fn scoring_pipeline(
        &self,
        storage: Arc<dyn ArticleStorage>,
        sources: Arc<SourcesConfig>,
    ) -> anyhow::Result<ScoringPipeline> {
        let model = create_model(&self.model_config())?;
        let limiter = Arc::new(RateLimiter::per_minute(self.rate_limit));
        info!("🧠 Scoring with {} at {} requests/min", model.name(), self.rate_limit);
        let client = RelevanceClient::new(sources, model, limiter);
        Ok(ScoringPipeline::new(storage, client).with_concurrency(self.concurrency))
    }

    fn ingest_manager(
        &self,
        storage: Arc<dyn ArticleStorage>,
        sources: Arc<SourcesConfig>,
    ) -> anyhow::Result<IngestManager> {
        let scraper = HtmlScraper::new(self.request_timeout.0)?;
        Ok(IngestManager::new(storage, sources, Arc::new(scraper)))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_logging();
    let cli = Cli::parse();

    let sources = Arc::new(
        SourcesConfig::load(&cli.sources)
            .with_context(|| format!("loading sources from {}", cli.sources.display()))?,
    );

    if let Commands::Sources = cli.command {
        for category in &sources.categories {
            println!("{}", category.name);
            for source in &category.sources {
                let scored = if source.preference.is_some() { "scored" } else { "not scored" };
                println!("  {:<24} {} ({})", source.name, source.url, scored);
            }
        }
        return Ok(());
    }

    info!("💾 Opening storage {}", cli.database);
    let storage = nd_storage::create_storage(&cli.database).await?;

    match &cli.command {
        Commands::Serve {
            bind,
            scrape_every,
            score_every,
            no_schedule,
        } => {
            let pipeline = Arc::new(cli.scoring_pipeline(storage.clone(), sources.clone())?);
            let ingest = Arc::new(cli.ingest_manager(storage.clone(), sources.clone())?);

            if !no_schedule {
                let job = ingest.clone();
                schedule::spawn_every("scrape", schedule::SCRAPE_OFFSET, scrape_every.0, move || {
                    let job = job.clone();
                    async move {
                        job.ingest_all().await;
                    }
                });
                let job = pipeline.clone();
                schedule::spawn_every("score", schedule::SCORE_OFFSET, score_every.0, move || {
                    let job = job.clone();
                    async move {
                        if let Err(e) = job.run().await {
                            warn!("Scoring run aborted: {}", e);
                        }
                    }
                });
            }

            let app = create_app(AppState {
                storage,
                sources,
                pipeline,
                ingest,
            });
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("binding {}", bind))?;
            info!("🌐 Listening on http://{}", bind);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Commands::Scrape { site } => {
            let manager = cli.ingest_manager(storage, sources)?;
            let report = match site {
                Some(site) => manager.ingest_site(site).await?,
                None => manager.ingest_all().await,
            };
            println!(
                "discovered {}, selected {}, stored {}, failed {}",
                report.discovered, report.selected, report.stored, report.failed
            );
        }
        Commands::Score => {
            let report = cli.scoring_pipeline(storage, sources)?.run().await?;
            println!(
                "{} unscored: {} scored, {} ineligible, {} malformed, {} failed, {} superseded",
                report.total,
                report.scored,
                report.ineligible,
                report.malformed,
                report.failed,
                report.superseded
            );
        }
        Commands::Top {
            category,
            site,
            within,
            limit,
        } => {
            let sites = match (category, site) {
                (Some(category), _) => sources
                    .sites_in_category(category)
                    .with_context(|| format!("unknown category {}", category))?,
                (None, Some(site)) => vec![sources
                    .source(site)
                    .with_context(|| format!("unknown site {}", site))?
                    .name
                    .clone()],
                (None, None) => sources.all_site_names(),
            };
            let since = within
                .map(|w| {
                    w.before(Utc::now())
                        .with_context(|| format!("--within {:?} reaches too far back", w.0))
                })
                .transpose()?;
            let query = PageQuery::for_sites(sites).window(since, None).slice(*limit, 0);
            let page = storage.page(&query).await?;

            println!("{} matching articles", page.total);
            for article in page.articles {
                let score = if article.is_scored() {
                    article.score.to_string()
                } else {
                    "-".to_string()
                };
                println!("[{}] {} | {}", score, article.site_name, article.title);
                println!("    {}", article.url);
                if let Some(summary) = article.summary {
                    println!("    {}", summary);
                }
            }
        }
        Commands::Prune { older_than } => {
            let cutoff = older_than
                .before(Utc::now())
                .with_context(|| format!("--older-than {:?} reaches too far back", older_than.0))?;
            let removed = storage.delete_created_before(cutoff).await?;
            info!("🧹 Removed {} articles created before {}", removed, cutoff);
        }
        Commands::Sources => {}
    }

    Ok(())
}
