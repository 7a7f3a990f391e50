pub mod dedup;
pub mod manager;
pub mod scrapers;

pub use dedup::IngestionFilter;
pub use manager::{IngestManager, IngestReport};
pub use scrapers::{HtmlScraper, ScrapedArticle, Scraper};

pub mod prelude {
    pub use super::scrapers::Scraper;
    pub use super::{IngestManager, IngestReport, IngestionFilter};
    pub use nd_core::{NewArticle, Result, Error};
}
