// Padron Infrastructure - Fetch Adapter
// Implements: ElectoralFetcher via an external scraper process

mod scraper_fetcher;

pub use scraper_fetcher::{ScraperCommandFetcher, ScraperConfig};
