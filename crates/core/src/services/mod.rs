//! Core business logic services.

mod health;
mod scraper;
mod supervisor;

pub use health::{HealthMonitor, HEALTH_PROBE_INTERVAL};
pub use scraper::{system_fee_cache, ScraperConfig, ScraperService, SystemFeeCache};
pub use supervisor::{ScraperOptions, Supervisor};
