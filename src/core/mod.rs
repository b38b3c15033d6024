//! Core domain types and leaf components

pub mod alert;
pub mod cache;
pub mod config;
pub mod log;
pub mod portfolio;
pub mod quote;
pub mod source;
pub mod strategy;
pub mod symbol;

// Re-export main types for cleaner imports
pub use alert::{Alert, AlertKind, AlertSink};
pub use cache::QuoteCache;
pub use portfolio::{Holding, PortfolioStore, WatchlistEntry};
pub use quote::{DividendInfo, Quote};
pub use source::{FetchError, QuoteSource};
pub use strategy::{ConditionMode, Strategy};
pub use symbol::SymbolKind;
