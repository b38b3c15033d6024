//! Symbol normalization and market classification.
//!
//! Classification decides provider priority: domestic codes go to the
//! exchange API first, foreign tickers go straight to the broad-market
//! fallback, and synthetic placeholder rows never reach the network.

/// Prefixes used by aggregate placeholder rows imported from broker CSVs.
const SYNTHETIC_PREFIXES: [&str; 2] = ["PORTFOLIO_", "FUND_"];
const SYNTHETIC_LITERALS: [&str; 2] = ["STOCK_PORTFOLIO", "TOTAL_PORTFOLIO"];

const DOMESTIC_CODE_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Fixed-length numeric code, optionally with a trailing letter
    /// (preferred-share notation).
    Domestic,
    /// Alphabetic ticker, or anything we cannot classify otherwise.
    Foreign,
    /// Placeholder row representing a fund or aggregate position.
    /// Must never be sent to a quote provider.
    Synthetic,
}

/// Canonical form used as cache key: trimmed and upper-cased.
pub fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

pub fn classify(symbol: &str) -> SymbolKind {
    let symbol = normalize(symbol);

    if is_synthetic(&symbol) {
        SymbolKind::Synthetic
    } else if is_domestic(&symbol) {
        SymbolKind::Domestic
    } else {
        SymbolKind::Foreign
    }
}

fn is_synthetic(symbol: &str) -> bool {
    SYNTHETIC_PREFIXES.iter().any(|p| symbol.starts_with(p))
        || SYNTHETIC_LITERALS.contains(&symbol)
}

fn is_domestic(symbol: &str) -> bool {
    let bytes = symbol.as_bytes();
    match bytes.len() {
        n if n == DOMESTIC_CODE_LEN => bytes.iter().all(u8::is_ascii_digit),
        n if n == DOMESTIC_CODE_LEN + 1 => {
            bytes[..DOMESTIC_CODE_LEN].iter().all(u8::is_ascii_digit)
                && bytes[DOMESTIC_CODE_LEN].is_ascii_alphabetic()
        }
        _ => false,
    }
}
