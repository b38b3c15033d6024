//! Fills valuation gaps on a primary quote from a secondary source.

use crate::core::quote::Quote;

/// Copies each valuation field the primary quote is missing from the
/// fallback quote. Price, volume and identity fields always stay with the
/// primary; a present primary field is never overwritten.
pub fn supplement(primary: &Quote, fallback: Option<&Quote>) -> Quote {
    let mut merged = primary.clone();
    let Some(fallback) = fallback else {
        return merged;
    };

    if merged.per.is_none() {
        merged.per = fallback.per;
    }
    if merged.pbr.is_none() {
        merged.pbr = fallback.pbr;
    }
    if merged.dividend_yield.is_none() {
        merged.dividend_yield = fallback.dividend_yield;
    }
    if merged.roe.is_none() {
        merged.roe = fallback.roe;
    }
    merged
}
