//! Market-hours predicate.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, NaiveTime, Timelike};

use crate::core::config::TradingSessionConfig;

#[derive(Debug, Clone)]
pub struct TradingSession {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

/// Two fixed daily sessions on a five-day week, expressed as local
/// wall-clock boundaries. Only the boundaries are configurable; there is
/// no holiday calendar.
#[derive(Debug, Clone)]
pub struct MarketHours {
    sessions: Vec<TradingSession>,
}

impl MarketHours {
    pub fn new(sessions: Vec<TradingSession>) -> Self {
        MarketHours { sessions }
    }

    pub fn from_config(configs: &[TradingSessionConfig]) -> Result<Self> {
        let sessions = configs
            .iter()
            .map(|session| {
                let open = parse_wall_clock(&session.open)?;
                let close = parse_wall_clock(&session.close)?;
                Ok(TradingSession { open, close })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MarketHours { sessions })
    }

    pub fn is_open(&self) -> bool {
        self.is_open_at(Local::now())
    }

    pub fn is_open_at(&self, now: DateTime<Local>) -> bool {
        // Saturday and Sunday are never trading days
        if now.weekday().number_from_monday() >= 6 {
            return false;
        }
        let time = now.time().with_nanosecond(0).unwrap_or_else(|| now.time());
        self.sessions
            .iter()
            .any(|session| session.open <= time && time <= session.close)
    }
}

impl Default for MarketHours {
    fn default() -> Self {
        MarketHours::new(vec![
            TradingSession {
                open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                close: NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
            },
            TradingSession {
                open: NaiveTime::from_hms_opt(12, 30, 0).unwrap(),
                close: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            },
        ])
    }
}

fn parse_wall_clock(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("Failed to parse session boundary: {value}"))
}
