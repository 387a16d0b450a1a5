//! Raw field bag extracted from one observer page load.
//!
//! Every value is the trimmed text of a page element, exactly as rendered.
//! Nothing here is validated; [`crate::pipeline::normalizer`] turns the bag
//! into canonical records or rejects it.

use serde::{Deserialize, Serialize};

/// Summary block of the observer page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSummary {
    /// Current hashrate, e.g. `"38.384 PH/s"`.
    pub current_hashrate: String,
    /// 24h average hashrate.
    pub avg_hashrate_24h: String,
    /// Online worker count.
    pub online_workers: String,
    /// Offline worker count.
    pub offline_workers: String,
    /// Unpaid balance, e.g. `"0.01570138BTC"`.
    pub balance: String,
    /// Most recent income credit.
    pub last_income: String,
}

/// One row of the worker table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWorkerRow {
    /// Worker name as shown on the page.
    pub name: String,
    /// `ONLINE` or `OFFLINE`.
    pub status: String,
    /// 10-minute hashrate.
    pub hashrate_10m: String,
    /// 1-hour hashrate.
    pub hashrate_1h: String,
    /// 24-hour hashrate.
    pub hashrate_24h: String,
    /// Last share submission time, free-form.
    pub last_exchange_time: String,
}

/// One row of the daily earnings table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEarningRow {
    /// Calendar day, `DD/MM/YYYY` on the observer page.
    pub date: String,
    /// Running income total for the day.
    pub total_income: String,
    /// Hashrate credited for the day.
    pub hashrate: String,
}

/// Everything one fetch extracted from the observer page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPage {
    /// Summary block.
    pub summary: RawSummary,
    /// Worker table rows in page order.
    pub workers: Vec<RawWorkerRow>,
    /// Daily earnings rows in page order.
    pub daily_earnings: Vec<RawEarningRow>,
}
