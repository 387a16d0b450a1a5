//! Raw field bag → canonical snapshot.
//!
//! Pure transform: no I/O, no clock. The caller supplies the cycle
//! timestamp, so normalizing the same bag twice yields equal records.
//!
//! - Hashrates carry a unit suffix and are scaled to TH/s by powers of 1000.
//! - Monetary values are split on the first character outside `[0-9.]`; the
//!   numeric prefix must be a non-negative decimal, the suffix (currency) is
//!   dropped.
//! - Worker names are the uniqueness key of a cycle; a repeated name is a
//!   [`ObserverError::DuplicateWorker`], never silently merged.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    DailyEarningsRecord, PoolId, RawPage, RawSummary, RawWorkerRow, Snapshot, SummarySnapshot,
    WorkerStatus, WorkerStatusRecord,
};
use crate::error::ObserverError;

/// Normalizes one cycle's raw page into canonical records.
///
/// # Errors
///
/// Returns [`ObserverError::MalformedField`] naming the first field that
/// matches no known format, or [`ObserverError::DuplicateWorker`] when two
/// worker rows share a name.
pub fn normalize(
    pool_id: &PoolId,
    raw: &RawPage,
    observed_at: DateTime<Utc>,
) -> Result<Snapshot, ObserverError> {
    let summary = normalize_summary(pool_id, &raw.summary, observed_at)?;

    let mut seen = HashSet::with_capacity(raw.workers.len());
    let mut workers = Vec::with_capacity(raw.workers.len());
    for (idx, row) in raw.workers.iter().enumerate() {
        let record = normalize_worker(pool_id, idx, row, observed_at)?;
        if !seen.insert(record.worker_name.clone()) {
            return Err(ObserverError::DuplicateWorker {
                worker: record.worker_name,
            });
        }
        workers.push(record);
    }

    let mut days = HashSet::with_capacity(raw.daily_earnings.len());
    let mut daily_earnings = Vec::with_capacity(raw.daily_earnings.len());
    for (idx, row) in raw.daily_earnings.iter().enumerate() {
        let field = |name: &str| format!("daily_earnings[{idx}].{name}");
        let date = parse_day(&field("date"), &row.date)?;
        if !days.insert(date) {
            return Err(ObserverError::malformed(
                field("date"),
                format!("{} (day listed twice)", row.date),
            ));
        }
        daily_earnings.push(DailyEarningsRecord {
            pool_id: pool_id.clone(),
            date,
            total_income: parse_amount(&field("total_income"), &row.total_income)?,
            hashrate: parse_hashrate(&field("hashrate"), &row.hashrate)?,
            recorded_at: observed_at,
        });
    }

    Ok(Snapshot {
        summary,
        workers,
        daily_earnings,
    })
}

fn normalize_summary(
    pool_id: &PoolId,
    raw: &RawSummary,
    observed_at: DateTime<Utc>,
) -> Result<SummarySnapshot, ObserverError> {
    Ok(SummarySnapshot {
        pool_id: pool_id.clone(),
        timestamp: observed_at,
        current_hashrate: parse_hashrate("summary.current_hashrate", &raw.current_hashrate)?,
        avg_hashrate_24h: parse_hashrate("summary.avg_hashrate_24h", &raw.avg_hashrate_24h)?,
        online_workers: parse_count("summary.online_workers", &raw.online_workers)?,
        offline_workers: parse_count("summary.offline_workers", &raw.offline_workers)?,
        balance: parse_amount("summary.balance", &raw.balance)?,
        last_income: parse_amount("summary.last_income", &raw.last_income)?,
    })
}

fn normalize_worker(
    pool_id: &PoolId,
    idx: usize,
    row: &RawWorkerRow,
    observed_at: DateTime<Utc>,
) -> Result<WorkerStatusRecord, ObserverError> {
    let field = |name: &str| format!("workers[{idx}].{name}");

    let worker_name = row.name.trim();
    if worker_name.is_empty() {
        return Err(ObserverError::malformed(field("name"), &row.name));
    }
    let status = WorkerStatus::from_str(&row.status)
        .map_err(|_| ObserverError::malformed(field("status"), &row.status))?;

    Ok(WorkerStatusRecord {
        pool_id: pool_id.clone(),
        timestamp: observed_at,
        worker_name: worker_name.to_string(),
        status,
        hashrate_10m: parse_hashrate(&field("hashrate_10m"), &row.hashrate_10m)?,
        hashrate_1h: parse_hashrate(&field("hashrate_1h"), &row.hashrate_1h)?,
        hashrate_24h: parse_hashrate(&field("hashrate_24h"), &row.hashrate_24h)?,
        last_exchange_time: row.last_exchange_time.trim().to_string(),
    })
}

/// Splits `raw` into its leading `[0-9.]` run and the remainder.
fn split_numeric(raw: &str) -> (&str, &str) {
    let end = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    raw.split_at(end)
}

/// Power of 1000 relative to TH/s for a hashrate unit.
fn unit_exponent(unit: &str) -> Option<i32> {
    match unit.to_ascii_uppercase().as_str() {
        "H/S" => Some(-4),
        "KH/S" => Some(-3),
        "MH/S" => Some(-2),
        "GH/S" => Some(-1),
        "TH/S" => Some(0),
        "PH/S" => Some(1),
        "EH/S" => Some(2),
        _ => None,
    }
}

/// Parses a hashrate like `"38.384 PH/s"` into TH/s.
///
/// A bare zero (`"0"`) is accepted for idle workers; any other value needs a
/// unit.
///
/// # Errors
///
/// Returns [`ObserverError::MalformedField`] naming `field` when the value
/// has no numeric prefix or an unknown unit.
pub fn parse_hashrate(field: &str, raw: &str) -> Result<f64, ObserverError> {
    let trimmed = raw.trim();
    let (number, unit) = split_numeric(trimmed);
    let value: f64 = number
        .parse()
        .map_err(|_| ObserverError::malformed(field, raw))?;
    if !value.is_finite() {
        return Err(ObserverError::malformed(field, raw));
    }

    let unit = unit.trim();
    if unit.is_empty() {
        return if value == 0.0 {
            Ok(0.0)
        } else {
            Err(ObserverError::malformed(field, raw))
        };
    }

    let exponent = unit_exponent(unit).ok_or_else(|| ObserverError::malformed(field, raw))?;
    let scale = 1000_f64.powi(exponent.abs());
    Ok(if exponent >= 0 {
        value * scale
    } else {
        value / scale
    })
}

/// Parses a monetary value like `"0.01570138BTC"` into a decimal.
///
/// # Errors
///
/// Returns [`ObserverError::MalformedField`] naming `field` when the numeric
/// prefix is missing or not a decimal.
pub fn parse_amount(field: &str, raw: &str) -> Result<Decimal, ObserverError> {
    let (number, _currency) = split_numeric(raw.trim());
    let value = Decimal::from_str(number).map_err(|_| ObserverError::malformed(field, raw))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ObserverError::malformed(field, raw));
    }
    Ok(value.normalize())
}

/// Parses a non-negative worker count.
///
/// # Errors
///
/// Returns [`ObserverError::MalformedField`] naming `field` for anything
/// but a non-negative integer.
pub fn parse_count(field: &str, raw: &str) -> Result<u32, ObserverError> {
    raw.trim()
        .parse()
        .map_err(|_| ObserverError::malformed(field, raw))
}

/// Parses a calendar day in `DD/MM/YYYY` or ISO `YYYY-MM-DD` form.
///
/// # Errors
///
/// Returns [`ObserverError::MalformedField`] naming `field` for any other
/// format or an impossible date.
pub fn parse_day(field: &str, raw: &str) -> Result<NaiveDate, ObserverError> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .map_err(|_| ObserverError::malformed(field, raw))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{RawEarningRow, RawWorkerRow};
    use chrono::TimeZone;

    fn pool() -> PoolId {
        let Ok(id) = PoolId::new("kz-01") else {
            panic!("valid id");
        };
        id
    }

    fn at() -> DateTime<Utc> {
        let chrono::LocalResult::Single(ts) = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0) else {
            panic!("valid timestamp");
        };
        ts
    }

    fn worker(name: &str, status: &str) -> RawWorkerRow {
        RawWorkerRow {
            name: name.to_string(),
            status: status.to_string(),
            hashrate_10m: "110.5 TH/s".to_string(),
            hashrate_1h: "108 TH/s".to_string(),
            hashrate_24h: "0.109 PH/s".to_string(),
            last_exchange_time: "2026-03-14 09:29".to_string(),
        }
    }

    fn page() -> RawPage {
        RawPage {
            summary: RawSummary {
                current_hashrate: "38.384 PH/s".to_string(),
                avg_hashrate_24h: "37.9 PH/s".to_string(),
                online_workers: "2".to_string(),
                offline_workers: "1".to_string(),
                balance: "0.01570138BTC".to_string(),
                last_income: "0.00421 BTC".to_string(),
            },
            workers: vec![
                worker("rig-001", "ONLINE"),
                worker("rig-002", "ONLINE"),
                worker("rig-003", "OFFLINE"),
            ],
            daily_earnings: vec![RawEarningRow {
                date: "13/03/2026".to_string(),
                total_income: "0.0042BTC".to_string(),
                hashrate: "37.5 PH/s".to_string(),
            }],
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn hashrate_units_scale_to_terahash() {
        let Ok(ph) = parse_hashrate("f", "1 PH/s") else {
            panic!("PH/s must parse");
        };
        assert_eq!(ph, 1000.0);
        let Ok(gh) = parse_hashrate("f", "500 GH/s") else {
            panic!("GH/s must parse");
        };
        assert_eq!(gh, 0.5);
        let Ok(th) = parse_hashrate("f", "10 TH/s") else {
            panic!("TH/s must parse");
        };
        assert_eq!(th, 10.0);
        let Ok(mh) = parse_hashrate("f", "2500000 MH/s") else {
            panic!("MH/s must parse");
        };
        assert_close(mh, 2.5);
        let Ok(compact) = parse_hashrate("f", "38.384PH/s") else {
            panic!("unit without space must parse");
        };
        assert_close(compact, 38_384.0);
    }

    #[test]
    fn hashrate_rejects_unknown_units_and_garbage() {
        let unknown = parse_hashrate("summary.current_hashrate", "12 XH/s");
        let Err(ObserverError::MalformedField { field, .. }) = unknown else {
            panic!("unknown unit must be malformed");
        };
        assert_eq!(field, "summary.current_hashrate");
        assert!(parse_hashrate("f", "PH/s").is_err());
        assert!(parse_hashrate("f", "").is_err());
        assert!(parse_hashrate("f", "12").is_err());
        assert!(parse_hashrate("f", "1.2.3 TH/s").is_err());
    }

    #[test]
    fn bare_zero_hashrate_is_zero() {
        assert!(matches!(parse_hashrate("f", "0"), Ok(v) if v == 0.0));
        assert!(matches!(parse_hashrate("f", "0 H/s"), Ok(v) if v == 0.0));
    }

    #[test]
    fn amounts_drop_the_currency_suffix() {
        let Ok(balance) = parse_amount("f", "0.01570138BTC") else {
            panic!("amount must parse");
        };
        assert_eq!(balance, Decimal::new(1_570_138, 8));
        let Ok(zero) = parse_amount("f", "0BTC") else {
            panic!("zero must parse");
        };
        assert!(zero.is_zero());
        let Ok(spaced) = parse_amount("f", " 0.5 BTC ") else {
            panic!("spaced amount must parse");
        };
        assert_eq!(spaced, Decimal::new(5, 1));
    }

    #[test]
    fn amounts_without_leading_digits_fail() {
        assert!(matches!(
            parse_amount("summary.balance", "BTC 0.1"),
            Err(ObserverError::MalformedField { ref field, .. }) if field == "summary.balance"
        ));
        assert!(parse_amount("f", "-0.1BTC").is_err());
        assert!(parse_amount("f", "").is_err());
    }

    #[test]
    fn counts_and_days_parse() {
        assert!(matches!(parse_count("f", " 12 "), Ok(12)));
        assert!(parse_count("f", "-1").is_err());
        assert!(parse_count("f", "twelve").is_err());

        let Ok(day) = parse_day("f", "3/1/2026") else {
            panic!("short day must parse");
        };
        assert_eq!(day, NaiveDate::from_ymd_opt(2026, 1, 3).unwrap_or_default());
        assert!(parse_day("f", "2026-01-03").is_ok());
        assert!(parse_day("f", "31/02/2026").is_err());
        assert!(parse_day("f", "yesterday").is_err());
    }

    #[test]
    fn normalizes_a_full_page() {
        let Ok(snapshot) = normalize(&pool(), &page(), at()) else {
            panic!("page must normalize");
        };
        assert_close(snapshot.summary.current_hashrate, 38_384.0);
        assert_close(snapshot.summary.avg_hashrate_24h, 37_900.0);
        assert_eq!(snapshot.summary.online_workers, 2);
        assert_eq!(snapshot.summary.offline_workers, 1);
        assert_eq!(snapshot.summary.balance, Decimal::new(1_570_138, 8));
        assert_eq!(snapshot.workers.len(), 3);
        assert_eq!(snapshot.offline_workers().count(), 1);
        let Some(rig) = snapshot.workers.first() else {
            panic!("missing worker");
        };
        assert_close(rig.hashrate_24h, 109.0);
        assert_eq!(rig.timestamp, at());
        let Some(day) = snapshot.daily_earnings.first() else {
            panic!("missing earnings row");
        };
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2026, 3, 13).unwrap_or_default());
        assert_eq!(day.recorded_at, at());
    }

    #[test]
    fn normalization_is_idempotent() {
        let first = normalize(&pool(), &page(), at());
        let second = normalize(&pool(), &page(), at());
        let (Ok(first), Ok(second)) = (first, second) else {
            panic!("page must normalize");
        };
        assert_eq!(first, second);
        assert_eq!(
            first.summary.current_hashrate.to_bits(),
            second.summary.current_hashrate.to_bits()
        );
    }

    #[test]
    fn duplicate_worker_is_rejected() {
        let mut raw = page();
        raw.workers.push(worker("rig-002", "OFFLINE"));
        let result = normalize(&pool(), &raw, at());
        assert!(matches!(
            result,
            Err(ObserverError::DuplicateWorker { ref worker }) if worker == "rig-002"
        ));
    }

    #[test]
    fn worker_names_are_trimmed_before_uniqueness() {
        let mut raw = page();
        raw.workers.push(worker(" rig-001 ", "ONLINE"));
        assert!(matches!(
            normalize(&pool(), &raw, at()),
            Err(ObserverError::DuplicateWorker { .. })
        ));
    }

    #[test]
    fn malformed_worker_field_is_named() {
        let mut raw = page();
        if let Some(row) = raw.workers.get_mut(1) {
            row.hashrate_1h = "fast".to_string();
        }
        let Err(ObserverError::MalformedField { field, value }) = normalize(&pool(), &raw, at())
        else {
            panic!("expected malformed field");
        };
        assert_eq!(field, "workers[1].hashrate_1h");
        assert_eq!(value, "fast");
    }

    #[test]
    fn unknown_worker_status_is_malformed() {
        let mut raw = page();
        raw.workers.push(worker("rig-009", "SLEEPING"));
        assert!(matches!(
            normalize(&pool(), &raw, at()),
            Err(ObserverError::MalformedField { ref field, .. }) if field == "workers[3].status"
        ));
    }

    #[test]
    fn repeated_earnings_day_is_rejected() {
        let mut raw = page();
        raw.daily_earnings.push(RawEarningRow {
            date: "2026-03-13".to_string(),
            total_income: "0.001BTC".to_string(),
            hashrate: "1 PH/s".to_string(),
        });
        assert!(normalize(&pool(), &raw, at()).is_err());
    }
}
