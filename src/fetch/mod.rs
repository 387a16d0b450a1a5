//! Observer page loading.
//!
//! A [`PageFetcher`] turns one observer URL into a [`RawPage`]. The shipped
//! implementation is [`HttpPageFetcher`], which downloads the page with
//! `reqwest` and extracts fields with the [`ObserverLayout`] parser. Tests
//! and alternative renderers plug in through the trait.

pub mod http;
pub mod layout;

use std::fmt;
use std::future::Future;

pub use http::HttpPageFetcher;
pub use layout::ObserverLayout;

use crate::domain::RawPage;
use crate::error::ObserverError;

/// Loads a single observer page and returns its raw field bag.
///
/// Implementations own whatever session they need for the duration of one
/// call and release it on every exit path.
pub trait PageFetcher: Send + Sync + fmt::Debug {
    /// Fetches and extracts `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::FetchTimeout`] or [`ObserverError::Network`]
    /// when the page cannot be loaded and [`ObserverError::PageStructure`]
    /// when it does not match the known layout.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<RawPage, ObserverError>> + Send;
}

/// Rejects pages that loaded but are not usable.
///
/// A page without any summary value does not match the layout. A page whose
/// worker table rendered fewer rows than the summary announces (online plus
/// offline) was captured half-loaded and is worth one more try.
///
/// # Errors
///
/// Returns [`ObserverError::PageStructure`] or
/// [`ObserverError::IncompletePage`].
pub fn check_complete(page: &RawPage) -> Result<(), ObserverError> {
    let summary = &page.summary;
    let has_summary = [
        &summary.current_hashrate,
        &summary.avg_hashrate_24h,
        &summary.online_workers,
        &summary.offline_workers,
        &summary.balance,
    ]
    .iter()
    .any(|v| !v.trim().is_empty());
    if !has_summary {
        return Err(ObserverError::PageStructure(
            "summary block not found".to_string(),
        ));
    }

    let announced = [&summary.online_workers, &summary.offline_workers]
        .iter()
        .filter_map(|v| v.trim().parse::<u64>().ok())
        .sum::<u64>();
    let rendered = u64::try_from(page.workers.len()).unwrap_or(u64::MAX);
    if rendered < announced {
        return Err(ObserverError::IncompletePage(format!(
            "summary reports {announced} workers but only {rendered} worker rows were rendered"
        )));
    }
    Ok(())
}
