//! Field extraction for the observer page layout.
//!
//! The summary block is rendered as label/value line pairs, so summary
//! fields are found by scanning the visible text lines of `<body>` for known
//! labels (Russian and English) and taking the following line. Worker and
//! daily earnings rows come from `<table>` elements recognised by their
//! header text.

use scraper::{ElementRef, Html, Selector};

use crate::domain::{RawEarningRow, RawPage, RawSummary, RawWorkerRow};
use crate::error::ObserverError;

const CURRENT_HASHRATE: &[&str] = &["Текущий хешрейт", "Current hashrate"];
const AVG_HASHRATE: &[&str] = &[
    "Средний хешрейт за 24ч",
    "24h average hashrate",
    "Average hashrate (24h)",
];
const ONLINE_WORKERS: &[&str] = &["Онлайн воркеры", "Online workers"];
const OFFLINE_WORKERS: &[&str] = &["Оффлайн воркеры", "Offline workers"];
const BALANCE: &[&str] = &["Баланс", "Balance"];
const LAST_INCOME: &[&str] = &["Последний доход", "Last income"];

const WORKER_HEADERS: &[&str] = &["Воркеры", "Статус", "Worker", "Status"];
/// First-cell labels of summary rows appended to the worker and earnings tables.
const TOTAL_LABELS: &[&str] = &["Всего", "Итого", "Total"];
const EARNING_HEADERS: &[&str] = &[
    "Доходы",
    "Дата",
    "Общий доход",
    "Date",
    "Income",
];

/// Minimum cells of a worker row: name, status, three hashrates.
const WORKER_CELLS: usize = 5;
/// Minimum cells of an earnings row: date, income, hashrate.
const EARNING_CELLS: usize = 3;

/// Compiled selectors for the observer page.
#[derive(Debug, Clone)]
pub struct ObserverLayout {
    body: Selector,
    table: Selector,
    head: Selector,
    body_row: Selector,
    cell: Selector,
}

impl ObserverLayout {
    /// Compiles the layout selectors.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Internal`] if a selector fails to compile.
    pub fn new() -> Result<Self, ObserverError> {
        Ok(Self {
            body: selector("body")?,
            table: selector("table")?,
            head: selector("thead")?,
            body_row: selector("tbody tr")?,
            cell: selector("td")?,
        })
    }

    /// Extracts the raw field bag from an HTML document.
    ///
    /// Missing fields stay empty; deciding whether the page is usable is
    /// left to [`super::check_complete`] and the normalizer.
    #[must_use]
    pub fn parse(&self, html: &str) -> RawPage {
        let document = Html::parse_document(html);
        let lines = document
            .select(&self.body)
            .next()
            .map(visible_lines)
            .unwrap_or_default();

        let mut page = RawPage {
            summary: summary_from_lines(&lines),
            ..RawPage::default()
        };

        for table in document.select(&self.table) {
            let rows: Vec<ElementRef<'_>> = table.select(&self.body_row).collect();
            if rows.is_empty() {
                continue;
            }
            let header = table
                .select(&self.head)
                .next()
                .map(text_of)
                .unwrap_or_default();
            let whole = text_of(table);

            if mentions(&header, WORKER_HEADERS)
                || whole.contains("ONLINE")
                || whole.contains("OFFLINE")
            {
                page.workers.extend(rows.iter().filter_map(|r| self.worker_row(*r)));
            } else if mentions(&header, EARNING_HEADERS) {
                page.daily_earnings
                    .extend(rows.iter().filter_map(|r| self.earning_row(*r)));
            }
        }
        page
    }

    fn cells(&self, row: ElementRef<'_>) -> Vec<String> {
        row.select(&self.cell).map(|c| text_of(c).trim().to_string()).collect()
    }

    fn worker_row(&self, row: ElementRef<'_>) -> Option<RawWorkerRow> {
        let mut cells = self.cells(row).into_iter();
        if cells.len() < WORKER_CELLS {
            return None;
        }
        let mut next = || cells.next().unwrap_or_default();
        let worker = RawWorkerRow {
            name: next(),
            status: next(),
            hashrate_10m: next(),
            hashrate_1h: next(),
            hashrate_24h: next(),
            last_exchange_time: next(),
        };
        // an unrecognised status is left for the normalizer to reject
        (!worker.name.is_empty() && !is_total(&worker.name)).then_some(worker)
    }

    fn earning_row(&self, row: ElementRef<'_>) -> Option<RawEarningRow> {
        let mut cells = self.cells(row).into_iter();
        if cells.len() < EARNING_CELLS {
            return None;
        }
        let mut next = || cells.next().unwrap_or_default();
        let earning = RawEarningRow {
            date: next(),
            total_income: next(),
            hashrate: next(),
        };
        looks_like_day(&earning.date).then_some(earning)
    }
}

fn selector(css: &str) -> Result<Selector, ObserverError> {
    Selector::parse(css).map_err(|e| ObserverError::Internal(format!("selector {css:?}: {e}")))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

fn is_total(label: &str) -> bool {
    TOTAL_LABELS.iter().any(|t| label.eq_ignore_ascii_case(t))
}

fn mentions(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

/// Visible text of `root` split into trimmed, non-empty lines. Script and
/// style contents are skipped.
fn visible_lines(root: ElementRef<'_>) -> Vec<String> {
    root.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name()))
                .is_some_and(|name| name == "script" || name == "style");
            (!hidden).then_some(text)
        })
        .flat_map(|text| text.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn summary_from_lines(lines: &[String]) -> RawSummary {
    let mut summary = RawSummary::default();
    for (line, value) in lines.iter().zip(lines.iter().skip(1)) {
        let value = value.clone();
        if mentions(line, CURRENT_HASHRATE) {
            summary.current_hashrate = value;
        } else if mentions(line, AVG_HASHRATE) {
            summary.avg_hashrate_24h = value;
        } else if mentions(line, ONLINE_WORKERS) {
            summary.online_workers = value;
        } else if mentions(line, OFFLINE_WORKERS) {
            summary.offline_workers = value;
        } else if BALANCE.contains(&line.as_str()) && value.contains("BTC") {
            summary.balance = value;
        } else if mentions(line, LAST_INCOME) {
            summary.last_income = value;
        }
    }
    summary
}

/// `D/M/YYYY`-shaped or ISO `YYYY-MM-DD`-shaped text.
fn looks_like_day(text: &str) -> bool {
    let shaped = |sep: char, widths: [(usize, usize); 3]| {
        let parts: Vec<&str> = text.split(sep).collect();
        parts.len() == 3
            && parts.iter().zip(widths).all(|(part, (min, max))| {
                (min..=max).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
            })
    };
    shaped('/', [(1, 2), (1, 2), (4, 4)]) || shaped('-', [(4, 4), (2, 2), (2, 2)])
}
