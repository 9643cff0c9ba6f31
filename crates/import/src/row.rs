use keihi_core::NormalizedTransaction;
use serde::{Deserialize, Serialize};

use crate::date::{looks_like_raw_date, normalize_date};

pub const DEFAULT_AMOUNT_OFFSETS: &[isize] = &[2, 3, 4, 5, 6];
pub const DEFAULT_HEADER_KEYWORDS: &[&str] = &["利用日", "ご利用日", "日付", "取引日", "date"];
pub const DEFAULT_SECTION_MARKERS: &[&str] = &["合計", "小計", "お支払", "ご利用者", "【"];

/// Cells whose leading integer exceeds this end a merchant name.
const AMOUNT_LIKE_MIN: u64 = 100;
const DATE_SCAN_WIDTH: usize = 3;

/// How a non-date first cell is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// Every non-empty, non-date first cell marks a header row.
    AnyNonDate,
    /// Only first cells containing a header keyword mark a header row; other
    /// rows may fall back to the carried date.
    #[default]
    Keywords,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Amount column candidates, relative to the date column.
    pub amount_offsets: Vec<isize>,
    pub header_policy: HeaderPolicy,
    pub header_keywords: Vec<String>,
    pub section_markers: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            amount_offsets: DEFAULT_AMOUNT_OFFSETS.to_vec(),
            header_policy: HeaderPolicy::default(),
            header_keywords: DEFAULT_HEADER_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            section_markers: DEFAULT_SECTION_MARKERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ExtractorConfig {
    fn is_section_marker(&self, cell: &str) -> bool {
        self.section_markers
            .iter()
            .any(|m| !m.is_empty() && cell.contains(m.as_str()))
    }

    fn is_header_keyword(&self, cell: &str) -> bool {
        let cell = cell.to_lowercase();
        self.header_keywords
            .iter()
            .any(|k| !k.is_empty() && cell.contains(&k.to_lowercase()))
    }
}

/// Why a row produced no transaction. Rejections are filtering, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRejected {
    TooFewCells,
    Header,
    /// A section marker row; the carried date has been cleared.
    SectionBoundary,
    NoDate,
    NoMerchant,
    NoAmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateAnchor {
    pub date: String,
    /// Column the date was read from; `None` when it was carried forward.
    pub column: Option<usize>,
}

/// One way of finding a row's date. Strategies are tried in rank order.
pub trait DateStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn locate(&self, cells: &[&str], carry: Option<&str>) -> Option<DateAnchor>;
}

/// First date-shaped cell among the leading `scan_width` cells.
pub struct ExplicitDateColumn {
    pub scan_width: usize,
}

impl DateStrategy for ExplicitDateColumn {
    fn name(&self) -> &'static str {
        "explicit-date-column"
    }

    fn locate(&self, cells: &[&str], _carry: Option<&str>) -> Option<DateAnchor> {
        cells
            .iter()
            .take(self.scan_width)
            .enumerate()
            .find_map(|(column, cell)| {
                normalize_date(cell).map(|date| DateAnchor {
                    date,
                    column: Some(column),
                })
            })
    }
}

/// The date of the last dated row, for grouped statement layouts.
pub struct CarriedDate;

impl DateStrategy for CarriedDate {
    fn name(&self) -> &'static str {
        "carried-date"
    }

    fn locate(&self, _cells: &[&str], carry: Option<&str>) -> Option<DateAnchor> {
        carry.map(|date| DateAnchor {
            date: date.to_string(),
            column: None,
        })
    }
}

pub fn default_strategies() -> Vec<Box<dyn DateStrategy>> {
    vec![
        Box::new(ExplicitDateColumn {
            scan_width: DATE_SCAN_WIDTH,
        }),
        Box::new(CarriedDate),
    ]
}

/// Turns one raw CSV row into a [`NormalizedTransaction`].
pub struct RowExtractor {
    config: ExtractorConfig,
    strategies: Vec<Box<dyn DateStrategy>>,
}

impl Default for RowExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl RowExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self::with_strategies(config, default_strategies())
    }

    pub fn with_strategies(config: ExtractorConfig, strategies: Vec<Box<dyn DateStrategy>>) -> Self {
        Self { config, strategies }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extracts a transaction from `row`, updating the carry-forward date.
    ///
    /// A date read from an explicit column becomes the new carry-forward date
    /// even if the row is rejected later on. A section marker clears it.
    pub fn extract<S: AsRef<str>>(
        &self,
        row: &[S],
        carry: &mut Option<String>,
    ) -> Result<NormalizedTransaction, RowRejected> {
        if row.len() < 2 {
            return Err(RowRejected::TooFewCells);
        }
        let cells: Vec<&str> = row.iter().map(|c| c.as_ref().trim()).collect();

        let first = cells[0];
        if !first.is_empty() && normalize_date(first).is_none() && !looks_like_raw_date(first) {
            if self.config.is_section_marker(first) {
                *carry = None;
                return Err(RowRejected::SectionBoundary);
            }
            let is_header = match self.config.header_policy {
                HeaderPolicy::AnyNonDate => true,
                HeaderPolicy::Keywords => self.config.is_header_keyword(first),
            };
            if is_header {
                return Err(RowRejected::Header);
            }
        }

        let anchor = self
            .strategies
            .iter()
            .find_map(|s| {
                let anchor = s.locate(&cells, carry.as_deref())?;
                tracing::trace!(strategy = s.name(), date = %anchor.date, "row dated");
                Some(anchor)
            })
            .ok_or(RowRejected::NoDate)?;
        if anchor.column.is_some() {
            *carry = Some(anchor.date.clone());
        }

        let merchant_start = anchor.column.map_or(0, |c| c + 1);
        let merchant = extract_merchant(&cells, merchant_start);
        if merchant.is_empty() {
            return Err(RowRejected::NoMerchant);
        }

        let base = anchor.column.map_or(-1, |c| c as isize);
        let amount = extract_amount(&cells, base, &self.config.amount_offsets)
            .ok_or(RowRejected::NoAmount)?;

        NormalizedTransaction::new(anchor.date, &merchant, amount).map_err(|_| RowRejected::NoDate)
    }
}

/// Joins non-empty cells from `start` until one looks like an amount.
fn extract_merchant(cells: &[&str], start: usize) -> String {
    let mut parts = Vec::new();
    for cell in cells.iter().skip(start) {
        if cell.is_empty() {
            continue;
        }
        if looks_like_amount(cell) {
            break;
        }
        parts.push(*cell);
    }
    parts.join(" ")
}

fn looks_like_amount(cell: &str) -> bool {
    parse_amount(cell).is_some_and(|v| v.unsigned_abs() > AMOUNT_LIKE_MIN)
}

/// First candidate column with a non-zero amount, as an absolute value.
fn extract_amount(cells: &[&str], base: isize, offsets: &[isize]) -> Option<i64> {
    offsets
        .iter()
        .filter_map(|off| usize::try_from(base + off).ok())
        .filter_map(|idx| cells.get(idx))
        .find_map(|cell| {
            parse_amount(cell)
                .filter(|v| *v != 0)
                .and_then(i64::checked_abs)
        })
}

/// Drops everything but ASCII digits and `-`, then reads a leading integer.
/// `"¥1,200"` is 1200, `"-3,000円"` is -3000, `"5-1"` is 5, `"--1"` is nothing.
pub(crate) fn parse_amount(cell: &str) -> Option<i64> {
    let stripped: String = cell
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    let (negative, rest) = match stripped.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, stripped.as_str()),
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let value: i64 = rest[..digits].parse().ok()?;
    Some(if negative { -value } else { value })
}
