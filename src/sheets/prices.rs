//! Price grid transcoder
//!
//! The prices worksheet interleaves item-identity rows with price-value
//! rows: row 0 carries metadata (including a "last updated" date in the
//! 4th column), row 1 is a header, and rows 2..N form pairs of
//!
//! ```text
//! [category, ticker, name, location1, location2, ...]   identity row
//! [      "",     "",   "",   price1,    price2, ...]    value row
//! ```
//!
//! One column of the pair (index 4 on the live sheet) is the ticker's
//! default price. Cells are aligned positionally; the first column where
//! both cells are blank ends that item's data.

use crate::database::{self, ItemRow, PriceRow};
use crate::error::Result;
use crate::sheets::{ParseWarning, SheetOutcome};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};

/// Column index holding each ticker's default price on the live sheet
pub const DEFAULT_PRICE_COLUMN: usize = 4;

lazy_static! {
    /// Matches the embedded date in cells like "Updated 2023-Feb-19"
    static ref DATE_RE: Regex = Regex::new(r"\d{4}-[A-Za-z]{3}-\d{2}").unwrap();
}

/// Tunables for the price grid decoder
#[derive(Debug, Clone)]
pub struct PricesConfig {
    /// Which column of an identity/value pair carries the default price
    pub default_price_column: usize,
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            default_price_column: DEFAULT_PRICE_COLUMN,
        }
    }
}

/// One decoded price cell, in discovery order (not deduplicated)
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub ticker: String,
    pub item_name: String,
    pub location: String,
    pub price: f64,
    pub is_default: bool,
    pub category: Option<String>,
}

/// Deduplicated batches ready for upsert, keyed for last-write-wins
#[derive(Debug, Default, PartialEq)]
pub struct PriceBatches {
    pub locations: BTreeSet<String>,
    pub items: BTreeMap<String, ItemRow>,
    pub prices: BTreeMap<(String, String), PriceRow>,
}

/// Result of decoding one price grid
#[derive(Debug)]
pub struct ParsedPrices {
    pub last_updated: Option<NaiveDate>,
    /// Discovery-order records, for caller-side reporting
    pub records: Vec<PriceRecord>,
    pub batches: PriceBatches,
}

/// Decode a price grid into deduplicated batches.
///
/// Pure: no storage side effects. Fewer than 3 rows is `Empty`; every
/// recoverable oddity (bad date, ragged pair, unparsable cell, default
/// count off) lands in the warnings list instead of aborting.
pub fn parse_price_grid(grid: &[Vec<String>], config: &PricesConfig) -> SheetOutcome<ParsedPrices> {
    if grid.len() < 3 {
        return SheetOutcome::Empty;
    }

    let mut warnings = Vec::new();
    let last_updated = extract_last_updated(&grid[0], &mut warnings);

    let mut batches = PriceBatches::default();
    let mut records = Vec::new();

    // Identity/value pairs start at row 2; an identity row without its
    // value row (odd tail) is dropped.
    let mut row = 2;
    while row + 1 < grid.len() {
        let item_row = &grid[row];
        let value_row = &grid[row + 1];
        row += 2;

        if item_row.len() < 3 {
            continue;
        }
        let ticker = item_row[1].trim();
        let item_name = item_row[2].trim();
        if ticker.is_empty() || item_name.is_empty() {
            continue;
        }
        let category = match item_row[0].trim() {
            "" => None,
            c => Some(c.to_string()),
        };

        if item_row.len() != value_row.len() {
            warnings.push(ParseWarning::ColumnMismatch {
                ticker: ticker.to_string(),
                identity_cols: item_row.len(),
                value_cols: value_row.len(),
            });
            continue;
        }

        batches.items.insert(
            ticker.to_string(),
            ItemRow {
                ticker: ticker.to_string(),
                name: item_name.to_string(),
                category: category.clone(),
            },
        );

        for col in 3..item_row.len() {
            let location = item_row[col].trim();
            let price_str = value_row[col].trim();

            // Both blank marks the end of this item's data
            if location.is_empty() && price_str.is_empty() {
                break;
            }
            if location.is_empty() || price_str.is_empty() {
                continue;
            }

            let price: f64 = match price_str.parse() {
                Ok(p) => p,
                Err(_) => {
                    warnings.push(ParseWarning::BadPrice {
                        ticker: ticker.to_string(),
                        location: location.to_string(),
                        raw: price_str.to_string(),
                    });
                    continue;
                }
            };

            let is_default = col == config.default_price_column;
            batches.locations.insert(location.to_string());
            batches.prices.insert(
                (ticker.to_string(), location.to_string()),
                PriceRow {
                    ticker: ticker.to_string(),
                    location: location.to_string(),
                    price,
                    is_default,
                    last_updated,
                },
            );
            records.push(PriceRecord {
                ticker: ticker.to_string(),
                item_name: item_name.to_string(),
                location: location.to_string(),
                price,
                is_default,
                category: category.clone(),
            });
        }
    }

    validate_defaults(&batches, &mut warnings);

    SheetOutcome::Parsed {
        data: ParsedPrices {
            last_updated,
            records,
            batches,
        },
        warnings,
    }
}

/// Extract the sheet's "last updated" date from the metadata row.
///
/// A blank or absent cell is silently None; a non-blank cell that yields
/// no date is None with a warning.
fn extract_last_updated(meta_row: &[String], warnings: &mut Vec<ParseWarning>) -> Option<NaiveDate> {
    let cell = match meta_row.get(3) {
        Some(c) if !c.trim().is_empty() => c,
        _ => return None,
    };

    if let Some(m) = DATE_RE.find(cell) {
        if let Ok(date) = NaiveDate::parse_from_str(m.as_str(), "%Y-%b-%d") {
            return Some(date);
        }
    }

    warnings.push(ParseWarning::UnparsableDate { cell: cell.clone() });
    None
}

/// The sheet carries no constraint that each ticker has exactly one
/// default-marked price; flag tickers where that expectation is broken.
fn validate_defaults(batches: &PriceBatches, warnings: &mut Vec<ParseWarning>) {
    let mut defaults: BTreeMap<&str, usize> = BTreeMap::new();
    for ((ticker, _), price) in &batches.prices {
        let entry = defaults.entry(ticker.as_str()).or_insert(0);
        if price.is_default {
            *entry += 1;
        }
    }
    for (ticker, count) in defaults {
        if count != 1 {
            warnings.push(ParseWarning::DefaultCount {
                ticker: ticker.to_string(),
                defaults: count,
            });
        }
    }
}

/// Upsert the decoded batches in foreign-key order:
/// locations, then items, then prices.
pub fn apply_price_batches(conn: &mut Connection, batches: &PriceBatches) -> Result<()> {
    database::batch_upsert_locations(conn, &batches.locations)?;
    let items: Vec<ItemRow> = batches.items.values().cloned().collect();
    database::batch_upsert_items(conn, &items)?;
    let prices: Vec<PriceRow> = batches.prices.values().cloned().collect();
    database::batch_upsert_prices(conn, &prices)?;
    Ok(())
}

/// Decode a price grid and apply it to the database
pub fn sync_prices_grid(
    conn: &mut Connection,
    grid: &[Vec<String>],
    config: &PricesConfig,
) -> SheetOutcome<ParsedPrices> {
    match parse_price_grid(grid, config) {
        SheetOutcome::Parsed { data, warnings } => {
            for warning in &warnings {
                log::warn!("Prices sheet: {}", warning);
            }
            match apply_price_batches(conn, &data.batches) {
                Ok(()) => {
                    log::info!("Processed {} price records", data.records.len());
                    SheetOutcome::Parsed { data, warnings }
                }
                Err(e) => SheetOutcome::Failed(e),
            }
        }
        SheetOutcome::Empty => {
            log::info!("Prices sheet has no data rows, nothing to sync");
            SheetOutcome::Empty
        }
        other => other,
    }
}
