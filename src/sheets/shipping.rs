//! Shipping grid transcoder
//!
//! The shipping worksheet is a cost matrix: row 0, columns 1..M name the
//! "from" locations; each later row names a "to" location in column 0 and
//! carries the per-origin cost in the matching column. Routes are
//! directional - (A -> B) is never mirrored to (B -> A).

use crate::database::{self, ShippingRoute};
use crate::error::Result;
use crate::sheets::{ParseWarning, SheetOutcome};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};

/// One decoded route, in discovery order (not deduplicated)
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingRecord {
    pub from_location: String,
    pub to_location: String,
    pub cost: f64,
}

/// Deduplicated batches ready for upsert, keyed for last-write-wins
#[derive(Debug, Default, PartialEq)]
pub struct ShippingBatches {
    /// Union of all from- and to-locations seen
    pub locations: BTreeSet<String>,
    pub routes: BTreeMap<(String, String), ShippingRoute>,
}

/// Result of decoding one shipping grid
#[derive(Debug)]
pub struct ParsedShipping {
    pub records: Vec<ShippingRecord>,
    pub batches: ShippingBatches,
}

/// Decode a shipping cost matrix into deduplicated batches.
///
/// Pure: no storage side effects. Fewer than 2 rows is `Empty`; blank
/// "to" cells skip the row, unparsable costs skip the cell with a warning.
pub fn parse_shipping_grid(grid: &[Vec<String>]) -> SheetOutcome<ParsedShipping> {
    if grid.len() < 2 {
        return SheetOutcome::Empty;
    }

    // Blank header cells are dropped, so costs align with the parsed list
    let from_locations: Vec<String> = grid[0]
        .iter()
        .skip(1)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    let mut warnings = Vec::new();
    let mut batches = ShippingBatches::default();
    let mut records = Vec::new();

    batches.locations.extend(from_locations.iter().cloned());

    for row in &grid[1..] {
        let to_location = match row.first() {
            Some(cell) => cell.trim(),
            None => continue,
        };
        if to_location.is_empty() {
            continue;
        }
        batches.locations.insert(to_location.to_string());

        let cols = row.len().min(from_locations.len() + 1);
        for col in 1..cols {
            let from_location = &from_locations[col - 1];
            let cost_str = row[col].trim();
            if cost_str.is_empty() {
                continue;
            }

            let cost: f64 = match cost_str.parse() {
                Ok(c) => c,
                Err(_) => {
                    warnings.push(ParseWarning::BadCost {
                        from: from_location.clone(),
                        to: to_location.to_string(),
                        raw: cost_str.to_string(),
                    });
                    continue;
                }
            };

            batches.routes.insert(
                (from_location.clone(), to_location.to_string()),
                ShippingRoute {
                    from_location: from_location.clone(),
                    to_location: to_location.to_string(),
                    cost,
                },
            );
            records.push(ShippingRecord {
                from_location: from_location.clone(),
                to_location: to_location.to_string(),
                cost,
            });
        }
    }

    SheetOutcome::Parsed {
        data: ParsedShipping { records, batches },
        warnings,
    }
}

/// Upsert the decoded batches in foreign-key order:
/// locations, then shipping routes.
pub fn apply_shipping_batches(conn: &mut Connection, batches: &ShippingBatches) -> Result<()> {
    database::batch_upsert_locations(conn, &batches.locations)?;
    let routes: Vec<ShippingRoute> = batches.routes.values().cloned().collect();
    database::batch_upsert_shipping(conn, &routes)?;
    Ok(())
}

/// Decode a shipping grid and apply it to the database
pub fn sync_shipping_grid(conn: &mut Connection, grid: &[Vec<String>]) -> SheetOutcome<ParsedShipping> {
    match parse_shipping_grid(grid) {
        SheetOutcome::Parsed { data, warnings } => {
            for warning in &warnings {
                log::warn!("Shipping sheet: {}", warning);
            }
            match apply_shipping_batches(conn, &data.batches) {
                Ok(()) => {
                    log::info!("Processed {} shipping routes", data.records.len());
                    SheetOutcome::Parsed { data, warnings }
                }
                Err(e) => SheetOutcome::Failed(e),
            }
        }
        SheetOutcome::Empty => {
            log::info!("Shipping sheet has no data rows, nothing to sync");
            SheetOutcome::Empty
        }
        other => other,
    }
}
