//! One full sync pass: spreadsheet data first, then FIO inventory and
//! production for the configured player.
//!
//! The sources are independent failure domains - a FIO outage never
//! discards the sheet results, and vice versa only the spreadsheet open
//! itself is fatal to the pass.

use crate::config;
use crate::error::Result;
use crate::fio::{self, FioClient, InventorySummary, ProductionSummary};
use crate::sheets::{self, PricesConfig, SheetsClient};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::fmt;

/// Human-readable outcome of one sync pass
#[derive(Debug, Default)]
pub struct SyncReport {
    pub price_records: usize,
    pub shipping_records: usize,
    pub last_updated: Option<NaiveDate>,
    pub sheet_failures: usize,
    pub inventory: Option<InventorySummary>,
    pub production: Option<ProductionSummary>,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} price records, {} shipping routes",
            self.price_records, self.shipping_records
        )?;
        if let Some(date) = self.last_updated {
            write!(f, ", prices last updated {}", date)?;
        }
        if let Some(inv) = &self.inventory {
            write!(f, ", {} containers / {} inventory items", inv.containers, inv.items)?;
        }
        if let Some(prod) = &self.production {
            write!(f, ", {} facilities / {} orders", prod.facilities, prod.orders)?;
        }
        if self.sheet_failures > 0 {
            write!(f, " ({} sheet(s) failed)", self.sheet_failures)?;
        }
        Ok(())
    }
}

/// Run one complete sync pass against the configured sources
pub async fn perform_sync(conn: &mut Connection) -> Result<SyncReport> {
    let sheet_settings = config::ensure_sheet_settings(conn)?;
    let client = SheetsClient::new(sheet_settings.api_key.clone());

    let result = sheets::sync_spreadsheet_data(
        &client,
        conn,
        &sheet_settings.spreadsheet_id,
        &sheet_settings.prices_sheet,
        &sheet_settings.shipping_sheet,
        &PricesConfig::default(),
    )
    .await?;

    let mut report = SyncReport {
        last_updated: result.last_updated,
        ..SyncReport::default()
    };
    if let Some(parsed) = result.prices.parsed() {
        report.price_records = parsed.records.len();
    }
    if let Some(parsed) = result.shipping.parsed() {
        report.shipping_records = parsed.records.len();
    }
    report.sheet_failures = usize::from(result.prices.is_failed())
        + usize::from(result.shipping.is_failed());

    log::info!(
        "Sheet sync done: {} price records, {} shipping routes",
        report.price_records,
        report.shipping_records
    );
    if let Some(date) = report.last_updated {
        log::info!("Prices last updated: {}", date);
    }

    // FIO passes run only when configured; their failures are reported
    // per source without touching the sheet results
    let settings = config::load_settings(conn);
    match (settings.fio_api_key, settings.fio_username) {
        (Some(api_key), Some(username)) => {
            let fio = FioClient::new(api_key);
            match fio::sync_user_inventory(&fio, conn, &username).await {
                Ok(summary) => report.inventory = Some(summary),
                Err(e) => log::error!("Inventory sync failed for {}: {}", username, e),
            }
            match fio::sync_user_production(&fio, conn, &username).await {
                Ok(summary) => report.production = Some(summary),
                Err(e) => log::error!("Production sync failed for {}: {}", username, e),
            }
        }
        _ => log::info!("FIO not configured, skipping inventory and production sync"),
    }

    Ok(report)
}
