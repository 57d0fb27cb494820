//! Stored configuration and interactive setup
//!
//! All settings live in the database settings table, so the daemon is
//! self-contained: missing values are prompted for interactively and
//! persisted on success instead of crashing the scheduler.

use crate::database;
use crate::error::{Result, SyncError};
use crate::fio::FioClient;
use rusqlite::Connection;
use std::io::{self, BufRead, Write};

pub const SETTING_SHEETS_ID: &str = "google_sheets_id";
pub const SETTING_PRICES_SHEET: &str = "google_prices_sheet";
pub const SETTING_SHIPPING_SHEET: &str = "google_shipping_sheet";
pub const SETTING_GOOGLE_API_KEY: &str = "google_api_key";
pub const SETTING_FIO_API_KEY: &str = "fio_api_key";
pub const SETTING_FIO_USERNAME: &str = "fio_username";

pub const DEFAULT_PRICES_SHEET: &str = "Prices";
pub const DEFAULT_SHIPPING_SHEET: &str = "Shipping";

/// Everything the daemon persists between runs
#[derive(Debug, Clone, Default)]
pub struct StoredSettings {
    pub spreadsheet_id: Option<String>,
    pub prices_sheet: Option<String>,
    pub shipping_sheet: Option<String>,
    pub google_api_key: Option<String>,
    pub fio_api_key: Option<String>,
    pub fio_username: Option<String>,
}

/// Load stored settings. Read failures degrade to unset values with a
/// warning; they never abort a sync pass.
pub fn load_settings(conn: &Connection) -> StoredSettings {
    StoredSettings {
        spreadsheet_id: get_string_setting(conn, SETTING_SHEETS_ID),
        prices_sheet: get_string_setting(conn, SETTING_PRICES_SHEET),
        shipping_sheet: get_string_setting(conn, SETTING_SHIPPING_SHEET),
        google_api_key: get_string_setting(conn, SETTING_GOOGLE_API_KEY),
        fio_api_key: get_string_setting(conn, SETTING_FIO_API_KEY),
        fio_username: get_string_setting(conn, SETTING_FIO_USERNAME),
    }
}

fn get_string_setting(conn: &Connection, name: &str) -> Option<String> {
    match database::get_setting(conn, name) {
        Ok(Some(bytes)) => String::from_utf8(bytes)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        Ok(None) => None,
        Err(e) => {
            log::warn!("Could not load setting {}: {}", name, e);
            None
        }
    }
}

/// Persist the spreadsheet settings in one go
pub fn save_sheet_settings(
    conn: &Connection,
    spreadsheet_id: &str,
    api_key: &str,
    prices_sheet: &str,
    shipping_sheet: &str,
) -> Result<()> {
    database::upsert_setting(conn, SETTING_SHEETS_ID, spreadsheet_id.as_bytes())?;
    database::upsert_setting(conn, SETTING_GOOGLE_API_KEY, api_key.as_bytes())?;
    database::upsert_setting(conn, SETTING_PRICES_SHEET, prices_sheet.as_bytes())?;
    database::upsert_setting(conn, SETTING_SHIPPING_SHEET, shipping_sheet.as_bytes())?;
    log::info!("Settings saved to database");
    Ok(())
}

/// Prompt on stdout/stdin; an empty answer takes the bracketed default
pub fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(d) if !d.is_empty() => print!("{} [{}]: ", label, d),
        _ => print!("{}: ", label),
    }
    io::stdout()
        .flush()
        .map_err(|e| SyncError::Config(format!("could not write prompt: {}", e)))?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| SyncError::Config(format!("could not read input: {}", e)))?;

    let entered = line.trim();
    if entered.is_empty() {
        Ok(default.unwrap_or("").to_string())
    } else {
        Ok(entered.to_string())
    }
}

/// Spreadsheet settings a sync pass needs
#[derive(Debug, Clone)]
pub struct SheetSettings {
    pub spreadsheet_id: String,
    pub api_key: String,
    pub prices_sheet: String,
    pub shipping_sheet: String,
}

/// Resolve the spreadsheet settings, prompting for anything missing and
/// persisting newly entered values. Fails only when the user provides no
/// spreadsheet id or API key at all.
pub fn ensure_sheet_settings(conn: &Connection) -> Result<SheetSettings> {
    let stored = load_settings(conn);
    let mut entered_new = false;

    let spreadsheet_id = match stored.spreadsheet_id {
        Some(id) => {
            log::info!("Using stored spreadsheet id {}", truncate_id(&id));
            id
        }
        None => {
            log::info!("No spreadsheet id configured");
            let id = prompt("Enter your Google Sheets id", None)?;
            if id.is_empty() {
                return Err(SyncError::Config("no spreadsheet id provided".to_string()));
            }
            entered_new = true;
            id
        }
    };

    let api_key = match stored.google_api_key {
        Some(key) => key,
        None => {
            let key = prompt("Enter your Google API key", None)?;
            if key.is_empty() {
                return Err(SyncError::Config("no Google API key provided".to_string()));
            }
            entered_new = true;
            key
        }
    };

    let (prices_sheet, shipping_sheet) = match (stored.prices_sheet, stored.shipping_sheet) {
        (Some(prices), Some(shipping)) => {
            log::info!(
                "Using stored sheet names: prices='{}', shipping='{}'",
                prices,
                shipping
            );
            (prices, shipping)
        }
        (prices, shipping) => {
            let prices = prompt(
                "Prices sheet name",
                Some(prices.as_deref().unwrap_or(DEFAULT_PRICES_SHEET)),
            )?;
            let shipping = prompt(
                "Shipping sheet name",
                Some(shipping.as_deref().unwrap_or(DEFAULT_SHIPPING_SHEET)),
            )?;
            entered_new = true;
            (prices, shipping)
        }
    };

    if entered_new {
        save_sheet_settings(conn, &spreadsheet_id, &api_key, &prices_sheet, &shipping_sheet)?;
    }

    Ok(SheetSettings {
        spreadsheet_id,
        api_key,
        prices_sheet,
        shipping_sheet,
    })
}

/// Interactive setup: show current values, prompt with keep-current
/// defaults, validate the FIO key, and offer a test sync.
pub async fn run_setup(conn: &mut Connection) -> Result<()> {
    println!("Setup mode");
    println!("{}", "=".repeat(50));

    let stored = load_settings(conn);
    println!("Current settings:");
    println!(
        "  Spreadsheet id: {}",
        stored
            .spreadsheet_id
            .as_deref()
            .map_or_else(|| "not set".to_string(), truncate_id)
    );
    println!(
        "  Prices sheet:   {}",
        stored.prices_sheet.as_deref().unwrap_or("not set")
    );
    println!(
        "  Shipping sheet: {}",
        stored.shipping_sheet.as_deref().unwrap_or("not set")
    );
    println!(
        "  FIO username:   {}",
        stored.fio_username.as_deref().unwrap_or("not set")
    );
    println!();

    let spreadsheet_id = prompt("Google Sheets id", stored.spreadsheet_id.as_deref())?;
    if spreadsheet_id.is_empty() {
        println!("No spreadsheet id provided, settings not updated.");
        return Ok(());
    }
    let api_key = prompt("Google API key", stored.google_api_key.as_deref())?;
    if api_key.is_empty() {
        println!("No Google API key provided, settings not updated.");
        return Ok(());
    }
    let prices_sheet = prompt(
        "Prices sheet name",
        Some(stored.prices_sheet.as_deref().unwrap_or(DEFAULT_PRICES_SHEET)),
    )?;
    let shipping_sheet = prompt(
        "Shipping sheet name",
        Some(
            stored
                .shipping_sheet
                .as_deref()
                .unwrap_or(DEFAULT_SHIPPING_SHEET),
        ),
    )?;
    save_sheet_settings(conn, &spreadsheet_id, &api_key, &prices_sheet, &shipping_sheet)?;

    // FIO is optional; an empty answer leaves it unconfigured
    let fio_key = prompt(
        "FIO API key (empty to skip)",
        stored.fio_api_key.as_deref(),
    )?;
    if !fio_key.is_empty() {
        let client = FioClient::new(fio_key.clone());
        match client.auth().await {
            Ok(username) => {
                println!("Authenticated with FIO as {}", username);
                database::upsert_setting(conn, SETTING_FIO_API_KEY, fio_key.as_bytes())?;
                let fio_username = prompt(
                    "FIO username to sync",
                    Some(stored.fio_username.as_deref().unwrap_or(&username)),
                )?;
                database::upsert_setting(conn, SETTING_FIO_USERNAME, fio_username.as_bytes())?;
            }
            Err(e) => println!("FIO key rejected ({}), FIO sync not configured.", e),
        }
    }

    println!("Settings updated.");
    let answer = prompt("Test sync with these settings? (y/N)", None)?;
    if answer.eq_ignore_ascii_case("y") {
        match crate::sync::perform_sync(conn).await {
            Ok(report) => println!("Test sync succeeded: {}", report),
            Err(e) => println!("Test sync failed: {}", e),
        }
    }
    Ok(())
}

/// First 10 characters of a spreadsheet id, for log lines
fn truncate_id(id: &str) -> String {
    let prefix: String = id.chars().take(10).collect();
    if prefix.len() < id.len() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}
