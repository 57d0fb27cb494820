//! Google Sheets client and the sheet-to-relational transcoders
//!
//! The community price sheet is a human-maintained grid; the submodules
//! decode it into deduplicated batches and apply them in foreign-key order.

mod prices;
mod shipping;

pub use prices::{ParsedPrices, PriceBatches, PriceRecord, PricesConfig, DEFAULT_PRICE_COLUMN};
pub use shipping::{ParsedShipping, ShippingBatches, ShippingRecord};

use crate::error::{Result, SyncError};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// One worksheet's visible values: ragged rows of cells
pub type Grid = Vec<Vec<String>>;

/// A recoverable problem found while decoding a grid.
///
/// Warnings never abort a sheet; the offending cell or row pair is skipped
/// and the rest of the grid is processed.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseWarning {
    /// The metadata cell did not contain a parsable date
    UnparsableDate { cell: String },
    /// An identity/value row pair disagreed on column count
    ColumnMismatch {
        ticker: String,
        identity_cols: usize,
        value_cols: usize,
    },
    /// A price cell could not be parsed as a decimal
    BadPrice {
        ticker: String,
        location: String,
        raw: String,
    },
    /// A shipping cost cell could not be parsed as a decimal
    BadCost {
        from: String,
        to: String,
        raw: String,
    },
    /// A ticker ended up with zero or multiple default-marked prices
    DefaultCount { ticker: String, defaults: usize },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::UnparsableDate { cell } => {
                write!(f, "could not parse a date from {:?}", cell)
            }
            ParseWarning::ColumnMismatch {
                ticker,
                identity_cols,
                value_cols,
            } => write!(
                f,
                "{}: identity row has {} columns but value row has {}, pair skipped",
                ticker, identity_cols, value_cols
            ),
            ParseWarning::BadPrice {
                ticker,
                location,
                raw,
            } => write!(f, "invalid price {:?} for {} at {}", raw, ticker, location),
            ParseWarning::BadCost { from, to, raw } => {
                write!(f, "invalid cost {:?} for {} -> {}", raw, from, to)
            }
            ParseWarning::DefaultCount { ticker, defaults } => write!(
                f,
                "{}: {} prices marked default (expected exactly 1)",
                ticker, defaults
            ),
        }
    }
}

/// Outcome of processing one sheet.
///
/// Distinguishes "nothing to sync" from "parsed (possibly with skipped
/// cells)" from "failed outright", so callers don't have to read logs to
/// tell them apart. None of the variants crash the caller.
#[derive(Debug)]
pub enum SheetOutcome<T> {
    /// Too few rows to carry any data; not an error
    Empty,
    /// Sheet decoded and applied; warnings list every skipped cell/pair
    Parsed { data: T, warnings: Vec<ParseWarning> },
    /// Fetch, decode, or storage failed for this sheet
    Failed(SyncError),
}

impl<T> SheetOutcome<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, SheetOutcome::Empty)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SheetOutcome::Failed(_))
    }

    /// The parsed payload, if any
    pub fn parsed(&self) -> Option<&T> {
        match self {
            SheetOutcome::Parsed { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Warnings collected while parsing (empty unless `Parsed`)
    pub fn warnings(&self) -> &[ParseWarning] {
        match self {
            SheetOutcome::Parsed { warnings, .. } => warnings,
            _ => &[],
        }
    }
}

// ── Google Sheets API v4 client ────────────────────────────────────────────

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

/// Spreadsheet handle: title plus the worksheet titles it contains
#[derive(Debug, Clone)]
pub struct Spreadsheet {
    pub title: String,
    worksheets: Vec<String>,
}

impl Spreadsheet {
    pub fn has_worksheet(&self, title: &str) -> bool {
        self.worksheets.iter().any(|t| t == title)
    }

    pub fn worksheet_titles(&self) -> &[String] {
        &self.worksheets
    }
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    properties: Option<SheetProperties>,
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: Option<SheetProperties>,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: Option<String>,
}

/// `values` response for one worksheet; absent when the sheet is empty
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Google Sheets API v4 client (API-key auth)
pub struct SheetsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SheetsClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, SHEETS_API_BASE)
    }

    /// Client against a custom endpoint (used by tests)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Open a spreadsheet by id, returning its title and worksheet titles
    pub async fn open(&self, spreadsheet_id: &str) -> Result<Spreadsheet> {
        let url = format!(
            "{}/v4/spreadsheets/{}?key={}&fields=properties.title,sheets.properties.title",
            self.base_url,
            urlencoding::encode(spreadsheet_id),
            self.api_key
        );
        let response = self
            .client
            .get(&url)
            .header("User-Agent", "prun_sync/1.0")
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::SpreadsheetOpen(format!(
                "{} (HTTP {})",
                spreadsheet_id,
                response.status()
            )));
        }

        let meta: SpreadsheetMeta = response.json().await?;
        Ok(Spreadsheet {
            title: meta
                .properties
                .and_then(|p| p.title)
                .unwrap_or_else(|| spreadsheet_id.to_string()),
            worksheets: meta
                .sheets
                .into_iter()
                .filter_map(|s| s.properties.and_then(|p| p.title))
                .collect(),
        })
    }

    /// Fetch all visible values of a named worksheet as a ragged string grid
    pub async fn get_all_values(
        &self,
        spreadsheet_id: &str,
        spreadsheet: &Spreadsheet,
        worksheet: &str,
    ) -> Result<Grid> {
        if !spreadsheet.has_worksheet(worksheet) {
            return Err(SyncError::WorksheetNotFound(worksheet.to_string()));
        }

        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}?key={}",
            self.base_url,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(worksheet),
            self.api_key
        );
        let response = self
            .client
            .get(&url)
            .header("User-Agent", "prun_sync/1.0")
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }

        let range: ValueRange = response.json().await?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }
}

// ── Two-sheet orchestrator ─────────────────────────────────────────────────

/// Aggregate result of one spreadsheet sync pass
#[derive(Debug)]
pub struct SheetSyncResult {
    pub spreadsheet_title: String,
    pub last_updated: Option<NaiveDate>,
    pub prices: SheetOutcome<ParsedPrices>,
    pub shipping: SheetOutcome<ParsedShipping>,
}

/// Sync both worksheets of a spreadsheet into the database.
///
/// The two sheets are independent failure domains: a fetch/decode/storage
/// problem on one is recorded in its outcome and does not block the other.
/// Only a failure to open the spreadsheet itself is returned as an error.
/// Deliberately non-transactional - partial success is reported, not rolled
/// back.
pub async fn sync_spreadsheet_data(
    client: &SheetsClient,
    conn: &mut Connection,
    spreadsheet_id: &str,
    prices_sheet: &str,
    shipping_sheet: &str,
    config: &PricesConfig,
) -> Result<SheetSyncResult> {
    log::info!("Starting sync for spreadsheet {}", spreadsheet_id);
    let spreadsheet = client.open(spreadsheet_id).await?;
    log::info!("Opened spreadsheet: {}", spreadsheet.title);

    let prices = match client
        .get_all_values(spreadsheet_id, &spreadsheet, prices_sheet)
        .await
    {
        Ok(grid) => prices::sync_prices_grid(conn, &grid, config),
        Err(e) => {
            log::warn!("Could not process {} sheet: {}", prices_sheet, e);
            SheetOutcome::Failed(e)
        }
    };

    let shipping = match client
        .get_all_values(spreadsheet_id, &spreadsheet, shipping_sheet)
        .await
    {
        Ok(grid) => shipping::sync_shipping_grid(conn, &grid),
        Err(e) => {
            log::warn!("Could not process {} sheet: {}", shipping_sheet, e);
            SheetOutcome::Failed(e)
        }
    };

    let last_updated = match &prices {
        SheetOutcome::Parsed { data, .. } => data.last_updated,
        _ => None,
    };

    Ok(SheetSyncResult {
        spreadsheet_title: spreadsheet.title,
        last_updated,
        prices,
        shipping,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_schema;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn value_range_handles_mixed_cell_types_and_missing_values() {
        let json = r#"{
            "range": "Prices!A1:E4",
            "majorDimension": "ROWS",
            "values": [["Updated", "", 12.5, 7, true], ["x"]]
        }"#;
        let range: ValueRange = serde_json::from_str(json).unwrap();
        let grid: Grid = range
            .values
            .iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        assert_eq!(grid[0], vec!["Updated", "", "12.5", "7", "true"]);
        assert_eq!(grid[1], vec!["x"]);

        let empty: ValueRange = serde_json::from_str(r#"{"range": "Empty!A1"}"#).unwrap();
        assert!(empty.values.is_empty());
    }

    fn metadata_json(worksheets: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "properties": { "title": "PrUn Community Prices" },
            "sheets": worksheets
                .iter()
                .map(|t| serde_json::json!({ "properties": { "title": t } }))
                .collect::<Vec<_>>(),
        })
    }

    #[tokio::test]
    async fn open_lists_worksheets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(metadata_json(&["Prices", "Shipping"])),
            )
            .mount(&server)
            .await;

        let client = SheetsClient::with_base_url("test-key", server.uri());
        let spreadsheet = client.open("sheet-1").await.unwrap();
        assert_eq!(spreadsheet.title, "PrUn Community Prices");
        assert!(spreadsheet.has_worksheet("Prices"));
        assert!(spreadsheet.has_worksheet("Shipping"));
        assert!(!spreadsheet.has_worksheet("Other"));
    }

    #[tokio::test]
    async fn open_maps_http_error_to_spreadsheet_open() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = SheetsClient::with_base_url("test-key", server.uri());
        match client.open("missing").await {
            Err(SyncError::SpreadsheetOpen(msg)) => assert!(msg.contains("404")),
            other => panic!("expected SpreadsheetOpen, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn get_all_values_rejects_unknown_worksheet() {
        let client = SheetsClient::with_base_url("test-key", "http://unused.invalid");
        let spreadsheet = Spreadsheet {
            title: "T".to_string(),
            worksheets: vec!["Prices".to_string()],
        };
        match client.get_all_values("sheet-1", &spreadsheet, "Shipping").await {
            Err(SyncError::WorksheetNotFound(name)) => assert_eq!(name, "Shipping"),
            other => panic!("expected WorksheetNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn sync_survives_missing_shipping_sheet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata_json(&["Prices"])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values/Prices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [
                    ["", "", "", "Updated 2023-Feb-19"],
                    ["Category", "Ticker", "Name", "Locations"],
                    ["Minerals", "FEO", "Iron Ore", "Moria", "Benten"],
                    ["", "", "", "10.5", 12.0],
                ]
            })))
            .mount(&server)
            .await;

        let client = SheetsClient::with_base_url("test-key", server.uri());
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let result = sync_spreadsheet_data(
            &client,
            &mut conn,
            "sheet-1",
            "Prices",
            "Shipping",
            &PricesConfig::default(),
        )
        .await
        .unwrap();

        let parsed = result.prices.parsed().expect("prices should parse");
        assert_eq!(parsed.records.len(), 2);
        assert!(result.prices.warnings().is_empty());
        assert!(result.shipping.is_failed());
        assert_eq!(
            result.last_updated,
            NaiveDate::from_ymd_opt(2023, 2, 19)
        );
    }
}
