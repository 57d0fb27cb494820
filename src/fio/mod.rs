//! FIO REST API client (rest.fnar.net)
//!
//! FIO is the community data API for Prosperous Universe. All payloads use
//! PascalCase keys; authentication is an API key in the Authorization
//! header.

mod inventory;
mod production;

pub use inventory::{sync_user_inventory, InventorySummary};
pub use production::{sync_user_production, ProductionSummary};

use crate::error::{Result, SyncError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const FIO_API_BASE: &str = "https://rest.fnar.net";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ── Payload types ──────────────────────────────────────────────────────────

/// One storage container (base store, warehouse, or ship hold)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageContainer {
    pub storage_id: String,
    pub addressable_id: String,
    pub name: Option<String>,
    #[serde(rename = "Type")]
    pub storage_type: String,
    #[serde(default)]
    pub weight_capacity: f64,
    #[serde(default)]
    pub weight_load: f64,
    #[serde(default)]
    pub volume_capacity: f64,
    #[serde(default)]
    pub volume_load: f64,
    #[serde(default)]
    pub fixed_store: bool,
    #[serde(default)]
    pub storage_items: Vec<StorageItem>,
}

/// One material stack inside a storage container
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageItem {
    pub material_id: Option<String>,
    pub material_ticker: Option<String>,
    pub material_name: Option<String>,
    pub material_category: Option<String>,
    pub material_amount: Option<i64>,
    pub material_weight: Option<f64>,
    pub material_volume: Option<f64>,
    pub total_weight: Option<f64>,
    pub total_volume: Option<f64>,
    pub material_value: Option<f64>,
    pub material_value_currency: Option<String>,
}

/// One player base on a planet
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Site {
    pub site_id: Option<String>,
    pub planet_identifier: Option<String>,
    pub planet_name: Option<String>,
    pub planet_founded_epoch_ms: Option<i64>,
    pub invested_permits: Option<i64>,
    pub maximum_permits: Option<i64>,
}

/// The sites endpoint returns a bare object for a single site and an
/// array otherwise
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SiteResponse {
    Many(Vec<Site>),
    One(Site),
}

impl SiteResponse {
    fn into_vec(self) -> Vec<Site> {
        match self {
            SiteResponse::Many(sites) => sites,
            SiteResponse::One(site) => vec![site],
        }
    }
}

/// One production line with its current orders
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductionLine {
    pub production_line_id: String,
    pub site_id: Option<String>,
    pub planet_id: Option<String>,
    pub planet_natural_id: Option<String>,
    pub planet_name: Option<String>,
    #[serde(rename = "Type")]
    pub facility_type: Option<String>,
    pub capacity: Option<i64>,
    pub efficiency: Option<f64>,
    pub condition: Option<f64>,
    #[serde(default)]
    pub orders: Vec<ProductionOrder>,
}

/// One order queued or running on a production line
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductionOrder {
    pub production_line_order_id: String,
    pub created_epoch_ms: Option<i64>,
    pub started_epoch_ms: Option<i64>,
    pub completion_epoch_ms: Option<i64>,
    pub duration_ms: Option<i64>,
    pub last_updated_epoch_ms: Option<i64>,
    pub completed_percentage: Option<f64>,
    #[serde(default)]
    pub is_halted: bool,
    #[serde(default)]
    pub recurring: bool,
    pub standard_recipe_name: Option<String>,
    pub production_fee: Option<f64>,
    pub production_fee_currency: Option<String>,
    #[serde(default)]
    pub inputs: Vec<OrderMaterial>,
    #[serde(default)]
    pub outputs: Vec<OrderMaterial>,
}

/// One material consumed or produced by an order
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderMaterial {
    pub material_id: Option<String>,
    pub material_ticker: Option<String>,
    pub material_name: Option<String>,
    pub material_category: Option<String>,
    pub amount: Option<i64>,
}

// ── Client ─────────────────────────────────────────────────────────────────

/// FIO REST API client
pub struct FioClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl FioClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, FIO_API_BASE)
    }

    /// Client against a custom endpoint (used by tests)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", &self.api_key)
            .header("User-Agent", "prun_sync/1.0")
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(path).send().await?;
        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }
        Ok(response.json().await?)
    }

    /// Validate the API key; returns the authenticated username.
    /// An invalid key surfaces as `HttpStatus(401)`.
    pub async fn auth(&self) -> Result<String> {
        let response = self.request("/auth").send().await?;
        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }
        Ok(response.text().await?.trim().to_string())
    }

    /// All storage containers of a user, with their contents
    pub async fn storage(&self, username: &str) -> Result<Vec<StorageContainer>> {
        self.get_json(&format!("/storage/{}", urlencoding::encode(username)))
            .await
    }

    /// Ids of the planets where a user has sites
    pub async fn sites_planets(&self, username: &str) -> Result<Vec<String>> {
        self.get_json(&format!(
            "/sites/planets/{}",
            urlencoding::encode(username)
        ))
        .await
    }

    /// Sites of a user on one planet (id, natural id, or name)
    pub async fn sites(&self, username: &str, planet: &str) -> Result<Vec<Site>> {
        let response: SiteResponse = self
            .get_json(&format!(
                "/sites/{}/{}",
                urlencoding::encode(username),
                urlencoding::encode(planet)
            ))
            .await?;
        Ok(response.into_vec())
    }

    /// Production lines of a user, with nested orders and materials
    pub async fn production(&self, username: &str) -> Result<Vec<ProductionLine>> {
        self.get_json(&format!("/production/{}", urlencoding::encode(username)))
            .await
    }
}
