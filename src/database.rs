//! Database operations for prun_sync
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! Batch writes are transactional; each batch call commits independently,
//! so referential integrity is preserved by call order, not by a spanning
//! transaction: locations before items before prices, locations before
//! shipping routes.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeSet;

/// Result type for database operations
pub type DbResult<T> = rusqlite::Result<T>;

/// Initialize the database schema
///
/// Creates all tables if they don't exist and enables foreign key
/// enforcement for this connection. Safe to call on every startup.
pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        -- Persisted key/value configuration
        CREATE TABLE IF NOT EXISTS settings (
            setting_name TEXT PRIMARY KEY,
            setting_value BLOB NOT NULL
        );

        -- Trading locations (commodity exchanges, planets)
        CREATE TABLE IF NOT EXISTS locations (
            id INTEGER PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Tradeable materials, keyed by ticker
        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY,
            ticker TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            category TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- One price per (ticker, location); the default price carries
        -- is_default = 1 and is the location-less fallback
        CREATE TABLE IF NOT EXISTS prices (
            id INTEGER PRIMARY KEY,
            ticker TEXT NOT NULL REFERENCES items(ticker) ON UPDATE CASCADE,
            location TEXT NOT NULL REFERENCES locations(name) ON UPDATE CASCADE,
            price REAL NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            last_updated TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (ticker, location)
        );

        CREATE INDEX IF NOT EXISTS idx_prices_ticker ON prices(ticker);

        -- Directional shipping costs: (A -> B) independent of (B -> A)
        CREATE TABLE IF NOT EXISTS shipping (
            id INTEGER PRIMARY KEY,
            from_location TEXT NOT NULL REFERENCES locations(name) ON UPDATE CASCADE,
            to_location TEXT NOT NULL REFERENCES locations(name) ON UPDATE CASCADE,
            cost REAL NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (from_location, to_location)
        );

        -- FIO: players whose data we sync
        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- FIO: planets, keyed by the API's planet id
        CREATE TABLE IF NOT EXISTS planets (
            id TEXT PRIMARY KEY,
            identifier TEXT,
            name TEXT NOT NULL,
            founded_epoch_ms INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- FIO: player bases on planets
        CREATE TABLE IF NOT EXISTS sites (
            id TEXT PRIMARY KEY,
            planet_id TEXT REFERENCES planets(id) ON UPDATE CASCADE,
            username TEXT NOT NULL REFERENCES players(username) ON UPDATE CASCADE,
            invested_permits INTEGER NOT NULL DEFAULT 0,
            maximum_permits INTEGER NOT NULL DEFAULT 3,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- FIO: ships, keyed by their addressable (location) id
        CREATE TABLE IF NOT EXISTS ships (
            addressable_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            username TEXT NOT NULL REFERENCES players(username) ON UPDATE CASCADE,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- FIO: storage containers (base stores, warehouses, ship holds)
        CREATE TABLE IF NOT EXISTS storage_containers (
            storage_id TEXT PRIMARY KEY,
            addressable_id TEXT,
            username TEXT NOT NULL REFERENCES players(username) ON UPDATE CASCADE,
            container_name TEXT,
            storage_type TEXT NOT NULL CHECK (storage_type IN
                ('FTL_FUEL_STORE', 'STL_FUEL_STORE', 'SHIP_STORE', 'WAREHOUSE_STORE', 'STORE')),
            weight_capacity REAL NOT NULL DEFAULT 0,
            weight_load REAL NOT NULL DEFAULT 0,
            volume_capacity REAL NOT NULL DEFAULT 0,
            volume_load REAL NOT NULL DEFAULT 0,
            fixed_store INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- FIO: container contents; fully replaced per container on resync
        CREATE TABLE IF NOT EXISTS inventory_items (
            id INTEGER PRIMARY KEY,
            storage_id TEXT NOT NULL REFERENCES storage_containers(storage_id) ON DELETE CASCADE,
            material_id TEXT NOT NULL,
            material_ticker TEXT NOT NULL REFERENCES items(ticker) ON UPDATE CASCADE,
            material_name TEXT NOT NULL,
            material_category TEXT,
            amount INTEGER NOT NULL DEFAULT 0,
            material_weight REAL NOT NULL DEFAULT 0,
            material_volume REAL NOT NULL DEFAULT 0,
            total_weight REAL NOT NULL DEFAULT 0,
            total_volume REAL NOT NULL DEFAULT 0,
            material_value REAL NOT NULL DEFAULT 0,
            material_value_currency TEXT NOT NULL DEFAULT 'CIS',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (storage_id, material_id)
        );

        -- FIO: production lines
        CREATE TABLE IF NOT EXISTS production_facilities (
            production_line_id TEXT PRIMARY KEY,
            site_id TEXT REFERENCES sites(id) ON UPDATE CASCADE,
            planet_id TEXT REFERENCES planets(id) ON UPDATE CASCADE,
            planet_natural_id TEXT,
            planet_name TEXT,
            username TEXT NOT NULL REFERENCES players(username) ON UPDATE CASCADE,
            facility_type TEXT,
            capacity INTEGER NOT NULL DEFAULT 0,
            efficiency REAL NOT NULL DEFAULT 0,
            facility_condition REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- FIO: production orders; fully replaced per line on resync
        CREATE TABLE IF NOT EXISTS production_orders (
            order_id TEXT PRIMARY KEY,
            production_line_id TEXT NOT NULL
                REFERENCES production_facilities(production_line_id) ON DELETE CASCADE,
            username TEXT NOT NULL REFERENCES players(username) ON UPDATE CASCADE,
            created_epoch_ms INTEGER,
            started_epoch_ms INTEGER,
            completion_epoch_ms INTEGER,
            duration_ms INTEGER,
            last_updated_epoch_ms INTEGER,
            completed_percentage REAL NOT NULL DEFAULT 0,
            is_halted INTEGER NOT NULL DEFAULT 0,
            recurring INTEGER NOT NULL DEFAULT 0,
            standard_recipe_name TEXT,
            production_fee REAL NOT NULL DEFAULT 0,
            production_fee_currency TEXT NOT NULL DEFAULT 'NCC',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- FIO: materials consumed by an order
        CREATE TABLE IF NOT EXISTS production_order_inputs (
            id INTEGER PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES production_orders(order_id) ON DELETE CASCADE,
            material_id TEXT,
            material_ticker TEXT REFERENCES items(ticker) ON UPDATE CASCADE,
            material_name TEXT,
            amount INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- FIO: materials produced by an order
        CREATE TABLE IF NOT EXISTS production_order_outputs (
            id INTEGER PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES production_orders(order_id) ON DELETE CASCADE,
            material_id TEXT,
            material_ticker TEXT REFERENCES items(ticker) ON UPDATE CASCADE,
            material_name TEXT,
            amount INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

// ── Settings ───────────────────────────────────────────────────────────────

/// Get a persisted setting value, or None if unset
pub fn get_setting(conn: &Connection, name: &str) -> DbResult<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT setting_value FROM settings WHERE setting_name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
}

/// Insert or update a persisted setting
pub fn upsert_setting(conn: &Connection, name: &str, value: &[u8]) -> DbResult<()> {
    conn.execute(
        "INSERT INTO settings (setting_name, setting_value) VALUES (?1, ?2)
         ON CONFLICT(setting_name) DO UPDATE SET setting_value = excluded.setting_value",
        params![name, value],
    )?;
    Ok(())
}

// ── Sheet batch records ────────────────────────────────────────────────────

/// One row of the items batch: ticker is identity, name/category mutable
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub ticker: String,
    pub name: String,
    pub category: Option<String>,
}

/// One row of the prices batch, keyed by (ticker, location)
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub ticker: String,
    pub location: String,
    pub price: f64,
    pub is_default: bool,
    pub last_updated: Option<NaiveDate>,
}

/// One directional shipping route, keyed by (from_location, to_location)
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingRoute {
    pub from_location: String,
    pub to_location: String,
    pub cost: f64,
}

// ── Sheet batch upserts ────────────────────────────────────────────────────

/// Batch insert or update locations. Blank names are skipped.
pub fn batch_upsert_locations(conn: &mut Connection, names: &BTreeSet<String>) -> DbResult<usize> {
    if names.is_empty() {
        return Ok(0);
    }
    let tx = conn.transaction()?;
    let count = batch_upsert_locations_tx(&tx, names)?;
    tx.commit()?;
    if count > 0 {
        log::info!("Batch upserted {} locations", count);
    }
    Ok(count)
}

fn batch_upsert_locations_tx(tx: &Transaction<'_>, names: &BTreeSet<String>) -> DbResult<usize> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO locations (name) VALUES (?1)
         ON CONFLICT(name) DO UPDATE SET updated_at = datetime('now')",
    )?;
    let mut count = 0;
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        stmt.execute(params![name])?;
        count += 1;
    }
    Ok(count)
}

/// Batch insert or update items. Rows with a blank ticker are skipped;
/// duplicate tickers within the slice resolve last-write-wins.
pub fn batch_upsert_items(conn: &mut Connection, items: &[ItemRow]) -> DbResult<usize> {
    if items.is_empty() {
        return Ok(0);
    }
    let tx = conn.transaction()?;
    let count = batch_upsert_items_tx(&tx, items)?;
    tx.commit()?;
    if count > 0 {
        log::info!("Batch upserted {} items", count);
    }
    Ok(count)
}

fn batch_upsert_items_tx(tx: &Transaction<'_>, items: &[ItemRow]) -> DbResult<usize> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO items (ticker, name, category) VALUES (?1, ?2, ?3)
         ON CONFLICT(ticker) DO UPDATE SET
             name = excluded.name,
             category = excluded.category,
             updated_at = datetime('now')",
    )?;
    let mut count = 0;
    for item in items {
        let ticker = item.ticker.trim();
        if ticker.is_empty() {
            continue;
        }
        stmt.execute(params![ticker, item.name.trim(), item.category.as_deref()])?;
        count += 1;
    }
    Ok(count)
}

/// Batch insert or update prices. Rows with a blank ticker or location are
/// skipped; duplicate (ticker, location) keys resolve last-write-wins.
///
/// Referenced items and locations must already exist (call
/// [`batch_upsert_locations`] and [`batch_upsert_items`] first).
pub fn batch_upsert_prices(conn: &mut Connection, prices: &[PriceRow]) -> DbResult<usize> {
    if prices.is_empty() {
        return Ok(0);
    }
    let tx = conn.transaction()?;
    let count = batch_upsert_prices_tx(&tx, prices)?;
    tx.commit()?;
    if count > 0 {
        log::info!("Batch upserted {} prices", count);
    }
    Ok(count)
}

fn batch_upsert_prices_tx(tx: &Transaction<'_>, prices: &[PriceRow]) -> DbResult<usize> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO prices (ticker, location, price, is_default, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(ticker, location) DO UPDATE SET
             price = excluded.price,
             is_default = excluded.is_default,
             last_updated = excluded.last_updated,
             updated_at = datetime('now')",
    )?;
    let mut count = 0;
    for price in prices {
        let ticker = price.ticker.trim();
        let location = price.location.trim();
        if ticker.is_empty() || location.is_empty() {
            continue;
        }
        stmt.execute(params![
            ticker,
            location,
            price.price,
            price.is_default,
            price.last_updated.map(|d| d.format("%Y-%m-%d").to_string()),
        ])?;
        count += 1;
    }
    Ok(count)
}

/// Batch insert or update shipping routes. Routes with a blank endpoint are
/// skipped; duplicate (from, to) keys resolve last-write-wins.
pub fn batch_upsert_shipping(conn: &mut Connection, routes: &[ShippingRoute]) -> DbResult<usize> {
    if routes.is_empty() {
        return Ok(0);
    }
    let tx = conn.transaction()?;
    let count = batch_upsert_shipping_tx(&tx, routes)?;
    tx.commit()?;
    if count > 0 {
        log::info!("Batch upserted {} shipping routes", count);
    }
    Ok(count)
}

fn batch_upsert_shipping_tx(tx: &Transaction<'_>, routes: &[ShippingRoute]) -> DbResult<usize> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO shipping (from_location, to_location, cost) VALUES (?1, ?2, ?3)
         ON CONFLICT(from_location, to_location) DO UPDATE SET
             cost = excluded.cost,
             updated_at = datetime('now')",
    )?;
    let mut count = 0;
    for route in routes {
        let from = route.from_location.trim();
        let to = route.to_location.trim();
        if from.is_empty() || to.is_empty() {
            continue;
        }
        stmt.execute(params![from, to, route.cost])?;
        count += 1;
    }
    Ok(count)
}

// ── Point lookups ──────────────────────────────────────────────────────────

/// Get the price for a ticker.
///
/// With a location, looks up the location-specific price first and falls
/// back to the ticker's default price. Without a location, returns the
/// default price directly. None when neither exists.
pub fn get_price(conn: &Connection, ticker: &str, location: Option<&str>) -> DbResult<Option<f64>> {
    if let Some(location) = location {
        let specific: Option<f64> = conn
            .query_row(
                "SELECT price FROM prices WHERE ticker = ?1 AND location = ?2",
                params![ticker, location],
                |row| row.get(0),
            )
            .optional()?;
        if specific.is_some() {
            return Ok(specific);
        }
    }
    conn.query_row(
        "SELECT price FROM prices WHERE ticker = ?1 AND is_default = 1 LIMIT 1",
        params![ticker],
        |row| row.get(0),
    )
    .optional()
}

/// Get the shipping cost for a directional route
pub fn get_shipping_cost(conn: &Connection, from: &str, to: &str) -> DbResult<Option<f64>> {
    conn.query_row(
        "SELECT cost FROM shipping WHERE from_location = ?1 AND to_location = ?2",
        params![from, to],
        |row| row.get(0),
    )
    .optional()
}

/// Get all items ordered by ticker
pub fn get_all_items(conn: &Connection) -> DbResult<Vec<ItemRow>> {
    let mut stmt = conn.prepare("SELECT ticker, name, category FROM items ORDER BY ticker")?;
    let rows: DbResult<Vec<ItemRow>> = stmt
        .query_map([], |row| {
            Ok(ItemRow {
                ticker: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
            })
        })?
        .collect();
    rows
}

/// Get all location names ordered alphabetically
pub fn get_all_locations(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM locations ORDER BY name")?;
    let rows: DbResult<Vec<String>> = stmt.query_map([], |row| row.get(0))?.collect();
    rows
}

// ── FIO record types ───────────────────────────────────────────────────────

/// One storage container row (base store, warehouse, or ship hold)
#[derive(Debug, Clone)]
pub struct StorageContainerRow {
    pub storage_id: String,
    pub addressable_id: Option<String>,
    pub username: String,
    pub container_name: Option<String>,
    pub storage_type: String,
    pub weight_capacity: f64,
    pub weight_load: f64,
    pub volume_capacity: f64,
    pub volume_load: f64,
    pub fixed_store: bool,
}

/// One inventory item inside a storage container
#[derive(Debug, Clone)]
pub struct InventoryItemRow {
    pub material_id: String,
    pub material_ticker: String,
    pub material_name: String,
    pub material_category: Option<String>,
    pub amount: i64,
    pub material_weight: f64,
    pub material_volume: f64,
    pub total_weight: f64,
    pub total_volume: f64,
    pub material_value: f64,
    pub material_value_currency: String,
}

/// One production line row
#[derive(Debug, Clone)]
pub struct ProductionFacilityRow {
    pub production_line_id: String,
    pub site_id: Option<String>,
    pub planet_id: Option<String>,
    pub planet_natural_id: Option<String>,
    pub planet_name: Option<String>,
    pub username: String,
    pub facility_type: Option<String>,
    pub capacity: i64,
    pub efficiency: f64,
    pub condition: f64,
}

/// One production order row
#[derive(Debug, Clone)]
pub struct ProductionOrderRow {
    pub order_id: String,
    pub production_line_id: String,
    pub username: String,
    pub created_epoch_ms: Option<i64>,
    pub started_epoch_ms: Option<i64>,
    pub completion_epoch_ms: Option<i64>,
    pub duration_ms: Option<i64>,
    pub last_updated_epoch_ms: Option<i64>,
    pub completed_percentage: f64,
    pub is_halted: bool,
    pub recurring: bool,
    pub standard_recipe_name: Option<String>,
    pub production_fee: f64,
    pub production_fee_currency: String,
}

/// One material consumed or produced by a production order
#[derive(Debug, Clone)]
pub struct OrderMaterialRow {
    pub material_id: Option<String>,
    pub material_ticker: Option<String>,
    pub material_name: Option<String>,
    pub amount: i64,
}

// ── FIO upserts ────────────────────────────────────────────────────────────

/// Insert or update a single item (used when FIO payloads reference a
/// material the sheet sync hasn't seen)
pub fn upsert_item(
    conn: &Connection,
    ticker: &str,
    name: &str,
    category: Option<&str>,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO items (ticker, name, category) VALUES (?1, ?2, ?3)
         ON CONFLICT(ticker) DO UPDATE SET
             name = excluded.name,
             category = excluded.category,
             updated_at = datetime('now')",
        params![ticker, name, category],
    )?;
    Ok(())
}

/// Insert or update a player record
pub fn upsert_player(conn: &Connection, username: &str) -> DbResult<()> {
    conn.execute(
        "INSERT INTO players (username) VALUES (?1)
         ON CONFLICT(username) DO UPDATE SET updated_at = datetime('now')",
        params![username],
    )?;
    Ok(())
}

/// Insert or update a planet record
pub fn upsert_planet(
    conn: &Connection,
    planet_id: &str,
    identifier: Option<&str>,
    name: &str,
    founded_epoch_ms: Option<i64>,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO planets (id, identifier, name, founded_epoch_ms)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             identifier = excluded.identifier,
             name = excluded.name,
             founded_epoch_ms = excluded.founded_epoch_ms,
             updated_at = datetime('now')",
        params![planet_id, identifier, name, founded_epoch_ms],
    )?;
    Ok(())
}

/// Insert or update a site record
pub fn upsert_site(
    conn: &Connection,
    site_id: &str,
    planet_id: Option<&str>,
    username: &str,
    invested_permits: i64,
    maximum_permits: i64,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO sites (id, planet_id, username, invested_permits, maximum_permits)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             planet_id = excluded.planet_id,
             invested_permits = excluded.invested_permits,
             maximum_permits = excluded.maximum_permits,
             updated_at = datetime('now')",
        params![site_id, planet_id, username, invested_permits, maximum_permits],
    )?;
    Ok(())
}

/// Insert a site stub if it is not already known. Unlike [`upsert_site`]
/// this never overwrites permit counts recorded by a fuller sync.
pub fn ensure_site(
    conn: &Connection,
    site_id: &str,
    planet_id: Option<&str>,
    username: &str,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO sites (id, planet_id, username) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO NOTHING",
        params![site_id, planet_id, username],
    )?;
    Ok(())
}

/// Insert or update a ship record
pub fn upsert_ship(conn: &Connection, addressable_id: &str, name: &str, username: &str) -> DbResult<()> {
    conn.execute(
        "INSERT INTO ships (addressable_id, name, username) VALUES (?1, ?2, ?3)
         ON CONFLICT(addressable_id) DO UPDATE SET
             name = excluded.name,
             updated_at = datetime('now')",
        params![addressable_id, name, username],
    )?;
    Ok(())
}

/// Insert or update a storage container record
pub fn upsert_storage_container(conn: &Connection, container: &StorageContainerRow) -> DbResult<()> {
    conn.execute(
        "INSERT INTO storage_containers
         (storage_id, addressable_id, username, container_name, storage_type,
          weight_capacity, weight_load, volume_capacity, volume_load, fixed_store)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(storage_id) DO UPDATE SET
             addressable_id = excluded.addressable_id,
             container_name = excluded.container_name,
             storage_type = excluded.storage_type,
             weight_capacity = excluded.weight_capacity,
             weight_load = excluded.weight_load,
             volume_capacity = excluded.volume_capacity,
             volume_load = excluded.volume_load,
             fixed_store = excluded.fixed_store,
             updated_at = datetime('now')",
        params![
            container.storage_id,
            container.addressable_id,
            container.username,
            container.container_name,
            container.storage_type,
            container.weight_capacity,
            container.weight_load,
            container.volume_capacity,
            container.volume_load,
            container.fixed_store,
        ],
    )?;
    Ok(())
}

/// Delete all inventory items of a storage container (resync replaces them)
pub fn clear_inventory_items(conn: &Connection, storage_id: &str) -> DbResult<usize> {
    conn.execute(
        "DELETE FROM inventory_items WHERE storage_id = ?1",
        params![storage_id],
    )
}

/// Insert an inventory item. The referenced item and container must exist.
pub fn insert_inventory_item(
    conn: &Connection,
    storage_id: &str,
    item: &InventoryItemRow,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO inventory_items
         (storage_id, material_id, material_ticker, material_name, material_category,
          amount, material_weight, material_volume, total_weight, total_volume,
          material_value, material_value_currency)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(storage_id, material_id) DO UPDATE SET
             material_ticker = excluded.material_ticker,
             material_name = excluded.material_name,
             material_category = excluded.material_category,
             amount = excluded.amount,
             material_weight = excluded.material_weight,
             material_volume = excluded.material_volume,
             total_weight = excluded.total_weight,
             total_volume = excluded.total_volume,
             material_value = excluded.material_value,
             material_value_currency = excluded.material_value_currency,
             updated_at = datetime('now')",
        params![
            storage_id,
            item.material_id,
            item.material_ticker,
            item.material_name,
            item.material_category,
            item.amount,
            item.material_weight,
            item.material_volume,
            item.total_weight,
            item.total_volume,
            item.material_value,
            item.material_value_currency,
        ],
    )?;
    Ok(())
}

/// Insert or update a production facility record
pub fn upsert_production_facility(
    conn: &Connection,
    facility: &ProductionFacilityRow,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO production_facilities
         (production_line_id, site_id, planet_id, planet_natural_id, planet_name,
          username, facility_type, capacity, efficiency, facility_condition)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(production_line_id) DO UPDATE SET
             site_id = excluded.site_id,
             planet_id = excluded.planet_id,
             planet_natural_id = excluded.planet_natural_id,
             planet_name = excluded.planet_name,
             facility_type = excluded.facility_type,
             capacity = excluded.capacity,
             efficiency = excluded.efficiency,
             facility_condition = excluded.facility_condition,
             updated_at = datetime('now')",
        params![
            facility.production_line_id,
            facility.site_id,
            facility.planet_id,
            facility.planet_natural_id,
            facility.planet_name,
            facility.username,
            facility.facility_type,
            facility.capacity,
            facility.efficiency,
            facility.condition,
        ],
    )?;
    Ok(())
}

/// Delete all orders of a production line; cascades to input/output materials
pub fn clear_production_orders(conn: &Connection, production_line_id: &str) -> DbResult<usize> {
    conn.execute(
        "DELETE FROM production_orders WHERE production_line_id = ?1",
        params![production_line_id],
    )
}

/// Insert or update a production order record
pub fn upsert_production_order(conn: &Connection, order: &ProductionOrderRow) -> DbResult<()> {
    conn.execute(
        "INSERT INTO production_orders
         (order_id, production_line_id, username, created_epoch_ms, started_epoch_ms,
          completion_epoch_ms, duration_ms, last_updated_epoch_ms, completed_percentage,
          is_halted, recurring, standard_recipe_name, production_fee, production_fee_currency)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(order_id) DO UPDATE SET
             created_epoch_ms = excluded.created_epoch_ms,
             started_epoch_ms = excluded.started_epoch_ms,
             completion_epoch_ms = excluded.completion_epoch_ms,
             duration_ms = excluded.duration_ms,
             last_updated_epoch_ms = excluded.last_updated_epoch_ms,
             completed_percentage = excluded.completed_percentage,
             is_halted = excluded.is_halted,
             recurring = excluded.recurring,
             standard_recipe_name = excluded.standard_recipe_name,
             production_fee = excluded.production_fee,
             production_fee_currency = excluded.production_fee_currency,
             updated_at = datetime('now')",
        params![
            order.order_id,
            order.production_line_id,
            order.username,
            order.created_epoch_ms,
            order.started_epoch_ms,
            order.completion_epoch_ms,
            order.duration_ms,
            order.last_updated_epoch_ms,
            order.completed_percentage,
            order.is_halted,
            order.recurring,
            order.standard_recipe_name,
            order.production_fee,
            order.production_fee_currency,
        ],
    )?;
    Ok(())
}

/// Insert a material consumed by a production order
pub fn insert_production_order_input(
    conn: &Connection,
    order_id: &str,
    material: &OrderMaterialRow,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO production_order_inputs
         (order_id, material_id, material_ticker, material_name, amount)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            order_id,
            material.material_id,
            material.material_ticker,
            material.material_name,
            material.amount,
        ],
    )?;
    Ok(())
}

/// Insert a material produced by a production order
pub fn insert_production_order_output(
    conn: &Connection,
    order_id: &str,
    material: &OrderMaterialRow,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO production_order_outputs
         (order_id, material_id, material_ticker, material_name, amount)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            order_id,
            material.material_id,
            material.material_ticker,
            material.material_name,
            material.amount,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create an in-memory database for testing
    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn item(ticker: &str, name: &str) -> ItemRow {
        ItemRow {
            ticker: ticker.to_string(),
            name: name.to_string(),
            category: None,
        }
    }

    fn price(ticker: &str, location: &str, value: f64, is_default: bool) -> PriceRow {
        PriceRow {
            ticker: ticker.to_string(),
            location: location.to_string(),
            price: value,
            is_default,
            last_updated: None,
        }
    }

    #[test]
    fn init_schema_creates_tables() {
        let conn = test_db();
        for table in [
            "settings",
            "locations",
            "items",
            "prices",
            "shipping",
            "players",
            "planets",
            "sites",
            "ships",
            "storage_containers",
            "inventory_items",
            "production_facilities",
            "production_orders",
            "production_order_inputs",
            "production_order_outputs",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn schema_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prun.db");
        {
            let conn = Connection::open(&path).unwrap();
            init_schema(&conn).unwrap();
            upsert_setting(&conn, "google_sheets_id", b"abc123").unwrap();
        }
        let conn = Connection::open(&path).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(
            get_setting(&conn, "google_sheets_id").unwrap(),
            Some(b"abc123".to_vec())
        );
    }

    #[test]
    fn settings_roundtrip_bytes() {
        let conn = test_db();
        assert!(get_setting(&conn, "google_sheets_id").unwrap().is_none());

        upsert_setting(&conn, "google_sheets_id", b"abc123").unwrap();
        assert_eq!(
            get_setting(&conn, "google_sheets_id").unwrap(),
            Some(b"abc123".to_vec())
        );

        // Overwrite wins
        upsert_setting(&conn, "google_sheets_id", b"xyz789").unwrap();
        assert_eq!(
            get_setting(&conn, "google_sheets_id").unwrap(),
            Some(b"xyz789".to_vec())
        );
    }

    #[test]
    fn batch_upsert_locations_dedups_and_skips_blank() {
        let mut conn = test_db();
        let names: BTreeSet<String> = ["Moria".to_string(), "Benten".to_string(), "  ".to_string()]
            .into_iter()
            .collect();
        let count = batch_upsert_locations(&mut conn, &names).unwrap();
        assert_eq!(count, 2);

        // Second run is a no-op on the row count
        batch_upsert_locations(&mut conn, &names).unwrap();
        assert_eq!(get_all_locations(&conn).unwrap(), vec!["Benten", "Moria"]);
    }

    #[test]
    fn batch_upsert_items_last_write_wins() {
        let mut conn = test_db();
        let items = vec![item("FEO", "Iron Ore"), item("FEO", "Iron Ore (refined)")];
        batch_upsert_items(&mut conn, &items).unwrap();

        let all = get_all_items(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Iron Ore (refined)");
    }

    #[test]
    fn price_upsert_requires_item_and_location() {
        let mut conn = test_db();
        // No items/locations upserted yet: the foreign keys must reject this
        let result = batch_upsert_prices(&mut conn, &[price("FEO", "Moria", 10.0, false)]);
        assert!(result.is_err());
    }

    #[test]
    fn ordered_batches_satisfy_foreign_keys() {
        let mut conn = test_db();
        let locations: BTreeSet<String> = ["Moria".to_string()].into_iter().collect();
        batch_upsert_locations(&mut conn, &locations).unwrap();
        batch_upsert_items(&mut conn, &[item("FEO", "Iron Ore")]).unwrap();
        let count = batch_upsert_prices(&mut conn, &[price("FEO", "Moria", 10.5, true)]).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn batch_upsert_prices_overwrites_by_key() {
        let mut conn = test_db();
        let locations: BTreeSet<String> = ["Moria".to_string()].into_iter().collect();
        batch_upsert_locations(&mut conn, &locations).unwrap();
        batch_upsert_items(&mut conn, &[item("FEO", "Iron Ore")]).unwrap();

        batch_upsert_prices(&mut conn, &[price("FEO", "Moria", 10.5, false)]).unwrap();
        batch_upsert_prices(&mut conn, &[price("FEO", "Moria", 12.0, true)]).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM prices", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            get_price(&conn, "FEO", Some("Moria")).unwrap(),
            Some(12.0)
        );
    }

    #[test]
    fn get_price_falls_back_to_default() {
        let mut conn = test_db();
        let locations: BTreeSet<String> =
            ["Moria".to_string(), "Benten".to_string()].into_iter().collect();
        batch_upsert_locations(&mut conn, &locations).unwrap();
        batch_upsert_items(&mut conn, &[item("FEO", "Iron Ore")]).unwrap();
        batch_upsert_prices(
            &mut conn,
            &[
                price("FEO", "Moria", 12.0, true),
                price("FEO", "Benten", 11.0, false),
            ],
        )
        .unwrap();

        // Location-specific hit
        assert_eq!(get_price(&conn, "FEO", Some("Benten")).unwrap(), Some(11.0));
        // Unknown location falls back to the default
        assert_eq!(get_price(&conn, "FEO", Some("Promitor")).unwrap(), Some(12.0));
        // No location asks for the default directly
        assert_eq!(get_price(&conn, "FEO", None).unwrap(), Some(12.0));
        // Unknown ticker has neither
        assert_eq!(get_price(&conn, "H2O", None).unwrap(), None);
    }

    #[test]
    fn get_price_none_when_no_default_exists() {
        let mut conn = test_db();
        let locations: BTreeSet<String> = ["Moria".to_string()].into_iter().collect();
        batch_upsert_locations(&mut conn, &locations).unwrap();
        batch_upsert_items(&mut conn, &[item("FEO", "Iron Ore")]).unwrap();
        batch_upsert_prices(&mut conn, &[price("FEO", "Moria", 10.0, false)]).unwrap();

        assert_eq!(get_price(&conn, "FEO", None).unwrap(), None);
        assert_eq!(get_price(&conn, "FEO", Some("Benten")).unwrap(), None);
    }

    #[test]
    fn shipping_routes_are_directional() {
        let mut conn = test_db();
        let locations: BTreeSet<String> =
            ["Moria".to_string(), "Benten".to_string()].into_iter().collect();
        batch_upsert_locations(&mut conn, &locations).unwrap();
        batch_upsert_shipping(
            &mut conn,
            &[ShippingRoute {
                from_location: "Moria".to_string(),
                to_location: "Benten".to_string(),
                cost: 5.0,
            }],
        )
        .unwrap();

        assert_eq!(get_shipping_cost(&conn, "Moria", "Benten").unwrap(), Some(5.0));
        assert_eq!(get_shipping_cost(&conn, "Benten", "Moria").unwrap(), None);
    }

    #[test]
    fn clear_inventory_items_cascade_scope() {
        let conn = test_db();
        upsert_player(&conn, "GAMER1").unwrap();
        upsert_storage_container(
            &conn,
            &StorageContainerRow {
                storage_id: "st-1".to_string(),
                addressable_id: Some("ad-1".to_string()),
                username: "GAMER1".to_string(),
                container_name: None,
                storage_type: "STORE".to_string(),
                weight_capacity: 500.0,
                weight_load: 10.0,
                volume_capacity: 500.0,
                volume_load: 10.0,
                fixed_store: true,
            },
        )
        .unwrap();

        // Item FK target
        conn.execute(
            "INSERT INTO items (ticker, name) VALUES ('FEO', 'Iron Ore')",
            [],
        )
        .unwrap();

        insert_inventory_item(
            &conn,
            "st-1",
            &InventoryItemRow {
                material_id: "mat-1".to_string(),
                material_ticker: "FEO".to_string(),
                material_name: "Iron Ore".to_string(),
                material_category: None,
                amount: 100,
                material_weight: 1.0,
                material_volume: 1.0,
                total_weight: 100.0,
                total_volume: 100.0,
                material_value: 10.0,
                material_value_currency: "CIS".to_string(),
            },
        )
        .unwrap();

        let cleared = clear_inventory_items(&conn, "st-1").unwrap();
        assert_eq!(cleared, 1);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM inventory_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn clear_production_orders_cascades_to_materials() {
        let conn = test_db();
        upsert_player(&conn, "GAMER1").unwrap();
        upsert_production_facility(
            &conn,
            &ProductionFacilityRow {
                production_line_id: "line-1".to_string(),
                site_id: None,
                planet_id: None,
                planet_natural_id: None,
                planet_name: None,
                username: "GAMER1".to_string(),
                facility_type: Some("SMELTER".to_string()),
                capacity: 3,
                efficiency: 0.9,
                condition: 0.98,
            },
        )
        .unwrap();
        upsert_production_order(
            &conn,
            &ProductionOrderRow {
                order_id: "ord-1".to_string(),
                production_line_id: "line-1".to_string(),
                username: "GAMER1".to_string(),
                created_epoch_ms: Some(1),
                started_epoch_ms: None,
                completion_epoch_ms: None,
                duration_ms: None,
                last_updated_epoch_ms: None,
                completed_percentage: 0.5,
                is_halted: false,
                recurring: true,
                standard_recipe_name: Some("3xFEO=>1xFE".to_string()),
                production_fee: 120.0,
                production_fee_currency: "NCC".to_string(),
            },
        )
        .unwrap();
        insert_production_order_input(
            &conn,
            "ord-1",
            &OrderMaterialRow {
                material_id: Some("mat-1".to_string()),
                material_ticker: None,
                material_name: Some("Iron Ore".to_string()),
                amount: 3,
            },
        )
        .unwrap();

        clear_production_orders(&conn, "line-1").unwrap();
        let orders: i64 = conn
            .query_row("SELECT COUNT(*) FROM production_orders", [], |row| row.get(0))
            .unwrap();
        let inputs: i64 = conn
            .query_row("SELECT COUNT(*) FROM production_order_inputs", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(orders, 0);
        assert_eq!(inputs, 0);
    }

    #[test]
    fn storage_container_rejects_unknown_type() {
        let conn = test_db();
        upsert_player(&conn, "GAMER1").unwrap();
        let result = upsert_storage_container(
            &conn,
            &StorageContainerRow {
                storage_id: "st-1".to_string(),
                addressable_id: None,
                username: "GAMER1".to_string(),
                container_name: None,
                storage_type: "MYSTERY_STORE".to_string(),
                weight_capacity: 0.0,
                weight_load: 0.0,
                volume_capacity: 0.0,
                volume_load: 0.0,
                fixed_store: false,
            },
        );
        assert!(result.is_err());
    }
}
