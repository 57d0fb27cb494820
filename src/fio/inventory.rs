//! Inventory sync: FIO storage payloads into the database
//!
//! Containers, ships, planets, and sites are upserted; each container's
//! item list is fully replaced. A broken container skips only itself.

use crate::database::{self, DbResult, InventoryItemRow, StorageContainerRow};
use crate::error::Result;
use crate::fio::{FioClient, Site, StorageContainer};
use rusqlite::Connection;
use std::collections::BTreeSet;

/// Store types that belong to a ship rather than a base or warehouse
const SHIP_STORE_TYPES: &[&str] = &["SHIP_STORE", "FTL_FUEL_STORE", "STL_FUEL_STORE"];

/// Counts from one inventory sync pass
#[derive(Debug, Default)]
pub struct InventorySummary {
    pub planets: usize,
    pub sites: usize,
    pub ships: usize,
    pub containers: usize,
    pub items: usize,
    pub skipped_containers: usize,
}

/// Sync all inventory data for one user.
///
/// Storage is the primary payload; planet/site lookups are best-effort and
/// a failure there degrades to a warning (containers still sync, they just
/// lack planet context).
pub async fn sync_user_inventory(
    client: &FioClient,
    conn: &mut Connection,
    username: &str,
) -> Result<InventorySummary> {
    log::info!("Syncing inventory data for {}", username);
    database::upsert_player(conn, username)?;

    let containers = client.storage(username).await?;

    let mut summary = InventorySummary::default();

    match client.sites_planets(username).await {
        Ok(planet_ids) => {
            for planet_id in &planet_ids {
                match client.sites(username, planet_id).await {
                    Ok(sites) => {
                        let (planets, sites) = apply_sites(conn, username, planet_id, &sites)?;
                        summary.planets += planets;
                        summary.sites += sites;
                    }
                    Err(e) => log::warn!("Failed to fetch sites on {}: {}", planet_id, e),
                }
            }
        }
        Err(e) => log::warn!("Failed to fetch planet list for {}: {}", username, e),
    }

    apply_storage(conn, username, &containers, &mut summary);

    log::info!(
        "Inventory sync for {} complete: {} containers ({} skipped), {} items, {} ships",
        username,
        summary.containers,
        summary.skipped_containers,
        summary.items,
        summary.ships
    );
    Ok(summary)
}

/// Upsert the planets and sites reported for one planet id
pub fn apply_sites(
    conn: &Connection,
    username: &str,
    planet_id: &str,
    sites: &[Site],
) -> DbResult<(usize, usize)> {
    let mut planets = 0;
    let mut site_count = 0;
    for site in sites {
        let planet_known = match site.planet_name.as_deref() {
            Some(name) if !name.is_empty() => {
                database::upsert_planet(
                    conn,
                    planet_id,
                    site.planet_identifier.as_deref(),
                    name,
                    site.planet_founded_epoch_ms,
                )?;
                planets += 1;
                true
            }
            _ => {
                log::warn!("Site on {} has no planet name, planet not recorded", planet_id);
                false
            }
        };

        if let Some(site_id) = site.site_id.as_deref() {
            database::upsert_site(
                conn,
                site_id,
                planet_known.then_some(planet_id),
                username,
                site.invested_permits.unwrap_or(0),
                site.maximum_permits.unwrap_or(3),
            )?;
            site_count += 1;
        }
    }
    Ok((planets, site_count))
}

/// Apply all storage containers; a failing container is logged and skipped
pub fn apply_storage(
    conn: &mut Connection,
    username: &str,
    containers: &[StorageContainer],
    summary: &mut InventorySummary,
) {
    let mut ships_seen: BTreeSet<String> = BTreeSet::new();
    for container in containers {
        match apply_container(conn, username, container, &mut ships_seen) {
            Ok(items) => {
                summary.containers += 1;
                summary.items += items;
            }
            Err(e) => {
                summary.skipped_containers += 1;
                log::warn!("Skipping container {}: {}", container.storage_id, e);
            }
        }
    }
    summary.ships += ships_seen.len();
}

/// Upsert one container and replace its contents, in a single transaction
fn apply_container(
    conn: &mut Connection,
    username: &str,
    container: &StorageContainer,
    ships_seen: &mut BTreeSet<String>,
) -> DbResult<usize> {
    let tx = conn.transaction()?;

    // Ships have real names and move around; track them by addressable id
    let ship_name = container
        .name
        .as_deref()
        .filter(|n| !n.is_empty() && *n != "None");
    if let Some(name) = ship_name {
        if SHIP_STORE_TYPES.contains(&container.storage_type.as_str())
            && !ships_seen.contains(&container.addressable_id)
        {
            database::upsert_ship(&tx, &container.addressable_id, name, username)?;
            ships_seen.insert(container.addressable_id.clone());
        }
    }

    database::upsert_storage_container(
        &tx,
        &StorageContainerRow {
            storage_id: container.storage_id.clone(),
            addressable_id: Some(container.addressable_id.clone()),
            username: username.to_string(),
            container_name: ship_name.map(|n| n.to_string()),
            storage_type: container.storage_type.clone(),
            weight_capacity: container.weight_capacity,
            weight_load: container.weight_load,
            volume_capacity: container.volume_capacity,
            volume_load: container.volume_load,
            fixed_store: container.fixed_store,
        },
    )?;

    // Contents are point-in-time: replace, don't merge
    database::clear_inventory_items(&tx, &container.storage_id)?;

    let mut inserted = 0;
    for item in &container.storage_items {
        let ticker = match item.material_ticker.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => {
                log::warn!(
                    "Skipping inventory item without ticker in container {}",
                    container.storage_id
                );
                continue;
            }
        };
        let name = item.material_name.as_deref().unwrap_or(ticker);

        // The item row must exist before the inventory row references it
        database::upsert_item(&tx, ticker, name, item.material_category.as_deref())?;
        database::insert_inventory_item(
            &tx,
            &container.storage_id,
            &InventoryItemRow {
                material_id: item
                    .material_id
                    .clone()
                    .unwrap_or_else(|| ticker.to_string()),
                material_ticker: ticker.to_string(),
                material_name: name.to_string(),
                material_category: item.material_category.clone(),
                amount: item.material_amount.unwrap_or(0),
                material_weight: item.material_weight.unwrap_or(0.0),
                material_volume: item.material_volume.unwrap_or(0.0),
                total_weight: item.total_weight.unwrap_or(0.0),
                total_volume: item.total_volume.unwrap_or(0.0),
                material_value: item.material_value.unwrap_or(0.0),
                material_value_currency: item
                    .material_value_currency
                    .clone()
                    .unwrap_or_else(|| "CIS".to_string()),
            },
        )?;
        inserted += 1;
    }

    tx.commit()?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_schema;
    use crate::fio::StorageItem;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn stack(material_id: &str, ticker: &str, amount: i64) -> StorageItem {
        StorageItem {
            material_id: Some(material_id.to_string()),
            material_ticker: Some(ticker.to_string()),
            material_name: Some(format!("{} material", ticker)),
            material_category: None,
            material_amount: Some(amount),
            material_weight: Some(1.0),
            material_volume: Some(1.0),
            total_weight: Some(amount as f64),
            total_volume: Some(amount as f64),
            material_value: Some(10.0),
            material_value_currency: None,
        }
    }

    fn container(storage_id: &str, storage_type: &str, name: Option<&str>, items: Vec<StorageItem>) -> StorageContainer {
        StorageContainer {
            storage_id: storage_id.to_string(),
            addressable_id: format!("ad-{}", storage_id),
            name: name.map(|n| n.to_string()),
            storage_type: storage_type.to_string(),
            weight_capacity: 500.0,
            weight_load: 0.0,
            volume_capacity: 500.0,
            volume_load: 0.0,
            fixed_store: false,
            storage_items: items,
        }
    }

    #[test]
    fn resync_replaces_container_contents() {
        let mut conn = test_db();
        database::upsert_player(&conn, "GAMER1").unwrap();

        let mut summary = InventorySummary::default();
        let first = vec![container(
            "st-1",
            "STORE",
            None,
            vec![stack("mat-feo", "FEO", 100), stack("mat-h2o", "H2O", 50)],
        )];
        apply_storage(&mut conn, "GAMER1", &first, &mut summary);
        assert_eq!(summary.items, 2);

        // Next pass: H2O is gone, FEO amount changed
        let second = vec![container(
            "st-1",
            "STORE",
            None,
            vec![stack("mat-feo", "FEO", 75)],
        )];
        let mut summary = InventorySummary::default();
        apply_storage(&mut conn, "GAMER1", &second, &mut summary);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM inventory_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let amount: i64 = conn
            .query_row(
                "SELECT amount FROM inventory_items WHERE material_id = 'mat-feo'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(amount, 75);
    }

    #[test]
    fn ship_stores_register_the_ship_once() {
        let mut conn = test_db();
        database::upsert_player(&conn, "GAMER1").unwrap();

        // Two stores on the same hull share an addressable id
        let mut ship_cargo = container("st-1", "SHIP_STORE", Some("Respect"), vec![]);
        let mut ship_fuel = container("st-2", "FTL_FUEL_STORE", Some("Respect"), vec![]);
        ship_cargo.addressable_id = "hull-1".to_string();
        ship_fuel.addressable_id = "hull-1".to_string();

        let mut summary = InventorySummary::default();
        apply_storage(&mut conn, "GAMER1", &[ship_cargo, ship_fuel], &mut summary);

        assert_eq!(summary.ships, 1);
        let ships: i64 = conn
            .query_row("SELECT COUNT(*) FROM ships", [], |row| row.get(0))
            .unwrap();
        assert_eq!(ships, 1);
    }

    #[test]
    fn base_store_named_none_is_not_a_ship() {
        let mut conn = test_db();
        database::upsert_player(&conn, "GAMER1").unwrap();

        let mut summary = InventorySummary::default();
        apply_storage(
            &mut conn,
            "GAMER1",
            &[container("st-1", "SHIP_STORE", Some("None"), vec![])],
            &mut summary,
        );

        assert_eq!(summary.ships, 0);
        assert_eq!(summary.containers, 1);
    }

    #[test]
    fn broken_container_skips_only_itself() {
        let mut conn = test_db();
        database::upsert_player(&conn, "GAMER1").unwrap();

        let bad = container("st-1", "MYSTERY_STORE", None, vec![]);
        let good = container("st-2", "STORE", None, vec![stack("mat-feo", "FEO", 10)]);

        let mut summary = InventorySummary::default();
        apply_storage(&mut conn, "GAMER1", &[bad, good], &mut summary);

        assert_eq!(summary.skipped_containers, 1);
        assert_eq!(summary.containers, 1);
        assert_eq!(summary.items, 1);
    }

    #[test]
    fn item_without_ticker_is_skipped() {
        let mut conn = test_db();
        database::upsert_player(&conn, "GAMER1").unwrap();

        let mut no_ticker = stack("mat-x", "X", 5);
        no_ticker.material_ticker = None;

        let mut summary = InventorySummary::default();
        apply_storage(
            &mut conn,
            "GAMER1",
            &[container("st-1", "STORE", None, vec![no_ticker, stack("mat-feo", "FEO", 10)])],
            &mut summary,
        );
        assert_eq!(summary.items, 1);
    }

    #[test]
    fn apply_sites_records_planet_and_site() {
        let conn = test_db();
        database::upsert_player(&conn, "GAMER1").unwrap();

        let sites = vec![Site {
            site_id: Some("site-1".to_string()),
            planet_identifier: Some("UV-351a".to_string()),
            planet_name: Some("Katoa".to_string()),
            planet_founded_epoch_ms: Some(1_600_000_000_000),
            invested_permits: Some(2),
            maximum_permits: None,
        }];
        let (planets, site_count) = apply_sites(&conn, "GAMER1", "planet-1", &sites).unwrap();
        assert_eq!((planets, site_count), (1, 1));

        let max: i64 = conn
            .query_row("SELECT maximum_permits FROM sites WHERE id = 'site-1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(max, 3);
        let name: String = conn
            .query_row("SELECT name FROM planets WHERE id = 'planet-1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(name, "Katoa");
    }
}
