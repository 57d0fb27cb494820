//! Production sync: FIO production payloads into the database
//!
//! Facilities are upserted; each line's order list is fully replaced,
//! cascading to input/output materials. A broken line skips only itself.

use crate::database::{
    self, DbResult, OrderMaterialRow, ProductionFacilityRow, ProductionOrderRow,
};
use crate::error::Result;
use crate::fio::{FioClient, OrderMaterial, ProductionLine};
use rusqlite::Connection;

/// Counts from one production sync pass
#[derive(Debug, Default)]
pub struct ProductionSummary {
    pub facilities: usize,
    pub orders: usize,
    pub skipped_lines: usize,
}

/// Sync all production data for one user
pub async fn sync_user_production(
    client: &FioClient,
    conn: &mut Connection,
    username: &str,
) -> Result<ProductionSummary> {
    log::info!("Syncing production data for {}", username);
    database::upsert_player(conn, username)?;

    let lines = client.production(username).await?;
    let summary = apply_production(conn, username, &lines);

    log::info!(
        "Production sync for {} complete: {} facilities ({} skipped), {} orders",
        username,
        summary.facilities,
        summary.skipped_lines,
        summary.orders
    );
    Ok(summary)
}

/// Apply all production lines; a failing line is logged and skipped
pub fn apply_production(
    conn: &mut Connection,
    username: &str,
    lines: &[ProductionLine],
) -> ProductionSummary {
    let mut summary = ProductionSummary::default();
    for line in lines {
        match apply_line(conn, username, line) {
            Ok(orders) => {
                summary.facilities += 1;
                summary.orders += orders;
            }
            Err(e) => {
                summary.skipped_lines += 1;
                log::warn!("Skipping production line {}: {}", line.production_line_id, e);
            }
        }
    }
    summary
}

/// Upsert one facility and replace its orders, in a single transaction
fn apply_line(conn: &mut Connection, username: &str, line: &ProductionLine) -> DbResult<usize> {
    let tx = conn.transaction()?;

    // The payload names the planet, so record it before the facility
    // references it; the site gets a stub if inventory sync hasn't run
    let planet_known = match (line.planet_id.as_deref(), line.planet_name.as_deref()) {
        (Some(planet_id), Some(name)) if !name.is_empty() => {
            database::upsert_planet(&tx, planet_id, line.planet_natural_id.as_deref(), name, None)?;
            true
        }
        _ => false,
    };
    let planet_ref = if planet_known {
        line.planet_id.as_deref()
    } else {
        None
    };
    if let Some(site_id) = line.site_id.as_deref() {
        database::ensure_site(&tx, site_id, planet_ref, username)?;
    }

    database::upsert_production_facility(
        &tx,
        &ProductionFacilityRow {
            production_line_id: line.production_line_id.clone(),
            site_id: line.site_id.clone(),
            planet_id: planet_ref.map(|p| p.to_string()),
            planet_natural_id: line.planet_natural_id.clone(),
            planet_name: line.planet_name.clone(),
            username: username.to_string(),
            facility_type: line.facility_type.clone(),
            capacity: line.capacity.unwrap_or(0),
            efficiency: line.efficiency.unwrap_or(0.0),
            condition: line.condition.unwrap_or(0.0),
        },
    )?;

    // Orders are point-in-time: replace, don't merge. Deleting the
    // orders cascades away their input/output materials.
    database::clear_production_orders(&tx, &line.production_line_id)?;

    let mut count = 0;
    for order in &line.orders {
        database::upsert_production_order(
            &tx,
            &ProductionOrderRow {
                order_id: order.production_line_order_id.clone(),
                production_line_id: line.production_line_id.clone(),
                username: username.to_string(),
                created_epoch_ms: order.created_epoch_ms,
                started_epoch_ms: order.started_epoch_ms,
                completion_epoch_ms: order.completion_epoch_ms,
                duration_ms: order.duration_ms,
                last_updated_epoch_ms: order.last_updated_epoch_ms,
                completed_percentage: order.completed_percentage.unwrap_or(0.0),
                is_halted: order.is_halted,
                recurring: order.recurring,
                standard_recipe_name: order.standard_recipe_name.clone(),
                production_fee: order.production_fee.unwrap_or(0.0),
                production_fee_currency: order
                    .production_fee_currency
                    .clone()
                    .unwrap_or_else(|| "NCC".to_string()),
            },
        )?;

        for material in &order.inputs {
            insert_material(&tx, &order.production_line_order_id, material, true)?;
        }
        for material in &order.outputs {
            insert_material(&tx, &order.production_line_order_id, material, false)?;
        }
        count += 1;
    }

    tx.commit()?;
    Ok(count)
}

fn insert_material(
    conn: &Connection,
    order_id: &str,
    material: &OrderMaterial,
    is_input: bool,
) -> DbResult<()> {
    // Keep the items table covering every material the payload mentions
    if let Some(ticker) = material.material_ticker.as_deref().filter(|t| !t.is_empty()) {
        let name = material.material_name.as_deref().unwrap_or(ticker);
        database::upsert_item(conn, ticker, name, material.material_category.as_deref())?;
    }

    let row = OrderMaterialRow {
        material_id: material.material_id.clone(),
        material_ticker: material.material_ticker.clone(),
        material_name: material.material_name.clone(),
        amount: material.amount.unwrap_or(0),
    };
    if is_input {
        database::insert_production_order_input(conn, order_id, &row)
    } else {
        database::insert_production_order_output(conn, order_id, &row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_schema;
    use crate::fio::ProductionOrder;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn material(ticker: &str, amount: i64) -> OrderMaterial {
        OrderMaterial {
            material_id: Some(format!("mat-{}", ticker.to_lowercase())),
            material_ticker: Some(ticker.to_string()),
            material_name: Some(format!("{} material", ticker)),
            material_category: None,
            amount: Some(amount),
        }
    }

    fn order(order_id: &str, inputs: Vec<OrderMaterial>, outputs: Vec<OrderMaterial>) -> ProductionOrder {
        ProductionOrder {
            production_line_order_id: order_id.to_string(),
            created_epoch_ms: Some(1_700_000_000_000),
            started_epoch_ms: None,
            completion_epoch_ms: None,
            duration_ms: None,
            last_updated_epoch_ms: None,
            completed_percentage: Some(0.25),
            is_halted: false,
            recurring: false,
            standard_recipe_name: None,
            production_fee: None,
            production_fee_currency: None,
            inputs,
            outputs,
        }
    }

    fn line(line_id: &str, orders: Vec<ProductionOrder>) -> ProductionLine {
        ProductionLine {
            production_line_id: line_id.to_string(),
            site_id: Some("site-1".to_string()),
            planet_id: Some("planet-1".to_string()),
            planet_natural_id: Some("UV-351a".to_string()),
            planet_name: Some("Katoa".to_string()),
            facility_type: Some("SMELTER".to_string()),
            capacity: Some(3),
            efficiency: Some(0.91),
            condition: Some(0.98),
            orders,
        }
    }

    #[test]
    fn resync_replaces_orders_and_materials() {
        let mut conn = test_db();
        database::upsert_player(&conn, "GAMER1").unwrap();

        let first = vec![line(
            "line-1",
            vec![order("ord-1", vec![material("FEO", 3)], vec![material("FE", 1)])],
        )];
        let summary = apply_production(&mut conn, "GAMER1", &first);
        assert_eq!(summary.facilities, 1);
        assert_eq!(summary.orders, 1);

        // Next pass: ord-1 finished and disappeared, ord-2 replaces it
        let second = vec![line(
            "line-1",
            vec![order("ord-2", vec![material("AL", 2)], vec![])],
        )];
        apply_production(&mut conn, "GAMER1", &second);

        let orders: Vec<String> = conn
            .prepare("SELECT order_id FROM production_orders")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<DbResult<_>>()
            .unwrap();
        assert_eq!(orders, vec!["ord-2"]);

        // ord-1's materials are gone with it
        let inputs: i64 = conn
            .query_row("SELECT COUNT(*) FROM production_order_inputs", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(inputs, 1);
        let outputs: i64 = conn
            .query_row("SELECT COUNT(*) FROM production_order_outputs", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(outputs, 0);
    }

    #[test]
    fn materials_are_registered_as_items() {
        let mut conn = test_db();
        database::upsert_player(&conn, "GAMER1").unwrap();

        apply_production(
            &mut conn,
            "GAMER1",
            &[line(
                "line-1",
                vec![order("ord-1", vec![material("FEO", 3)], vec![material("FE", 1)])],
            )],
        );

        let tickers: Vec<String> = conn
            .prepare("SELECT ticker FROM items ORDER BY ticker")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<DbResult<_>>()
            .unwrap();
        assert_eq!(tickers, vec!["FE", "FEO"]);
    }

    #[test]
    fn planet_and_site_stubs_come_from_the_payload() {
        let mut conn = test_db();
        database::upsert_player(&conn, "GAMER1").unwrap();

        apply_production(&mut conn, "GAMER1", &[line("line-1", vec![])]);

        let planet: String = conn
            .query_row("SELECT name FROM planets WHERE id = 'planet-1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(planet, "Katoa");
        let sites: i64 = conn
            .query_row("SELECT COUNT(*) FROM sites WHERE id = 'site-1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(sites, 1);
    }

    #[test]
    fn site_stub_never_overwrites_permits() {
        let mut conn = test_db();
        database::upsert_player(&conn, "GAMER1").unwrap();
        database::upsert_planet(&conn, "planet-1", None, "Katoa", None).unwrap();
        database::upsert_site(&conn, "site-1", Some("planet-1"), "GAMER1", 2, 4).unwrap();

        apply_production(&mut conn, "GAMER1", &[line("line-1", vec![])]);

        let (invested, maximum): (i64, i64) = conn
            .query_row(
                "SELECT invested_permits, maximum_permits FROM sites WHERE id = 'site-1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((invested, maximum), (2, 4));
    }

    #[test]
    fn line_without_planet_still_applies() {
        let mut conn = test_db();
        database::upsert_player(&conn, "GAMER1").unwrap();

        let mut orphan = line("line-1", vec![]);
        orphan.planet_id = None;
        orphan.planet_name = None;
        orphan.site_id = None;

        let summary = apply_production(&mut conn, "GAMER1", &[orphan]);
        assert_eq!(summary.facilities, 1);
        assert_eq!(summary.skipped_lines, 0);
    }
}
