//! scd-db
//!
//! PostgreSQL persistence for machines, stock rows and sync cursors.
//! [`PgStore`] implements the `scd-sync` store seam; the daemon and CLI
//! share it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use scd_schemas::{
    Machine, StockItem, SyncCursor, DEFAULT_ALERT_THRESHOLD, DEFAULT_CAPACITY,
};
use scd_sync::StockStore;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

pub const ENV_DB_URL: &str = "SCD_DATABASE_URL";

/// Connect to Postgres using SCD_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='machines'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_schema: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_schema: bool,
}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

/// Store seam implementation over a shared connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl StockStore for PgStore {
    async fn get_cursor(&self, machine_id: &str) -> Result<Option<SyncCursor>> {
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "select last_sale_id, last_synced_at from sync_cursors where machine_id = $1",
        )
        .bind(machine_id)
        .fetch_optional(&self.pool)
        .await
        .context("get_cursor failed")?;

        Ok(row.map(|(last_sale_id, last_synced_at)| SyncCursor {
            machine_id: machine_id.to_string(),
            last_sale_id,
            last_synced_at,
        }))
    }

    async fn put_cursor(&self, cursor: &SyncCursor) -> Result<()> {
        sqlx::query(
            r#"
            insert into sync_cursors (machine_id, last_sale_id, last_synced_at)
            values ($1, $2, $3)
            on conflict (machine_id) do update
              set last_sale_id = excluded.last_sale_id,
                  last_synced_at = excluded.last_synced_at
            "#,
        )
        .bind(&cursor.machine_id)
        .bind(&cursor.last_sale_id)
        .bind(cursor.last_synced_at)
        .execute(&self.pool)
        .await
        .context("put_cursor failed")?;

        Ok(())
    }

    async fn list_stock(&self, machine_id: &str) -> Result<Vec<StockItem>> {
        let rows: Vec<(i32, i64, i64, i64)> = sqlx::query_as(
            r#"
            select position, units_current, capacity_max, alert_threshold
            from stock_items
            where machine_id = $1
            order by position
            "#,
        )
        .bind(machine_id)
        .fetch_all(&self.pool)
        .await
        .context("list_stock failed")?;

        Ok(rows
            .into_iter()
            .map(
                |(position, units_current, capacity_max, alert_threshold)| StockItem {
                    machine_id: machine_id.to_string(),
                    position,
                    units_current,
                    capacity_max,
                    alert_threshold,
                },
            )
            .collect())
    }

    async fn decrement_units(&self, machine_id: &str, position: i32, by: i64) -> Result<()> {
        // Single atomic update against the live row, floored at zero: a
        // refill committed between the pass's snapshot read and this
        // statement is decremented from, not overwritten. A missing row
        // means the position is untracked — not an error.
        sqlx::query(
            r#"
            update stock_items
            set units_current = greatest(units_current - $3, 0),
                updated_at_utc = now()
            where machine_id = $1 and position = $2
            "#,
        )
        .bind(machine_id)
        .bind(position)
        .bind(by)
        .execute(&self.pool)
        .await
        .context("decrement_units failed")?;

        Ok(())
    }

    async fn refill(&self, machine_id: &str, position: Option<i32>) -> Result<()> {
        match position {
            Some(position) => {
                sqlx::query(
                    r#"
                    update stock_items
                    set units_current = capacity_max, updated_at_utc = now()
                    where machine_id = $1 and position = $2
                    "#,
                )
                .bind(machine_id)
                .bind(position)
                .execute(&self.pool)
                .await
                .context("refill position failed")?;
            }
            None => {
                sqlx::query(
                    r#"
                    update stock_items
                    set units_current = capacity_max, updated_at_utc = now()
                    where machine_id = $1
                    "#,
                )
                .bind(machine_id)
                .execute(&self.pool)
                .await
                .context("refill machine failed")?;
            }
        }
        Ok(())
    }

    async fn init_layout(&self, machine_id: &str, positions: &[i32]) -> Result<()> {
        for &position in positions {
            sqlx::query(
                r#"
                insert into stock_items
                  (machine_id, position, units_current, capacity_max, alert_threshold)
                values ($1, $2, $3, $3, $4)
                on conflict (machine_id, position) do nothing
                "#,
            )
            .bind(machine_id)
            .bind(position)
            .bind(DEFAULT_CAPACITY)
            .bind(DEFAULT_ALERT_THRESHOLD)
            .execute(&self.pool)
            .await
            .context("init_layout insert failed")?;
        }
        Ok(())
    }

    async fn list_machines(&self) -> Result<Vec<Machine>> {
        let rows: Vec<(String, String, Option<String>, bool, Option<Uuid>)> = sqlx::query_as(
            r#"
            select machine_id, display_name, location, active, owner_id
            from machines
            order by machine_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("list_machines failed")?;

        Ok(rows
            .into_iter()
            .map(
                |(machine_id, display_name, location, active, owner_id)| Machine {
                    machine_id,
                    display_name,
                    location,
                    active,
                    owner_id,
                },
            )
            .collect())
    }

    async fn register_machine(&self, machine: &Machine) -> Result<()> {
        sqlx::query(
            r#"
            insert into machines (machine_id, display_name, location, active, owner_id)
            values ($1, $2, $3, $4, $5)
            on conflict (machine_id) do update
              set display_name = excluded.display_name,
                  location = excluded.location,
                  active = excluded.active
            "#,
        )
        .bind(&machine.machine_id)
        .bind(&machine.display_name)
        .bind(&machine.location)
        .bind(machine.active)
        .bind(machine.owner_id)
        .execute(&self.pool)
        .await
        .context("register_machine failed")?;

        Ok(())
    }

    async fn set_machine_active(&self, machine_id: &str, active: bool) -> Result<()> {
        sqlx::query("update machines set active = $2 where machine_id = $1")
            .bind(machine_id)
            .bind(active)
            .execute(&self.pool)
            .await
            .context("set_machine_active failed")?;
        Ok(())
    }
}
