//! `PostgreSQL` reservation store for tablebook.
//!
//! Implements [`ReservationStore`] and [`AuditLog`] from `tablebook-core`
//! with sqlx:
//!
//! - Each write runs in one transaction together with its audit entry
//! - Writes for the same (date, slot) serialize on a transaction-scoped
//!   advisory lock, then re-check table availability before writing
//! - A partial unique index on active table assignments backs the check,
//!   so two transactions can never both hold a table
//!
//! # Example
//!
//! ```ignore
//! use tablebook_postgres::PostgresReservationStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresReservationStore::connect("postgres://localhost/tablebook", 10).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::collections::HashMap;
use tablebook_core::BoxFuture;
use tablebook_core::audit::{AuditAction, AuditLogEntry, AuditLogId, AuditRecord, ContactField};
use tablebook_core::reservation::{
    Actor, ContactDetails, Reservation, ReservationDraft, ReservationId, ReservationStatus,
};
use tablebook_core::slot::TimeSlot;
use tablebook_core::store::{AuditLog, ReservationStore, StoreError};
use tablebook_core::table::{DiningTable, TableId, TableSet};

const RESERVATION_COLUMNS: &str = "id, reservation_date, time_slot, name, email, phone, status, \
                                   created_at, updated_at, cancelled_at";

const LOG_COLUMNS: &str = "id, reservation_id, action, reservation_date, time_slot, tables, \
                           contact_changes, done_by, recorded_at";

/// `PostgreSQL`-backed reservation store.
#[derive(Clone, Debug)]
pub struct PostgresReservationStore {
    pool: PgPool,
}

impl PostgresReservationStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with a pool of up to `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| database_error("Failed to connect", &e))?;
        Ok(Self::from_pool(pool))
    }

    /// Create the schema if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))
    }

    /// Insert the dining room, updating capacities of tables that exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the write fails.
    pub async fn seed_tables(&self, tables: &[DiningTable]) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        for table in tables {
            sqlx::query(
                r"
                INSERT INTO dining_tables (id, capacity)
                VALUES ($1, $2)
                ON CONFLICT (id) DO UPDATE SET capacity = EXCLUDED.capacity
                ",
            )
            .bind(table_id_param(table.id)?)
            .bind(i32::try_from(table.capacity).map_err(|_| {
                StoreError::Database(format!("Capacity out of range for table {}", table.id))
            })?)
            .execute(&mut *tx)
            .await
            .map_err(|e| database_error("Failed to seed tables", &e))?;
        }
        commit(tx).await?;
        tracing::info!(tables = tables.len(), "Seeded dining tables");
        Ok(())
    }

    /// Check the connection with a trivial query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database is unreachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| database_error("Ping failed", &e))
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| database_error("Failed to start transaction", &e))
    }

    async fn load_reservations(&self, rows: Vec<PgRow>) -> Result<Vec<Reservation>, StoreError> {
        let ids: Vec<i64> = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<Result<_, _>>()
            .map_err(|e| database_error("Failed to decode reservation id", &e))?;

        let assignment_rows = sqlx::query(
            r"
            SELECT reservation_id, table_id
            FROM reservation_tables
            WHERE reservation_id = ANY($1)
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error("Failed to load table assignments", &e))?;

        let mut assignments: HashMap<i64, Vec<TableId>> = HashMap::new();
        for row in &assignment_rows {
            let reservation_id: i64 = row
                .try_get("reservation_id")
                .map_err(|e| database_error("Failed to decode assignment", &e))?;
            let table_id: i32 = row
                .try_get("table_id")
                .map_err(|e| database_error("Failed to decode assignment", &e))?;
            assignments
                .entry(reservation_id)
                .or_default()
                .push(table_id_from_column(table_id)?);
        }

        rows.iter()
            .map(|row| {
                let id: i64 = row
                    .try_get("id")
                    .map_err(|e| database_error("Failed to decode reservation", &e))?;
                reservation_from_row(row, assignments.remove(&id).unwrap_or_default())
            })
            .collect()
    }
}

fn database_error(context: &str, error: &sqlx::Error) -> StoreError {
    StoreError::Database(format!("{context}: {error}"))
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), StoreError> {
    tx.commit()
        .await
        .map_err(|e| database_error("Failed to commit transaction", &e))
}

fn table_id_param(id: TableId) -> Result<i32, StoreError> {
    i32::try_from(id.get()).map_err(|_| StoreError::UnknownTable(id))
}

fn table_ids_param(tables: &TableSet) -> Result<Vec<i32>, StoreError> {
    tables.iter().map(table_id_param).collect()
}

fn table_id_from_column(raw: i32) -> Result<TableId, StoreError> {
    u32::try_from(raw)
        .map(TableId::new)
        .map_err(|_| StoreError::Database(format!("Invalid table id in database: {raw}")))
}

fn reservation_from_row(row: &PgRow, tables: Vec<TableId>) -> Result<Reservation, StoreError> {
    let decode = |e: sqlx::Error| database_error("Failed to decode reservation", &e);

    let id = ReservationId::new(row.try_get("id").map_err(decode)?);
    let slot_label: String = row.try_get("time_slot").map_err(decode)?;
    let status_label: String = row.try_get("status").map_err(decode)?;

    Ok(Reservation {
        id,
        date: row.try_get("reservation_date").map_err(decode)?,
        time_slot: TimeSlot::parse(&slot_label)
            .map_err(|e| StoreError::Database(format!("Reservation {id}: {e}")))?,
        contact: ContactDetails {
            name: row.try_get("name").map_err(decode)?,
            email: row.try_get("email").map_err(decode)?,
            phone: row.try_get("phone").map_err(decode)?,
        },
        tables: TableSet::try_from_ids(tables)
            .map_err(|e| StoreError::Database(format!("Reservation {id}: {e}")))?,
        status: ReservationStatus::parse(&status_label).ok_or_else(|| {
            StoreError::Database(format!("Reservation {id}: unknown status {status_label}"))
        })?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
        cancelled_at: row.try_get("cancelled_at").map_err(decode)?,
    })
}

fn log_entry_from_row(row: &PgRow) -> Result<AuditLogEntry, StoreError> {
    let decode = |e: sqlx::Error| database_error("Failed to decode audit entry", &e);

    let id = AuditLogId::new(row.try_get("id").map_err(decode)?);
    let action_label: String = row.try_get("action").map_err(decode)?;
    let done_by_label: String = row.try_get("done_by").map_err(decode)?;
    let contact_labels: Vec<String> = row.try_get("contact_changes").map_err(decode)?;

    let contact_changes = contact_labels
        .iter()
        .map(|label| {
            ContactField::parse(label).ok_or_else(|| {
                StoreError::Database(format!("Audit entry {id}: unknown field {label}"))
            })
        })
        .collect::<Result<_, _>>()?;

    Ok(AuditLogEntry {
        id,
        reservation_id: ReservationId::new(row.try_get("reservation_id").map_err(decode)?),
        record: AuditRecord {
            action: AuditAction::parse(&action_label).ok_or_else(|| {
                StoreError::Database(format!("Audit entry {id}: unknown action {action_label}"))
            })?,
            reservation_date: row.try_get("reservation_date").map_err(decode)?,
            time_slot: row.try_get("time_slot").map_err(decode)?,
            tables: row.try_get("tables").map_err(decode)?,
            contact_changes,
            done_by: Actor::parse(&done_by_label).ok_or_else(|| {
                StoreError::Database(format!("Audit entry {id}: unknown actor {done_by_label}"))
            })?,
            recorded_at: row.try_get("recorded_at").map_err(decode)?,
        },
    })
}

/// Serialize writers of one (date, slot) until the transaction ends.
async fn lock_slot(
    tx: &mut Transaction<'static, Postgres>,
    date: NaiveDate,
    slot: &TimeSlot,
) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("{date}|{slot}"))
        .execute(&mut **tx)
        .await
        .map(|_| ())
        .map_err(|e| database_error("Failed to lock slot", &e))
}

async fn ensure_tables_exist(
    tx: &mut Transaction<'static, Postgres>,
    tables: &TableSet,
) -> Result<(), StoreError> {
    let requested = table_ids_param(tables)?;
    let known: Vec<i32> = sqlx::query_scalar("SELECT id FROM dining_tables WHERE id = ANY($1)")
        .bind(&requested)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| database_error("Failed to check tables", &e))?;

    tables
        .iter()
        .zip(&requested)
        .find(|(_, raw)| !known.contains(raw))
        .map_or(Ok(()), |(id, _)| Err(StoreError::UnknownTable(id)))
}

async fn taken_tables(
    tx: &mut Transaction<'static, Postgres>,
    date: NaiveDate,
    slot: &TimeSlot,
    tables: &TableSet,
    exclude: Option<ReservationId>,
) -> Result<Vec<TableId>, StoreError> {
    let taken: Vec<i32> = sqlx::query_scalar(
        r"
        SELECT DISTINCT table_id
        FROM reservation_tables
        WHERE reservation_date = $1
          AND time_slot = $2
          AND active
          AND table_id = ANY($3)
          AND ($4::BIGINT IS NULL OR reservation_id <> $4)
        ORDER BY table_id
        ",
    )
    .bind(date)
    .bind(slot.label())
    .bind(table_ids_param(tables)?)
    .bind(exclude.map(ReservationId::get))
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| database_error("Failed to check availability", &e))?;

    taken.into_iter().map(table_id_from_column).collect()
}

async fn assign_tables(
    tx: &mut Transaction<'static, Postgres>,
    reservation: &Reservation,
) -> Result<(), StoreError> {
    for table in reservation.tables.iter() {
        sqlx::query(
            r"
            INSERT INTO reservation_tables (reservation_id, table_id, reservation_date, time_slot)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(reservation.id.get())
        .bind(table_id_param(table)?)
        .bind(reservation.date)
        .bind(reservation.time_slot.label())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                metrics::counter!("postgres.reservation_tables.unique_violations").increment(1);
                StoreError::Conflict {
                    tables: reservation.tables.iter().collect(),
                }
            } else {
                database_error("Failed to assign table", &e)
            }
        })?;
    }
    Ok(())
}

async fn append_log(
    tx: &mut Transaction<'static, Postgres>,
    reservation_id: ReservationId,
    record: &AuditRecord,
) -> Result<(), StoreError> {
    let contact_changes: Vec<&str> = record
        .contact_changes
        .iter()
        .map(|field| field.as_str())
        .collect();

    sqlx::query(
        r"
        INSERT INTO reservation_logs
            (reservation_id, action, reservation_date, time_slot, tables,
             contact_changes, done_by, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(reservation_id.get())
    .bind(record.action.as_str())
    .bind(record.reservation_date.as_deref())
    .bind(record.time_slot.as_deref())
    .bind(record.tables.as_deref())
    .bind(&contact_changes)
    .bind(record.done_by.as_str())
    .bind(record.recorded_at)
    .execute(&mut **tx)
    .await
    .map(|_| ())
    .map_err(|e| database_error("Failed to append audit entry", &e))
}

impl ReservationStore for PostgresReservationStore {
    fn list_tables(&self) -> BoxFuture<'_, Result<Vec<DiningTable>, StoreError>> {
        Box::pin(async move {
            let rows = sqlx::query("SELECT id, capacity FROM dining_tables ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| database_error("Failed to list tables", &e))?;

            rows.iter()
                .map(|row| {
                    let id: i32 = row
                        .try_get("id")
                        .map_err(|e| database_error("Failed to decode table", &e))?;
                    let capacity: i32 = row
                        .try_get("capacity")
                        .map_err(|e| database_error("Failed to decode table", &e))?;
                    let capacity = u32::try_from(capacity).map_err(|_| {
                        StoreError::Database(format!("Invalid capacity for table {id}"))
                    })?;
                    Ok(DiningTable::new(table_id_from_column(id)?, capacity))
                })
                .collect()
        })
    }

    fn get_reservation(
        &self,
        id: ReservationId,
    ) -> BoxFuture<'_, Result<Option<Reservation>, StoreError>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
            ))
            .bind(id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error("Failed to get reservation", &e))?;

            Ok(self.load_reservations(rows).await?.into_iter().next())
        })
    }

    fn active_reservations_at(
        &self,
        date: NaiveDate,
        slot: &TimeSlot,
    ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>> {
        let label = slot.label().to_string();
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                r"
                SELECT {RESERVATION_COLUMNS}
                FROM reservations
                WHERE reservation_date = $1 AND time_slot = $2 AND cancelled_at IS NULL
                ORDER BY id
                "
            ))
            .bind(date)
            .bind(label)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error("Failed to load reservations", &e))?;

            self.load_reservations(rows).await
        })
    }

    fn reservations_on(
        &self,
        date: NaiveDate,
    ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE reservation_date = $1"
            ))
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error("Failed to load reservations", &e))?;

            let mut day = self.load_reservations(rows).await?;
            day.sort_by(|a, b| a.time_slot.cmp(&b.time_slot).then(a.id.cmp(&b.id)));
            Ok(day)
        })
    }

    fn insert_reservation(
        &self,
        draft: ReservationDraft,
        audit: AuditRecord,
    ) -> BoxFuture<'_, Result<Reservation, StoreError>> {
        Box::pin(async move {
            let mut tx = self.begin().await?;
            lock_slot(&mut tx, draft.date, &draft.time_slot).await?;
            ensure_tables_exist(&mut tx, &draft.tables).await?;

            let taken = taken_tables(&mut tx, draft.date, &draft.time_slot, &draft.tables, None)
                .await?;
            if !taken.is_empty() {
                return Err(StoreError::Conflict { tables: taken });
            }

            let id: i64 = sqlx::query_scalar(
                r"
                INSERT INTO reservations
                    (reservation_date, time_slot, name, email, phone, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                RETURNING id
                ",
            )
            .bind(draft.date)
            .bind(draft.time_slot.label())
            .bind(&draft.contact.name)
            .bind(&draft.contact.email)
            .bind(&draft.contact.phone)
            .bind(ReservationStatus::Pending.as_str())
            .bind(draft.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| database_error("Failed to insert reservation", &e))?;

            let reservation = Reservation::from_draft(ReservationId::new(id), draft);
            assign_tables(&mut tx, &reservation).await?;
            append_log(&mut tx, reservation.id, &audit).await?;
            commit(tx).await?;

            tracing::debug!(reservation_id = id, "Inserted reservation");
            Ok(reservation)
        })
    }

    fn update_reservation(
        &self,
        reservation: Reservation,
        audit: AuditRecord,
    ) -> BoxFuture<'_, Result<Reservation, StoreError>> {
        Box::pin(async move {
            let mut tx = self.begin().await?;
            lock_slot(&mut tx, reservation.date, &reservation.time_slot).await?;
            ensure_tables_exist(&mut tx, &reservation.tables).await?;

            let taken = taken_tables(
                &mut tx,
                reservation.date,
                &reservation.time_slot,
                &reservation.tables,
                Some(reservation.id),
            )
            .await?;
            if !taken.is_empty() {
                return Err(StoreError::Conflict { tables: taken });
            }

            let updated = sqlx::query(
                r"
                UPDATE reservations
                SET reservation_date = $2, time_slot = $3, name = $4, email = $5,
                    phone = $6, updated_at = $7
                WHERE id = $1 AND cancelled_at IS NULL
                ",
            )
            .bind(reservation.id.get())
            .bind(reservation.date)
            .bind(reservation.time_slot.label())
            .bind(&reservation.contact.name)
            .bind(&reservation.contact.email)
            .bind(&reservation.contact.phone)
            .bind(reservation.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| database_error("Failed to update reservation", &e))?;

            if updated.rows_affected() == 0 {
                return Err(StoreError::NotFound(reservation.id));
            }

            sqlx::query("DELETE FROM reservation_tables WHERE reservation_id = $1")
                .bind(reservation.id.get())
                .execute(&mut *tx)
                .await
                .map_err(|e| database_error("Failed to release tables", &e))?;

            assign_tables(&mut tx, &reservation).await?;
            append_log(&mut tx, reservation.id, &audit).await?;
            commit(tx).await?;

            Ok(reservation)
        })
    }

    fn cancel_reservation(
        &self,
        id: ReservationId,
        cancelled_at: DateTime<Utc>,
        audit: AuditRecord,
    ) -> BoxFuture<'_, Result<Reservation, StoreError>> {
        Box::pin(async move {
            let mut tx = self.begin().await?;

            let row = sqlx::query(&format!(
                r"
                UPDATE reservations
                SET cancelled_at = $2, updated_at = $2
                WHERE id = $1 AND cancelled_at IS NULL
                RETURNING {RESERVATION_COLUMNS}
                "
            ))
            .bind(id.get())
            .bind(cancelled_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| database_error("Failed to cancel reservation", &e))?
            .ok_or(StoreError::NotFound(id))?;

            let released: Vec<i32> = sqlx::query_scalar(
                r"
                UPDATE reservation_tables SET active = FALSE
                WHERE reservation_id = $1
                RETURNING table_id
                ",
            )
            .bind(id.get())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| database_error("Failed to release tables", &e))?;

            let tables = released
                .into_iter()
                .map(table_id_from_column)
                .collect::<Result<Vec<_>, _>>()?;
            let reservation = reservation_from_row(&row, tables)?;

            append_log(&mut tx, id, &audit).await?;
            commit(tx).await?;
            Ok(reservation)
        })
    }
}

impl AuditLog for PostgresReservationStore {
    fn entries_for(
        &self,
        reservation_id: ReservationId,
    ) -> BoxFuture<'_, Result<Vec<AuditLogEntry>, StoreError>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {LOG_COLUMNS} FROM reservation_logs WHERE reservation_id = $1 ORDER BY id"
            ))
            .bind(reservation_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error("Failed to load audit entries", &e))?;

            rows.iter().map(log_entry_from_row).collect()
        })
    }

    fn recent(&self, limit: usize) -> BoxFuture<'_, Result<Vec<AuditLogEntry>, StoreError>> {
        Box::pin(async move {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = sqlx::query(&format!(
                "SELECT {LOG_COLUMNS} FROM reservation_logs ORDER BY id DESC LIMIT $1"
            ))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error("Failed to load audit entries", &e))?;

            rows.iter().map(log_entry_from_row).collect()
        })
    }
}
