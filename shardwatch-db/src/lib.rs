mod error;
mod models;
mod store;
pub mod tier;

pub use error::{DbError, Result};
pub use models::{ServerRecord, ServerSnapshot, ServerStatus, TierGates, UnknownStatus};
pub use store::{PriorState, StateStore};
pub use tier::{Tier, UnknownTier, has_access};

use chrono::{DateTime, Utc};
use std::path::Path;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{self, params, types::Type};
use tracing::{debug, info, warn};

const UPSERT_SERVER: &str = r#"
    INSERT INTO servers (
        name, status, access_tier, capacity, api_host,
        gate_internal_test, gate_alpha, gate_beta1, gate_beta2, gate_beta3,
        last_update_ns, last_notice_ns, last_seen_ns
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
    ON CONFLICT(name) DO UPDATE SET
        status = excluded.status,
        access_tier = excluded.access_tier,
        capacity = excluded.capacity,
        api_host = excluded.api_host,
        gate_internal_test = excluded.gate_internal_test,
        gate_alpha = excluded.gate_alpha,
        gate_beta1 = excluded.gate_beta1,
        gate_beta2 = excluded.gate_beta2,
        gate_beta3 = excluded.gate_beta3,
        last_update_ns = excluded.last_update_ns,
        last_notice_ns = excluded.last_notice_ns,
        last_seen_ns = excluded.last_seen_ns
"#;

const SELECT_SERVERS: &str = r#"
    SELECT name, status, access_tier, capacity, api_host,
           gate_internal_test, gate_alpha, gate_beta1, gate_beta2, gate_beta3,
           last_update_ns, last_notice_ns, last_seen_ns
    FROM servers
    ORDER BY rowid
"#;

/// SQLite-backed persistence for tracked server records.
#[derive(Clone)]
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create a database at the given path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path).await.map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Create an in-memory database (useful for testing).
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .await
      .map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Initialize the database schema.
  async fn initialize(&self) -> Result<()> {
    self.conn
            .call(|conn| -> rusqlite::Result<()> {
                // WAL keeps readers off the writer's back and makes each commit atomic on disk
                conn.pragma_update(None, "journal_mode", "WAL")?;

                conn.execute_batch(
                    r#"
                    -- One row per tracked server; timestamps are nanoseconds since the Unix epoch
                    CREATE TABLE IF NOT EXISTS servers (
                        name TEXT PRIMARY KEY,
                        status TEXT NOT NULL,
                        access_tier TEXT NOT NULL,
                        capacity INTEGER NOT NULL,
                        api_host TEXT NOT NULL,
                        gate_internal_test INTEGER NOT NULL,
                        gate_alpha INTEGER NOT NULL,
                        gate_beta1 INTEGER NOT NULL,
                        gate_beta2 INTEGER NOT NULL,
                        gate_beta3 INTEGER NOT NULL,
                        last_update_ns INTEGER NOT NULL,
                        last_notice_ns INTEGER NOT NULL,
                        last_seen_ns INTEGER NOT NULL
                    );
                    "#,
                )?;
                Ok(())
            })
            .await?;

    info!("database initialized");
    Ok(())
  }

  /// Write every record in a single transaction. Either all rows land or none do.
  pub async fn save_records(&self, records: &[ServerRecord]) -> Result<()> {
    let rows = records
      .iter()
      .map(StoredRow::encode)
      .collect::<Result<Vec<_>>>()?;
    let count = rows.len();

    self
      .conn
      .call(move |conn| -> rusqlite::Result<()> {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare_cached(UPSERT_SERVER)?;
          for row in &rows {
            stmt.execute(params![
              &row.record.name,
              row.record.status.as_str(),
              row.record.access_tier.as_str(),
              row.record.capacity,
              &row.record.api_host,
              row.record.tier_gates.internal_test,
              row.record.tier_gates.alpha,
              row.record.tier_gates.beta1,
              row.record.tier_gates.beta2,
              row.record.tier_gates.beta3,
              row.last_update_ns,
              row.last_notice_ns,
              row.last_seen_ns,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(count, "saved server records");
    Ok(())
  }

  /// Read every stored record in insertion order.
  ///
  /// A row that fails typed decoding is logged and skipped; the rest still load.
  pub async fn load_records(&self) -> Result<Vec<ServerRecord>> {
    let (records, skipped) = self
      .conn
      .call(|conn| -> rusqlite::Result<(Vec<ServerRecord>, usize)> {
        let mut stmt = conn.prepare_cached(SELECT_SERVERS)?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        let mut skipped = 0;
        while let Some(row) = rows.next()? {
          match decode_row(row) {
            Ok(record) => records.push(record),
            Err(err) => {
              let name: Option<String> = row.get(0).ok();
              warn!(?name, %err, "skipping unreadable server row");
              skipped += 1;
            }
          }
        }
        Ok((records, skipped))
      })
      .await?;

    debug!(count = records.len(), skipped, "loaded server records");
    Ok(records)
  }
}

fn decode_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServerRecord> {
  Ok(ServerRecord {
    name: row.get(0)?,
    status: parse_column(1, row.get(1)?)?,
    access_tier: parse_column(2, row.get(2)?)?,
    capacity: row.get(3)?,
    api_host: row.get(4)?,
    tier_gates: TierGates {
      internal_test: row.get(5)?,
      alpha: row.get(6)?,
      beta1: row.get(7)?,
      beta2: row.get(8)?,
      beta3: row.get(9)?,
    },
    last_update: DateTime::<Utc>::from_timestamp_nanos(row.get(10)?),
    last_notice: DateTime::<Utc>::from_timestamp_nanos(row.get(11)?),
    last_seen: DateTime::<Utc>::from_timestamp_nanos(row.get(12)?),
  })
}

/// A record with its timestamps already reduced to storable integers.
struct StoredRow {
  record: ServerRecord,
  last_update_ns: i64,
  last_notice_ns: i64,
  last_seen_ns: i64,
}

impl StoredRow {
  fn encode(record: &ServerRecord) -> Result<Self> {
    let nanos = |at: DateTime<Utc>| {
      at.timestamp_nanos_opt()
        .ok_or_else(|| DbError::TimestampOutOfRange {
          server: record.name.clone(),
        })
    };
    Ok(Self {
      last_update_ns: nanos(record.last_update)?,
      last_notice_ns: nanos(record.last_notice)?,
      last_seen_ns: nanos(record.last_seen)?,
      record: record.clone(),
    })
  }
}

/// Strict parse of an enum column; unknown text marks the row as corrupt.
fn parse_column<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
  T: std::str::FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  raw
    .parse()
    .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}
