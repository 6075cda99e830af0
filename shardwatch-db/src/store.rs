//! Authoritative in-memory collection of tracked servers, mirrored to SQLite.
//!
//! Memory is updated immediately; disk is brought in line by [`StateStore::persist`].
//! A failed persist leaves memory as it is, and the next successful one carries the
//! missed changes.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::{Database, Result, ServerRecord};

/// What [`StateStore::load`] found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorState {
  /// Records were restored.
  Restored(usize),
  /// Storage exists but holds no records.
  Empty,
  /// The stored table could not be queried; starting from nothing.
  Unreadable(String),
}

pub struct StateStore {
  db: Database,
  records: Vec<ServerRecord>,
}

impl StateStore {
  /// Open the store at `path`, moving a corrupt database file aside first if needed.
  ///
  /// Only a file SQLite rejects as corrupt or foreign is moved. Every other open
  /// failure is returned, leaving the file where it is.
  pub async fn open(path: impl AsRef<Path>) -> Result<(Self, PriorState)> {
    let path = path.as_ref();
    let db = match Database::open(path).await {
      Ok(db) => db,
      Err(err) if !err.is_corrupt_file() => return Err(err),
      Err(err) => {
        let aside = quarantine_path(path);
        error!(%err, path = %path.display(), aside = %aside.display(), "state database corrupt, starting fresh");
        tokio::fs::rename(path, &aside).await?;
        Database::open(path).await?
      }
    };
    Ok(Self::load(db).await)
  }

  /// Load whatever `db` holds. Never fails: unreadable state yields an empty store.
  pub async fn load(db: Database) -> (Self, PriorState) {
    let (records, prior) = match db.load_records().await {
      Ok(records) if records.is_empty() => (Vec::new(), PriorState::Empty),
      Ok(records) => {
        let count = records.len();
        (records, PriorState::Restored(count))
      }
      Err(err) => {
        warn!(%err, "no prior server state could be read");
        (Vec::new(), PriorState::Unreadable(err.to_string()))
      }
    };
    if let PriorState::Restored(count) = prior {
      info!(count, "restored tracked servers");
    }
    (Self { db, records }, prior)
  }

  pub fn find(&self, name: &str) -> Option<&ServerRecord> {
    self.records.iter().find(|r| r.name == name)
  }

  pub fn find_mut(&mut self, name: &str) -> Option<&mut ServerRecord> {
    self.records.iter_mut().find(|r| r.name == name)
  }

  /// Insert `record`, or replace the record with the same name in place.
  pub fn upsert(&mut self, record: ServerRecord) {
    match self.find_mut(&record.name) {
      Some(existing) => *existing = record,
      None => self.records.push(record),
    }
  }

  pub fn records(&self) -> &[ServerRecord] {
    &self.records
  }

  pub fn records_mut(&mut self) -> impl Iterator<Item = &mut ServerRecord> {
    self.records.iter_mut()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Write the whole collection to disk atomically.
  pub async fn persist(&self) -> Result<()> {
    self.db.save_records(&self.records).await
  }
}

fn quarantine_path(path: &Path) -> PathBuf {
  let mut name = path.as_os_str().to_owned();
  name.push(".corrupt");
  PathBuf::from(name)
}
