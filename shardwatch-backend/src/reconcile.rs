//! Fold a fresh status snapshot into the state store.
//!
//! Only the observable fields and `last_update` are touched here. Tier gates are
//! left for the notification pass, so a burst of upstream changes collapses into a
//! single settle.

use chrono::{DateTime, Utc};
use shardwatch_db::{ServerRecord, ServerSnapshot, StateStore};
use tracing::{debug, info};

/// What one reconciliation pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Servers tracked for the first time.
    pub added: Vec<String>,
    /// Servers whose status, tier or capacity changed.
    pub changed: Vec<String>,
    pub unchanged: usize,
}

impl ReconcileReport {
    pub fn is_quiet(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty()
    }
}

pub fn reconcile(store: &mut StateStore, snapshot: &[ServerSnapshot], now: DateTime<Utc>) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for entry in snapshot {
        match store.find_mut(&entry.name) {
            Some(record) => {
                record.last_seen = now;
                if record.differs_from(entry) {
                    debug!(
                        server = %entry.name,
                        from_status = %record.status,
                        to_status = %entry.status,
                        from_tier = %record.access_tier,
                        to_tier = %entry.access_tier,
                        from_capacity = record.capacity,
                        to_capacity = entry.capacity,
                        "server state changed"
                    );
                    record.apply(entry, now);
                    report.changed.push(entry.name.clone());
                } else {
                    report.unchanged += 1;
                }
            }
            None => {
                info!(server = %entry.name, status = %entry.status, tier = %entry.access_tier, "new server added to tracking list");
                store.upsert(ServerRecord::first_seen(entry, now));
                report.added.push(entry.name.clone());
            }
        }
    }

    report
}

/// Admin notice for a server seen for the first time.
pub fn new_server_message(name: &str) -> String {
    format!("New server added to tracking list ({name}).")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use shardwatch_db::{Database, ServerStatus, Tier, TierGates};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn entry(name: &str, status: ServerStatus, tier: Tier, capacity: i64) -> ServerSnapshot {
        ServerSnapshot {
            name: name.to_string(),
            status,
            access_tier: tier,
            capacity,
            api_host: format!("{name}.example"),
        }
    }

    async fn empty_store() -> StateStore {
        let db = Database::open_in_memory().await.unwrap();
        StateStore::load(db).await.0
    }

    #[tokio::test]
    async fn test_first_sight_creates_settled_record() {
        let mut store = empty_store().await;

        let report = reconcile(&mut store, &[entry("Hatchery", ServerStatus::Offline, Tier::Alpha, 0)], at(0));

        assert_eq!(report.added, vec!["Hatchery"]);
        let record = store.find("Hatchery").unwrap();
        assert_eq!(record.tier_gates, TierGates::closed());
        assert_eq!(record.last_update, at(0));
        assert_eq!(record.last_notice, at(0));
        assert!(!record.is_pending());
    }

    #[tokio::test]
    async fn test_identical_snapshot_is_a_no_op() {
        let mut store = empty_store().await;
        let snapshot = [entry("Hatchery", ServerStatus::Online, Tier::Alpha, 50)];
        reconcile(&mut store, &snapshot, at(0));

        let report = reconcile(&mut store, &snapshot, at(10));

        assert!(report.is_quiet());
        assert_eq!(report.unchanged, 1);
        let record = store.find("Hatchery").unwrap();
        assert_eq!(record.last_update, at(0));
        assert_eq!(record.last_seen, at(10));
    }

    #[tokio::test]
    async fn test_change_updates_fields_but_not_gates() {
        let mut store = empty_store().await;
        reconcile(&mut store, &[entry("Hatchery", ServerStatus::Offline, Tier::Alpha, 0)], at(0));

        let mut moved = entry("Hatchery", ServerStatus::Online, Tier::Alpha, 50);
        moved.api_host = "new-host.example".to_string();
        let report = reconcile(&mut store, &[moved], at(10));

        assert_eq!(report.changed, vec!["Hatchery"]);
        let record = store.find("Hatchery").unwrap();
        assert_eq!(record.status, ServerStatus::Online);
        assert_eq!(record.capacity, 50);
        assert_eq!(record.api_host, "new-host.example");
        assert_eq!(record.tier_gates, TierGates::closed());
        assert_eq!(record.last_update, at(10));
        assert!(record.is_pending());
    }

    #[tokio::test]
    async fn test_missing_server_is_left_untouched() {
        let mut store = empty_store().await;
        reconcile(
            &mut store,
            &[
                entry("Hatchery", ServerStatus::Online, Tier::Alpha, 50),
                entry("Wyrmling", ServerStatus::Online, Tier::Beta1, 50),
            ],
            at(0),
        );

        reconcile(&mut store, &[entry("Hatchery", ServerStatus::Online, Tier::Alpha, 50)], at(600));

        let gone = store.find("Wyrmling").unwrap();
        assert_eq!(gone.last_seen, at(0));
        assert!(gone.is_stale(at(600), TimeDelta::seconds(300)));
        assert!(!store.find("Hatchery").unwrap().is_stale(at(600), TimeDelta::seconds(300)));
    }

    #[test]
    fn test_new_server_message() {
        assert_eq!(
            new_server_message("Hatchery"),
            "New server added to tracking list (Hatchery)."
        );
    }
}
