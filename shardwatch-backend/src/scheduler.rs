//! Settle pending records into tier transitions.
//!
//! A record is pending while its `last_notice` trails its `last_update`. Settling
//! recomputes the tier gates, emits one transition per gate that flipped, and moves
//! `last_notice` forward so the same change is never settled twice.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shardwatch_db::{ServerRecord, ServerStatus, StateStore, Tier, TierGates};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionKind {
    Granted,
    Revoked,
}

/// One tier gate flipping on one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierTransition {
    pub server: String,
    pub tier: Tier,
    pub kind: TransitionKind,
}

impl TierTransition {
    /// Player-facing notice text.
    pub fn message(&self) -> String {
        match self.kind {
            TransitionKind::Granted => format!(
                "The server '{}' is now online and allowing access to {} players.",
                self.server,
                self.tier.label()
            ),
            TransitionKind::Revoked => format!(
                "The server '{}' is no longer online or allowing access to {} players.",
                self.server,
                self.tier.label()
            ),
        }
    }
}

impl fmt::Display for TierTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            TransitionKind::Granted => "grant",
            TransitionKind::Revoked => "revoke",
        };
        write!(f, "{verb} {} on {}", self.tier, self.server)
    }
}

/// Outcome of settling every pending record.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SettleReport {
    /// Number of records whose notice caught up in this pass.
    pub settled: usize,
    pub transitions: Vec<TierTransition>,
}

/// Settle a single record. Transitions come out highest privilege first.
pub fn settle(record: &mut ServerRecord, now: DateTime<Utc>) -> Vec<TierTransition> {
    // shutdown fast path: every open gate closes without consulting the tier table
    let shutdown = record.status == ServerStatus::Offline || record.capacity <= 0;
    let target = if shutdown {
        TierGates::closed()
    } else {
        record.effective_gates()
    };

    let mut transitions = Vec::new();
    for tier in Tier::NOTIFIED {
        let was = record.tier_gates.get(tier);
        let is = target.get(tier);
        if was == is {
            continue;
        }
        record.tier_gates.set(tier, is);
        transitions.push(TierTransition {
            server: record.name.clone(),
            tier,
            kind: if is {
                TransitionKind::Granted
            } else {
                TransitionKind::Revoked
            },
        });
    }

    record.last_notice = now.max(record.last_update);
    transitions
}

/// Settle every pending record in the store.
pub fn settle_pending(store: &mut StateStore, now: DateTime<Utc>) -> SettleReport {
    let mut report = SettleReport::default();
    for record in store.records_mut().filter(|r| r.is_pending()) {
        info!(server = %record.name, "server status updated");
        report.transitions.extend(settle(record, now));
        report.settled += 1;
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(status: ServerStatus, tier: Tier, capacity: i64, gates: TierGates) -> ServerRecord {
        ServerRecord {
            name: "Hatchery".to_string(),
            status,
            access_tier: tier,
            capacity,
            api_host: "hatchery.example".to_string(),
            tier_gates: gates,
            last_update: at(10),
            last_notice: at(0),
            last_seen: at(10),
        }
    }

    fn kinds(transitions: &[TierTransition]) -> Vec<(Tier, TransitionKind)> {
        transitions.iter().map(|t| (t.tier, t.kind)).collect()
    }

    #[test]
    fn test_opening_grants_admitted_tiers_highest_first() {
        let mut r = record(ServerStatus::Online, Tier::Beta2, 100, TierGates::closed());

        let transitions = settle(&mut r, at(11));

        assert_eq!(
            kinds(&transitions),
            vec![
                (Tier::InternalTest, TransitionKind::Granted),
                (Tier::Alpha, TransitionKind::Granted),
                (Tier::Beta1, TransitionKind::Granted),
                (Tier::Beta2, TransitionKind::Granted),
            ]
        );
        assert_eq!(r.tier_gates, r.effective_gates());
        assert_eq!(r.last_notice, at(11));
    }

    #[test]
    fn test_grant_and_revoke_in_one_pass_do_not_cancel() {
        // tier raised from Beta1 to InternalTest: Alpha and Beta1 lose access, IT keeps it
        let gates = TierGates {
            internal_test: true,
            alpha: true,
            beta1: true,
            ..TierGates::closed()
        };
        let mut r = record(ServerStatus::Online, Tier::InternalTest, 100, gates);

        let transitions = settle(&mut r, at(11));

        assert_eq!(
            kinds(&transitions),
            vec![
                (Tier::Alpha, TransitionKind::Revoked),
                (Tier::Beta1, TransitionKind::Revoked),
            ]
        );

        // a stale gate set where IT was closed and Beta3 open: both flip independently
        let gates = TierGates {
            beta3: true,
            ..TierGates::closed()
        };
        let mut r = record(ServerStatus::Online, Tier::InternalTest, 100, gates);
        assert_eq!(
            kinds(&settle(&mut r, at(11))),
            vec![
                (Tier::InternalTest, TransitionKind::Granted),
                (Tier::Beta3, TransitionKind::Revoked),
            ]
        );
    }

    #[test]
    fn test_capacity_drop_revokes_everything_open() {
        let open = TierGates::admitted_by(ServerStatus::Online, Tier::Public, 50);
        let mut r = record(ServerStatus::Online, Tier::Public, 0, open);

        let transitions = settle(&mut r, at(11));

        assert_eq!(transitions.len(), 5);
        assert!(transitions.iter().all(|t| t.kind == TransitionKind::Revoked));
        assert_eq!(transitions[0].tier, Tier::InternalTest);
        assert_eq!(transitions[4].tier, Tier::Beta3);
        assert_eq!(r.tier_gates, TierGates::closed());
    }

    #[test]
    fn test_offline_revokes_only_open_gates() {
        let gates = TierGates {
            internal_test: true,
            ..TierGates::closed()
        };
        let mut r = record(ServerStatus::Offline, Tier::Public, 50, gates);

        assert_eq!(
            kinds(&settle(&mut r, at(11))),
            vec![(Tier::InternalTest, TransitionKind::Revoked)]
        );
    }

    #[test]
    fn test_notice_never_trails_update() {
        let mut r = record(ServerStatus::Online, Tier::Alpha, 50, TierGates::closed());
        r.last_update = at(20);

        settle(&mut r, at(15));

        assert!(r.last_notice >= r.last_update);
        assert!(!r.is_pending());
    }

    #[test]
    fn test_unchanged_gates_emit_nothing() {
        let gates = TierGates::admitted_by(ServerStatus::Online, Tier::Alpha, 50);
        let mut r = record(ServerStatus::Online, Tier::Alpha, 75, gates);

        assert!(settle(&mut r, at(11)).is_empty());
        assert_eq!(r.last_notice, at(11));
    }

    #[test]
    fn test_messages() {
        let granted = TierTransition {
            server: "Hatchery".to_string(),
            tier: Tier::Beta1,
            kind: TransitionKind::Granted,
        };
        assert_eq!(
            granted.message(),
            "The server 'Hatchery' is now online and allowing access to Beta 1 players."
        );
        let revoked = TierTransition {
            kind: TransitionKind::Revoked,
            tier: Tier::InternalTest,
            ..granted
        };
        assert_eq!(
            revoked.message(),
            "The server 'Hatchery' is no longer online or allowing access to IT players."
        );
        assert_eq!(revoked.to_string(), "revoke InternalTest on Hatchery");
    }

    #[tokio::test]
    async fn test_settle_pending_skips_settled_records() {
        let db = shardwatch_db::Database::open_in_memory().await.unwrap();
        let (mut store, _) = StateStore::load(db).await;
        let pending = record(ServerStatus::Online, Tier::Alpha, 50, TierGates::closed());
        let mut settled = pending.clone();
        settled.name = "Wyrmling".to_string();
        settled.last_notice = settled.last_update + TimeDelta::seconds(1);
        store.upsert(pending);
        store.upsert(settled);

        let report = settle_pending(&mut store, at(12));

        assert_eq!(report.settled, 1);
        assert_eq!(report.transitions.len(), 2);
        assert!(report.transitions.iter().all(|t| t.server == "Hatchery"));
        assert_eq!(store.find("Wyrmling").unwrap().tier_gates, TierGates::closed());

        let again = settle_pending(&mut store, at(13));
        assert_eq!(again, SettleReport::default());
    }
}
