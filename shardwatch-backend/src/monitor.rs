//! The two timers: a poll loop that reconciles upstream snapshots into the store,
//! and a faster notice loop that settles pending records and delivers transitions.
//!
//! Both loops go through the same store mutex. Network I/O (the status fetch and
//! notice delivery) happens with the lock released.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::notifier::{Audience, Notifier};
use crate::reconcile::{self, ReconcileReport};
use crate::scheduler::{self, SettleReport};
use crate::source::{SourceUnavailable, StatusSource};
use shardwatch_db::StateStore;

/// The state store, shared between the timers and the read-only query surfaces.
pub type SharedStore = Arc<Mutex<StateStore>>;

#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    pub poll: Duration,
    pub notify: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(10),
            notify: Duration::from_secs(1),
        }
    }
}

pub struct Monitor<S, N> {
    store: SharedStore,
    source: S,
    notifier: N,
    intervals: Intervals,
}

impl<S, N> Monitor<S, N>
where
    S: StatusSource,
    N: Notifier,
{
    pub fn new(store: SharedStore, source: S, notifier: N, intervals: Intervals) -> Self {
        Self {
            store,
            source,
            notifier,
            intervals,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// One poll: fetch, reconcile, persist, then tell admins about new servers.
    ///
    /// A failed fetch leaves the store untouched.
    pub async fn poll_once(&self) -> Result<ReconcileReport, SourceUnavailable> {
        let snapshot = self.source.fetch_all().await?;

        let report = {
            let mut store = self.store.lock().await;
            let report = reconcile::reconcile(&mut store, &snapshot, Utc::now());
            if let Err(err) = store.persist().await {
                error!(%err, "unable to write server state after poll");
            }
            report
        };

        let messages: Vec<String> = report
            .added
            .iter()
            .map(|name| reconcile::new_server_message(name))
            .collect();
        join_all(
            messages
                .iter()
                .map(|message| self.notifier.notify(Audience::Admin, message)),
        )
        .await;
        Ok(report)
    }

    /// One notice pass: settle pending records, persist, then deliver.
    ///
    /// Gates and `last_notice` are on disk before any delivery starts, so a crash
    /// mid-delivery can lose a notice but never repeat one. Transitions are delivered
    /// concurrently; a slow tier does not hold up the others.
    pub async fn notify_once(&self) -> SettleReport {
        let report = {
            let mut store = self.store.lock().await;
            let report = scheduler::settle_pending(&mut store, Utc::now());
            if report.settled > 0 {
                match store.persist().await {
                    Ok(()) => info!(settled = report.settled, "server data saved"),
                    Err(err) => error!(%err, "unable to write server state after notices"),
                }
            }
            report
        };

        let notices: Vec<(Audience, String)> = report
            .transitions
            .iter()
            .map(|t| (Audience::Players(t.tier), t.message()))
            .collect();
        join_all(
            notices
                .iter()
                .map(|(audience, message)| self.notifier.notify(*audience, message)),
        )
        .await;
        for transition in &report.transitions {
            info!(%transition, "tier notice sent");
        }
        report
    }

    pub async fn run_polling(&self) {
        let mut ticker = time::interval(self.intervals.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.poll_once().await {
                warn!(%err, "polling of server data failed");
            }
        }
    }

    pub async fn run_notifications(&self) {
        let mut ticker = time::interval(self.intervals.notify);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.notify_once().await;
        }
    }

    /// Drive both timers until the future is dropped.
    pub async fn run(&self) {
        info!(
            poll = ?self.intervals.poll,
            notify = ?self.intervals.notify,
            "monitor started"
        );
        tokio::join!(self.run_polling(), self.run_notifications());
    }
}
