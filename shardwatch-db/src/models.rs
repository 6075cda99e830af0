use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::tier::{Tier, has_access};

/// Availability reported by the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerStatus {
  Online,
  Offline,
  Unknown,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unrecognized server status: {0:?}")]
pub struct UnknownStatus(pub String);

impl ServerStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      ServerStatus::Online => "Online",
      ServerStatus::Offline => "Offline",
      ServerStatus::Unknown => "Unknown",
    }
  }

  /// Lenient parse for upstream data. Anything unexpected becomes `Unknown`.
  pub fn from_upstream(raw: &str) -> ServerStatus {
    match raw.parse() {
      Ok(status) => status,
      Err(err) => {
        error!(%err, "server reported unexpected status, treating as Unknown");
        ServerStatus::Unknown
      }
    }
  }
}

impl FromStr for ServerStatus {
  type Err = UnknownStatus;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "Online" => Ok(ServerStatus::Online),
      "Offline" => Ok(ServerStatus::Offline),
      "Unknown" => Ok(ServerStatus::Unknown),
      other => Err(UnknownStatus(other.to_string())),
    }
  }
}

impl fmt::Display for ServerStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Per-tier "currently admitted" flags for the notified tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierGates {
  #[serde(rename = "InternalTest")]
  pub internal_test: bool,
  #[serde(rename = "Alpha")]
  pub alpha: bool,
  #[serde(rename = "Beta1")]
  pub beta1: bool,
  #[serde(rename = "Beta2")]
  pub beta2: bool,
  #[serde(rename = "Beta3")]
  pub beta3: bool,
}

impl TierGates {
  /// All gates shut.
  pub fn closed() -> Self {
    Self::default()
  }

  /// Gates a server in the given state admits.
  pub fn admitted_by(status: ServerStatus, access_tier: Tier, capacity: i64) -> Self {
    let mut gates = Self::closed();
    if status == ServerStatus::Online && capacity > 0 {
      for tier in Tier::NOTIFIED {
        gates.set(tier, has_access(tier, access_tier));
      }
    }
    gates
  }

  /// Flag for a notified tier. Tiers outside [`Tier::NOTIFIED`] read as false.
  pub fn get(&self, tier: Tier) -> bool {
    match tier {
      Tier::InternalTest => self.internal_test,
      Tier::Alpha => self.alpha,
      Tier::Beta1 => self.beta1,
      Tier::Beta2 => self.beta2,
      Tier::Beta3 => self.beta3,
      _ => false,
    }
  }

  /// Set the flag for a notified tier. Other tiers are ignored.
  pub fn set(&mut self, tier: Tier, granted: bool) {
    match tier {
      Tier::InternalTest => self.internal_test = granted,
      Tier::Alpha => self.alpha = granted,
      Tier::Beta1 => self.beta1 = granted,
      Tier::Beta2 => self.beta2 = granted,
      Tier::Beta3 => self.beta3 = granted,
      _ => {}
    }
  }

  pub fn any(&self) -> bool {
    Tier::NOTIFIED.into_iter().any(|tier| self.get(tier))
  }
}

/// One server as reported by a single status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSnapshot {
  pub name: String,
  pub status: ServerStatus,
  pub access_tier: Tier,
  pub capacity: i64,
  pub api_host: String,
}

/// Last-known state of a tracked server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerRecord {
  pub name: String,
  pub status: ServerStatus,
  pub access_tier: Tier,
  /// Player maximum. Zero or less means the server is effectively offline.
  pub capacity: i64,
  /// Opaque routing host, stored as reported.
  pub api_host: String,
  pub tier_gates: TierGates,
  /// Last observed change from the status source.
  pub last_update: DateTime<Utc>,
  /// Last settled notification pass.
  pub last_notice: DateTime<Utc>,
  /// Last poll whose snapshot contained this server.
  pub last_seen: DateTime<Utc>,
}

impl ServerRecord {
  /// Record for a server seen for the first time. Gates are seeded from the
  /// reported state and the record is already settled, so first sight never
  /// produces transitions.
  pub fn first_seen(snapshot: &ServerSnapshot, now: DateTime<Utc>) -> Self {
    Self {
      name: snapshot.name.clone(),
      status: snapshot.status,
      access_tier: snapshot.access_tier,
      capacity: snapshot.capacity,
      api_host: snapshot.api_host.clone(),
      tier_gates: TierGates::admitted_by(snapshot.status, snapshot.access_tier, snapshot.capacity),
      last_update: now,
      last_notice: now,
      last_seen: now,
    }
  }

  /// Whether status, tier or capacity differ from the snapshot. The api host alone
  /// does not count as a change.
  pub fn differs_from(&self, snapshot: &ServerSnapshot) -> bool {
    self.status != snapshot.status
      || self.access_tier != snapshot.access_tier
      || self.capacity != snapshot.capacity
  }

  /// Take the observable fields from the snapshot and mark the record pending.
  pub fn apply(&mut self, snapshot: &ServerSnapshot, now: DateTime<Utc>) {
    self.status = snapshot.status;
    self.access_tier = snapshot.access_tier;
    self.capacity = snapshot.capacity;
    self.api_host = snapshot.api_host.clone();
    // the wall clock may not have moved past the last notice
    self.last_update = now.max(self.last_notice + TimeDelta::nanoseconds(1));
  }

  /// Observed state is ahead of the last settled notice.
  pub fn is_pending(&self) -> bool {
    self.last_notice < self.last_update
  }

  /// Online with room for players.
  pub fn is_admitting(&self) -> bool {
    self.status == ServerStatus::Online && self.capacity > 0
  }

  pub fn is_stale(&self, now: DateTime<Utc>, stale_after: TimeDelta) -> bool {
    now - self.last_seen > stale_after
  }

  /// Gates implied by the current observable fields.
  pub fn effective_gates(&self) -> TierGates {
    TierGates::admitted_by(self.status, self.access_tier, self.capacity)
  }
}
