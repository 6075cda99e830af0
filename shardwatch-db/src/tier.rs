//! Access tiers and the admission rule between a player's tier and a server's tier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Access tier, ordered from least to most privileged.
///
/// The derived ordering follows declaration order, which matches [`Tier::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
  Invalid,
  Public,
  Beta3,
  Beta2,
  Beta1,
  Alpha,
  InternalTest,
  Employees,
}

/// An upstream tier string that does not name any [`Tier`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unrecognized access tier: {0:?}")]
pub struct UnknownTier(pub String);

impl Tier {
  pub const ALL: [Tier; 8] = [
    Tier::Invalid,
    Tier::Public,
    Tier::Beta3,
    Tier::Beta2,
    Tier::Beta1,
    Tier::Alpha,
    Tier::InternalTest,
    Tier::Employees,
  ];

  /// Tiers that receive admission notices, highest privilege first.
  /// Public and Employees are never notified.
  pub const NOTIFIED: [Tier; 5] = [
    Tier::InternalTest,
    Tier::Alpha,
    Tier::Beta1,
    Tier::Beta2,
    Tier::Beta3,
  ];

  pub fn rank(self) -> i8 {
    match self {
      Tier::Invalid => -1,
      Tier::Public => 0,
      Tier::Beta3 => 1,
      Tier::Beta2 => 2,
      Tier::Beta1 => 3,
      Tier::Alpha => 4,
      Tier::InternalTest => 5,
      Tier::Employees => 6,
    }
  }

  /// Wire name, as the upstream API spells it.
  pub fn as_str(self) -> &'static str {
    match self {
      Tier::Invalid => "Invalid",
      Tier::Public => "Public",
      Tier::Beta3 => "Beta3",
      Tier::Beta2 => "Beta2",
      Tier::Beta1 => "Beta1",
      Tier::Alpha => "Alpha",
      Tier::InternalTest => "InternalTest",
      Tier::Employees => "Employees",
    }
  }

  /// Human-facing name used in notice text.
  pub fn label(self) -> &'static str {
    match self {
      Tier::InternalTest => "IT",
      Tier::Beta1 => "Beta 1",
      Tier::Beta2 => "Beta 2",
      Tier::Beta3 => "Beta 3",
      other => other.as_str(),
    }
  }

  /// Tier of a requesting player. Unknown names are the least privileged.
  pub fn for_user(raw: &str) -> Tier {
    raw.parse().unwrap_or(Tier::Invalid)
  }

  /// Tier a server is gated at. Unknown names fail closed to [`Tier::Employees`].
  pub fn for_server(raw: &str) -> Tier {
    match raw.parse() {
      Ok(tier) => tier,
      Err(err) => {
        error!(%err, "server reported unexpected access level, treating as Employees");
        Tier::Employees
      }
    }
  }
}

impl FromStr for Tier {
  type Err = UnknownTier;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Tier::ALL
      .into_iter()
      .find(|tier| tier.as_str() == s)
      .ok_or_else(|| UnknownTier(s.to_string()))
  }
}

impl fmt::Display for Tier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Whether a player at `user` may join a server gated at `server`.
pub fn has_access(user: Tier, server: Tier) -> bool {
  user == server || user.rank() >= server.rank()
}

/// [`has_access`] over raw upstream names, with fail-closed coercion on both sides.
pub fn has_access_raw(user: &str, server: &str) -> bool {
  if user == server {
    return true;
  }
  has_access(Tier::for_user(user), Tier::for_server(server))
}
