//! Emergency contacts, escalation tiers and delivery addresses.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, subject::GeoPoint};

// ─── Tier ────────────────────────────────────────────────────────────────────

/// An escalation band. Tier 1 is the closest, most trusted circle; higher
/// tiers widen outward.
///
/// Tiers are open-ended: the engine accepts any tier ≥ 1 and simply finds no
/// contacts above the highest one configured. Values past `u32::MAX`
/// saturate, which still matches no contacts.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "u32")]
pub struct Tier(u32);

impl Tier {
  pub const ONE: Tier = Tier(1);
  pub const TWO: Tier = Tier(2);
  pub const THREE: Tier = Tier(3);

  pub fn new(n: i64) -> Result<Self> {
    if n < 1 {
      return Err(Error::InvalidTier(n));
    }
    Ok(Tier(u32::try_from(n).unwrap_or(u32::MAX)))
  }

  pub fn get(self) -> u32 { self.0 }
}

impl TryFrom<i64> for Tier {
  type Error = Error;

  fn try_from(n: i64) -> Result<Self> { Tier::new(n) }
}

impl From<Tier> for u32 {
  fn from(t: Tier) -> u32 { t.0 }
}

impl fmt::Display for Tier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

// ─── Contact ─────────────────────────────────────────────────────────────────

/// A person a subject has designated to be told when something goes wrong.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
  pub contact_id:   Uuid,
  /// The monitored subject this contact belongs to.
  pub subject_id:   Uuid,
  /// The account that receives notifications on behalf of this contact.
  pub recipient_id: Uuid,
  pub tier:         Tier,
  /// Manual ordering hint; lower is notified earlier.
  pub priority:     Option<i32>,
  pub always_share: bool,
  /// Latest recorded position of the recipient, shared live or not.
  pub location:     Option<GeoPoint>,
}

// ─── Channels and addresses ──────────────────────────────────────────────────

/// A delivery mechanism for notifications.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChannelKind {
  Push,
  Email,
}

impl ChannelKind {
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownChannel(s.to_owned()))
  }
}

/// A single place a recipient can be reached on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
  pub channel: ChannelKind,
  /// Channel-specific target: a device token, an email address, …
  pub target:  String,
}

/// Every address a contact can currently be reached at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachableAddresses {
  pub addresses: Vec<Address>,
}

impl ReachableAddresses {
  pub fn new(addresses: Vec<Address>) -> Self { Self { addresses } }

  /// Targets registered for `channel`, in storage order.
  pub fn for_channel(&self, channel: ChannelKind) -> impl Iterator<Item = &str> {
    self
      .addresses
      .iter()
      .filter(move |a| a.channel == channel)
      .map(|a| a.target.as_str())
  }
}
