use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A BISO membership as reported for a student id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
  pub membership_id: String,
  pub name: String,
  pub price: f64,
  pub category: String,
  pub status: bool,
  pub expiry_date: Option<String>,
}

/// Membership view derived from the profile's student id. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipStatus {
  pub membership: Option<Membership>,
  pub is_biso_member: bool,
  pub membership_expiry: Option<NaiveDate>,
}

impl MembershipStatus {
  pub fn from_membership(membership: Option<Membership>) -> Self {
    let is_biso_member = membership.as_ref().is_some_and(|m| m.status);
    let membership_expiry = membership
      .as_ref()
      .and_then(|m| m.expiry_date.as_deref())
      .and_then(parse_expiry);

    Self {
      membership,
      is_biso_member,
      membership_expiry,
    }
  }
}

/// Parse an expiry date given as `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_expiry(s: &str) -> Option<NaiveDate> {
  let s = s.trim();
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.date_naive()))
    .or_else(|| {
      NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|d| d.date())
    })
}
