//! # Marketplace Entities (the slice the ledger sees)
//!
//! Listings and auctions live their real lives elsewhere — creation,
//! images, bids, moderation are all out of scope here. The ledger only
//! needs the fields that spend operations read (owner, relist guards) and
//! the feature-expiry timestamps it is allowed to advance.
//!
//! `owner` is optional because early rows predate owner tracking; spends
//! against those skip the ownership check rather than locking everyone out
//! of their own legacy listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// How a listing sells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    /// Direct sale at a fixed price. The only kind that can be relisted.
    FixedPrice,
    /// Auction listing — duration is governed by the auction itself.
    Auction,
}

/// A product listing, reduced to what the ledger touches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    /// The selling user. `None` on legacy rows — ownership checks are
    /// skipped for those.
    pub owner: Option<String>,
    pub kind: ListingKind,
    /// Moderation approval. Relisting an unapproved listing is rejected.
    pub approved: bool,
    /// Whether the item sold. Sold listings cannot be relisted.
    pub sold: bool,
    /// How long the listing stays live. Advanced by the listing-fee and
    /// relist operations.
    pub listing_expires_at: Option<DateTime<Utc>>,
    /// Visibility boost window. Advanced by the boost operation.
    pub boost_expires_at: Option<DateTime<Utc>>,
    /// Homepage promotion window. Advanced by the promotion operation.
    pub promotion_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    /// A fresh, approved, unsold fixed-price listing with no feature
    /// windows. What the marketplace hands us right after moderation.
    pub fn new(id: Uuid, owner: Option<String>, kind: ListingKind) -> Self {
        Self {
            id,
            owner,
            kind,
            approved: true,
            sold: false,
            listing_expires_at: None,
            boost_expires_at: None,
            promotion_expires_at: None,
            created_at: Utc::now(),
        }
    }

    /// Rejects unless `user` owns this listing. Rows with no recorded
    /// owner pass — legacy data.
    pub fn authorize(&self, user: &str) -> Result<(), LedgerError> {
        authorize_owner(self.owner.as_deref(), user, self.id)
    }
}

/// An auction, reduced to what the ledger touches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Auction {
    pub id: Uuid,
    /// The selling user; `None` on legacy rows.
    pub owner: Option<String>,
    /// When the auction closes. Stamped when the creation fee is charged.
    pub ends_at: Option<DateTime<Utc>>,
    /// Homepage promotion window. Advanced by the promotion operation.
    pub promotion_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Auction {
    pub fn new(id: Uuid, owner: Option<String>) -> Self {
        Self {
            id,
            owner,
            ends_at: None,
            promotion_expires_at: None,
            created_at: Utc::now(),
        }
    }

    /// Rejects unless `user` owns this auction; legacy ownerless rows pass.
    pub fn authorize(&self, user: &str) -> Result<(), LedgerError> {
        authorize_owner(self.owner.as_deref(), user, self.id)
    }
}

fn authorize_owner(owner: Option<&str>, user: &str, entity: Uuid) -> Result<(), LedgerError> {
    match owner {
        Some(o) if o != user => Err(LedgerError::NotOwner {
            user: user.to_string(),
            entity,
        }),
        _ => Ok(()),
    }
}
