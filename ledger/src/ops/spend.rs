//! # Spend Operations
//!
//! Every way credits leave an account: boosts, collection subscriptions,
//! auction creation fees, listing fees, relists, and promotions. All of
//! them run the same sequence inside one optimistic transaction:
//!
//! 1. idempotency-key replay check
//! 2. load + expiry-normalize the account
//! 3. load + authorize the target entity (where there is one)
//! 4. operation-specific guards and expiry stacking
//! 5. charge, promotional pool first
//! 6. commit account, entity, and receipt together
//!
//! An error at any step aborts the transaction — a failed spend leaves
//! zero writes behind, including the normalization. Two racing spends
//! over the same account conflict on the account key; sled re-runs the
//! loser against the committed balance, so overspending is impossible
//! without a single lock.
//!
//! The audit entry is appended after the commit and is best-effort, per
//! the ledger-log contract in [`crate::store`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionError;
use sled::Transactional;
use uuid::Uuid;

use crate::account::Account;
use crate::config;
use crate::entry::{EntryKind, LedgerEntry};
use crate::error::{LedgerError, LedgerResult};
use crate::fees::{self, FeeError};
use crate::market::{Auction, Listing, ListingKind};
use crate::store::{decode, encode, unwrap_txn};

use super::{abort, charge, Ledger};

// ---------------------------------------------------------------------------
// SpendReceipt
// ---------------------------------------------------------------------------

/// What a successful spend returns, and what gets stored under the
/// caller's idempotency key.
///
/// A replayed spend returns the stored receipt with `replayed` flipped
/// on, so callers can tell "charged now" from "charged earlier".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpendReceipt {
    /// The spend kind this receipt settles.
    pub kind: EntryKind,
    /// Total credits charged.
    pub cost: u64,
    /// Portion taken from the promotional pool.
    pub promo_spent: u64,
    /// Portion taken from the permanent pool.
    pub permanent_spent: u64,
    /// Spendable credits left after the charge.
    pub remaining_credits: u64,
    /// The feature expiry this spend produced, where the operation has one.
    pub expires_at: Option<DateTime<Utc>>,
    /// `true` when this receipt was served from the idempotency store
    /// rather than charged fresh. Never stored as `true`.
    pub replayed: bool,
}

/// Target selection for a homepage promotion: exactly one of the two ids.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct PromotionRequest {
    /// Promote a product listing.
    pub product_id: Option<Uuid>,
    /// Promote an auction.
    pub auction_id: Option<Uuid>,
    /// Promotion window; defaults to
    /// [`config::PROMOTION_DEFAULT_DURATION_HOURS`].
    pub duration_hours: Option<u32>,
}

// ---------------------------------------------------------------------------
// Transaction shapes
// ---------------------------------------------------------------------------

impl Ledger {
    /// A spend that charges the account and mutates one listing, atomically.
    ///
    /// `apply` runs operation-specific guards and expiry stacking against
    /// the loaded listing; an `Err` aborts the whole transaction.
    fn spend_on_listing<F>(
        &self,
        user_id: &str,
        listing_id: Uuid,
        cost: u64,
        kind: EntryKind,
        idempotency_key: Option<Uuid>,
        apply: F,
    ) -> LedgerResult<SpendReceipt>
    where
        F: Fn(&mut Listing, DateTime<Utc>) -> Result<Option<DateTime<Utc>>, LedgerError>,
    {
        let now = Utc::now();
        let res: Result<SpendReceipt, TransactionError<LedgerError>> = (
            &self.store().accounts,
            &self.store().listings,
            &self.store().spend_keys,
        )
            .transaction(|(accounts, listings, keys)| {
                if let Some(key) = idempotency_key {
                    if let Some(bytes) = keys.get(key.as_bytes().as_slice())? {
                        let mut receipt: SpendReceipt = decode(&bytes).map_err(abort)?;
                        receipt.replayed = true;
                        return Ok(receipt);
                    }
                }

                let bytes = accounts
                    .get(user_id.as_bytes())?
                    .ok_or_else(|| abort(LedgerError::AccountNotFound(user_id.to_string())))?;
                let account: Account = decode(&bytes).map_err(abort)?;
                let mut account = account.normalize(now).account;

                let lbytes = listings
                    .get(listing_id.as_bytes().as_slice())?
                    .ok_or_else(|| abort(LedgerError::ListingNotFound(listing_id)))?;
                let mut listing: Listing = decode(&lbytes).map_err(abort)?;
                listing.authorize(user_id).map_err(abort)?;

                let expires_at = apply(&mut listing, now).map_err(abort)?;
                let usage = charge(&mut account, cost).map_err(abort)?;

                let receipt = SpendReceipt {
                    kind,
                    cost,
                    promo_spent: usage.promo,
                    permanent_spent: usage.permanent,
                    remaining_credits: account.credits(),
                    expires_at,
                    replayed: false,
                };

                accounts.insert(user_id.as_bytes(), encode(&account).map_err(abort)?)?;
                listings.insert(
                    listing_id.as_bytes().as_slice(),
                    encode(&listing).map_err(abort)?,
                )?;
                if let Some(key) = idempotency_key {
                    keys.insert(key.as_bytes().as_slice(), encode(&receipt).map_err(abort)?)?;
                }
                Ok(receipt)
            });
        res.map_err(unwrap_txn)
    }

    /// Like [`Self::spend_on_listing`], but the target is an auction.
    fn spend_on_auction<F>(
        &self,
        user_id: &str,
        auction_id: Uuid,
        cost: u64,
        kind: EntryKind,
        idempotency_key: Option<Uuid>,
        apply: F,
    ) -> LedgerResult<SpendReceipt>
    where
        F: Fn(&mut Auction, DateTime<Utc>) -> Result<Option<DateTime<Utc>>, LedgerError>,
    {
        let now = Utc::now();
        let res: Result<SpendReceipt, TransactionError<LedgerError>> = (
            &self.store().accounts,
            &self.store().auctions,
            &self.store().spend_keys,
        )
            .transaction(|(accounts, auctions, keys)| {
                if let Some(key) = idempotency_key {
                    if let Some(bytes) = keys.get(key.as_bytes().as_slice())? {
                        let mut receipt: SpendReceipt = decode(&bytes).map_err(abort)?;
                        receipt.replayed = true;
                        return Ok(receipt);
                    }
                }

                let bytes = accounts
                    .get(user_id.as_bytes())?
                    .ok_or_else(|| abort(LedgerError::AccountNotFound(user_id.to_string())))?;
                let account: Account = decode(&bytes).map_err(abort)?;
                let mut account = account.normalize(now).account;

                let abytes = auctions
                    .get(auction_id.as_bytes().as_slice())?
                    .ok_or_else(|| abort(LedgerError::AuctionNotFound(auction_id)))?;
                let mut auction: Auction = decode(&abytes).map_err(abort)?;
                auction.authorize(user_id).map_err(abort)?;

                let expires_at = apply(&mut auction, now).map_err(abort)?;
                let usage = charge(&mut account, cost).map_err(abort)?;

                let receipt = SpendReceipt {
                    kind,
                    cost,
                    promo_spent: usage.promo,
                    permanent_spent: usage.permanent,
                    remaining_credits: account.credits(),
                    expires_at,
                    replayed: false,
                };

                accounts.insert(user_id.as_bytes(), encode(&account).map_err(abort)?)?;
                auctions.insert(
                    auction_id.as_bytes().as_slice(),
                    encode(&auction).map_err(abort)?,
                )?;
                if let Some(key) = idempotency_key {
                    keys.insert(key.as_bytes().as_slice(), encode(&receipt).map_err(abort)?)?;
                }
                Ok(receipt)
            });
        res.map_err(unwrap_txn)
    }

    /// A spend whose only target is the account itself (subscriptions).
    fn spend_on_account<F>(
        &self,
        user_id: &str,
        cost: u64,
        kind: EntryKind,
        idempotency_key: Option<Uuid>,
        apply: F,
    ) -> LedgerResult<SpendReceipt>
    where
        F: Fn(&mut Account, DateTime<Utc>) -> Option<DateTime<Utc>>,
    {
        let now = Utc::now();
        let res: Result<SpendReceipt, TransactionError<LedgerError>> =
            (&self.store().accounts, &self.store().spend_keys).transaction(
                |(accounts, keys)| {
                    if let Some(key) = idempotency_key {
                        if let Some(bytes) = keys.get(key.as_bytes().as_slice())? {
                            let mut receipt: SpendReceipt = decode(&bytes).map_err(abort)?;
                            receipt.replayed = true;
                            return Ok(receipt);
                        }
                    }

                    let bytes = accounts.get(user_id.as_bytes())?.ok_or_else(|| {
                        abort(LedgerError::AccountNotFound(user_id.to_string()))
                    })?;
                    let account: Account = decode(&bytes).map_err(abort)?;
                    let mut account = account.normalize(now).account;

                    let usage = charge(&mut account, cost).map_err(abort)?;
                    let expires_at = apply(&mut account, now);

                    let receipt = SpendReceipt {
                        kind,
                        cost,
                        promo_spent: usage.promo,
                        permanent_spent: usage.permanent,
                        remaining_credits: account.credits(),
                        expires_at,
                        replayed: false,
                    };

                    accounts.insert(user_id.as_bytes(), encode(&account).map_err(abort)?)?;
                    if let Some(key) = idempotency_key {
                        keys.insert(
                            key.as_bytes().as_slice(),
                            encode(&receipt).map_err(abort)?,
                        )?;
                    }
                    Ok(receipt)
                },
            );
        res.map_err(unwrap_txn)
    }
}

// ---------------------------------------------------------------------------
// Public operations
// ---------------------------------------------------------------------------

impl Ledger {
    /// Boosts a listing's visibility for the flat boost window. Paying
    /// while a boost is still active extends it from its current end.
    pub fn boost_listing(
        &self,
        user_id: &str,
        listing_id: Uuid,
        idempotency_key: Option<Uuid>,
    ) -> LedgerResult<SpendReceipt> {
        let cost = fees::boost_cost();
        let receipt = self.spend_on_listing(
            user_id,
            listing_id,
            cost,
            EntryKind::SpendBoost,
            idempotency_key,
            |listing, now| {
                let expiry = fees::extend_expiry(
                    listing.boost_expires_at,
                    now,
                    Duration::hours(config::BOOST_DURATION_HOURS as i64),
                );
                listing.boost_expires_at = Some(expiry);
                Ok(Some(expiry))
            },
        )?;
        if !receipt.replayed {
            tracing::info!(user_id, %listing_id, cost, "listing boosted");
            self.store().append_entry_best_effort(
                &LedgerEntry::new(user_id, EntryKind::SpendBoost, -(cost as i64))
                    .with_product(listing_id)
                    .with_duration_hours(config::BOOST_DURATION_HOURS),
            );
        }
        Ok(receipt)
    }

    /// Buys `years` of collection subscription. Stacking extends from the
    /// current expiry when it is still in the future.
    pub fn subscribe_collection(
        &self,
        user_id: &str,
        years: u32,
        idempotency_key: Option<Uuid>,
    ) -> LedgerResult<SpendReceipt> {
        let cost = fees::subscription_cost(years)?;
        let extension = Duration::days(years as i64 * config::SUBSCRIPTION_YEAR_DAYS);
        let receipt = self.spend_on_account(
            user_id,
            cost,
            EntryKind::CollectionSubscription,
            idempotency_key,
            |account, now| {
                let expiry =
                    fees::extend_expiry(account.collection_subscription_expires_at, now, extension);
                account.collection_subscription_expires_at = Some(expiry);
                Some(expiry)
            },
        )?;
        if !receipt.replayed {
            tracing::info!(user_id, years, cost, "collection subscription purchased");
            self.store().append_entry_best_effort(
                &LedgerEntry::new(user_id, EntryKind::CollectionSubscription, -(cost as i64))
                    .with_years(years),
            );
        }
        Ok(receipt)
    }

    /// Charges the tiered creation fee for an auction and stamps its end
    /// time at `now + duration`. Charging again restamps from now — the
    /// close time is not stacked, it is set.
    pub fn charge_auction_creation(
        &self,
        user_id: &str,
        auction_id: Uuid,
        duration_hours: u32,
        idempotency_key: Option<Uuid>,
    ) -> LedgerResult<SpendReceipt> {
        let cost = fees::auction_creation_fee(duration_hours)?;
        let receipt = self.spend_on_auction(
            user_id,
            auction_id,
            cost,
            EntryKind::AuctionCreationFee,
            idempotency_key,
            |auction, now| {
                let ends_at = now + Duration::hours(duration_hours as i64);
                auction.ends_at = Some(ends_at);
                Ok(Some(ends_at))
            },
        )?;
        if !receipt.replayed {
            tracing::info!(user_id, %auction_id, duration_hours, cost, "auction fee charged");
            self.store().append_entry_best_effort(
                &LedgerEntry::new(user_id, EntryKind::AuctionCreationFee, -(cost as i64))
                    .with_auction(auction_id)
                    .with_duration_hours(duration_hours),
            );
        }
        Ok(receipt)
    }

    /// Pays to keep a listing live for `days` more, billed in 30-day
    /// periods. Extends from the current expiry when still live.
    pub fn pay_listing_fee(
        &self,
        user_id: &str,
        listing_id: Uuid,
        days: u32,
        idempotency_key: Option<Uuid>,
    ) -> LedgerResult<SpendReceipt> {
        let cost = fees::listing_fee(days)?;
        let receipt = self.spend_on_listing(
            user_id,
            listing_id,
            cost,
            EntryKind::ProductListingFee,
            idempotency_key,
            |listing, now| {
                let expiry = fees::extend_expiry(
                    listing.listing_expires_at,
                    now,
                    Duration::days(days as i64),
                );
                listing.listing_expires_at = Some(expiry);
                Ok(Some(expiry))
            },
        )?;
        if !receipt.replayed {
            tracing::info!(user_id, %listing_id, days, cost, "listing fee paid");
            self.store().append_entry_best_effort(
                &LedgerEntry::new(user_id, EntryKind::ProductListingFee, -(cost as i64))
                    .with_product(listing_id)
                    .with_duration_hours(days * 24),
            );
        }
        Ok(receipt)
    }

    /// Relists an expired fixed-price listing for `days` more, at the
    /// regular listing fee.
    ///
    /// Guards run before any charge: the listing must be fixed-price,
    /// unsold, and moderation-approved. A rejected relist costs nothing.
    pub fn relist(
        &self,
        user_id: &str,
        listing_id: Uuid,
        days: u32,
        idempotency_key: Option<Uuid>,
    ) -> LedgerResult<SpendReceipt> {
        let cost = fees::listing_fee(days)?;
        let receipt = self.spend_on_listing(
            user_id,
            listing_id,
            cost,
            EntryKind::ProductListingFee,
            idempotency_key,
            |listing, now| {
                if listing.kind != ListingKind::FixedPrice {
                    return Err(LedgerError::NotRelistable(listing.id));
                }
                if listing.sold {
                    return Err(LedgerError::ListingSold(listing.id));
                }
                if !listing.approved {
                    return Err(LedgerError::ListingNotApproved(listing.id));
                }
                let expiry = fees::extend_expiry(
                    listing.listing_expires_at,
                    now,
                    Duration::days(days as i64),
                );
                listing.listing_expires_at = Some(expiry);
                Ok(Some(expiry))
            },
        )?;
        if !receipt.replayed {
            tracing::info!(user_id, %listing_id, days, cost, "listing relisted");
            self.store().append_entry_best_effort(
                &LedgerEntry::new(user_id, EntryKind::ProductListingFee, -(cost as i64))
                    .with_product(listing_id)
                    .with_duration_hours(days * 24),
            );
        }
        Ok(receipt)
    }

    /// Promotes a listing or an auction to the homepage. Flat price,
    /// caller-chosen window up to [`config::MAX_PROMOTION_DURATION_HOURS`],
    /// same stacking rule as every other feature.
    ///
    /// The request must name exactly one target; anything else is
    /// rejected before any storage access.
    pub fn promote(
        &self,
        user_id: &str,
        request: PromotionRequest,
        idempotency_key: Option<Uuid>,
    ) -> LedgerResult<SpendReceipt> {
        let duration_hours = request
            .duration_hours
            .unwrap_or(config::PROMOTION_DEFAULT_DURATION_HOURS);
        if duration_hours == 0 || duration_hours > config::MAX_PROMOTION_DURATION_HOURS {
            return Err(FeeError::InvalidDuration(duration_hours).into());
        }
        let cost = fees::promotion_cost();
        let extension = Duration::hours(duration_hours as i64);

        match (request.product_id, request.auction_id) {
            (Some(listing_id), None) => {
                let receipt = self.spend_on_listing(
                    user_id,
                    listing_id,
                    cost,
                    EntryKind::PromotionProduct,
                    idempotency_key,
                    |listing, now| {
                        let expiry =
                            fees::extend_expiry(listing.promotion_expires_at, now, extension);
                        listing.promotion_expires_at = Some(expiry);
                        Ok(Some(expiry))
                    },
                )?;
                if !receipt.replayed {
                    tracing::info!(user_id, %listing_id, duration_hours, "listing promoted");
                    self.store().append_entry_best_effort(
                        &LedgerEntry::new(user_id, EntryKind::PromotionProduct, -(cost as i64))
                            .with_product(listing_id)
                            .with_duration_hours(duration_hours),
                    );
                }
                Ok(receipt)
            }
            (None, Some(auction_id)) => {
                let receipt = self.spend_on_auction(
                    user_id,
                    auction_id,
                    cost,
                    EntryKind::PromotionAuction,
                    idempotency_key,
                    |auction, now| {
                        let expiry =
                            fees::extend_expiry(auction.promotion_expires_at, now, extension);
                        auction.promotion_expires_at = Some(expiry);
                        Ok(Some(expiry))
                    },
                )?;
                if !receipt.replayed {
                    tracing::info!(user_id, %auction_id, duration_hours, "auction promoted");
                    self.store().append_entry_best_effort(
                        &LedgerEntry::new(user_id, EntryKind::PromotionAuction, -(cost as i64))
                            .with_auction(auction_id)
                            .with_duration_hours(duration_hours),
                    );
                }
                Ok(receipt)
            }
            _ => Err(LedgerError::AmbiguousPromotionTarget),
        }
    }
}
