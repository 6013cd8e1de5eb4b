//! # Ledger Operations
//!
//! The [`Ledger`] is the one entry point the rest of the marketplace
//! talks to: earn operations in [`earn`], spend operations in [`spend`],
//! normalizing balance reads and history here. It owns a [`LedgerStore`]
//! and is constructed once at startup, then shared by reference — no
//! module-level singleton, no init flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};

use crate::account::Account;
use crate::entry::LedgerEntry;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{decode, encode, unwrap_txn, LedgerStore};

pub mod earn;
pub mod spend;

pub use earn::{AccountCreation, PaymentProvider, PurchaseOutcome, ReferralOutcome};
pub use spend::{PromotionRequest, SpendReceipt};

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The credit ledger: every balance read and mutation goes through here.
///
/// Cheap to share via `Arc<Ledger>`; all concurrency control lives in the
/// store's optimistic transactions.
#[derive(Debug, Clone)]
pub struct Ledger {
    store: LedgerStore,
}

/// A user-facing balance snapshot, expiry already applied.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceView {
    /// Total spendable credits.
    pub credits: u64,
    /// The portion still attributable to the promotional grant.
    pub promo_remaining: u64,
    /// When the promotional portion expires, if any is left.
    pub promo_expires_at: Option<DateTime<Utc>>,
    /// Collection subscription expiry, if any.
    pub collection_subscription_expires_at: Option<DateTime<Utc>>,
}

impl Ledger {
    /// Opens (or creates) a ledger at the given path.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> LedgerResult<Self> {
        Ok(Self {
            store: LedgerStore::open(path)?,
        })
    }

    /// An in-memory ledger for tests.
    pub fn open_temporary() -> LedgerResult<Self> {
        Ok(Self {
            store: LedgerStore::open_temporary()?,
        })
    }

    /// Wraps an already-opened store.
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// Direct access to the store, for entity seeding and inspection.
    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// The user's balance with expiry applied.
    ///
    /// When normalization changes anything, the normalized account is
    /// persisted inside the same transaction as the read — the next
    /// reader sees the write-off without an extra round trip.
    pub fn balance(&self, user_id: &str) -> LedgerResult<BalanceView> {
        let now = Utc::now();
        let res: Result<Account, TransactionError<LedgerError>> =
            self.store.accounts.transaction(|accounts| {
                let bytes = accounts
                    .get(user_id.as_bytes())?
                    .ok_or_else(|| abort(LedgerError::AccountNotFound(user_id.to_string())))?;
                let account: Account = decode(&bytes).map_err(abort)?;
                let normalized = account.normalize(now);
                if normalized.changed {
                    accounts.insert(
                        user_id.as_bytes(),
                        encode(&normalized.account).map_err(abort)?,
                    )?;
                }
                Ok(normalized.account)
            });
        let account = res.map_err(unwrap_txn)?;
        Ok(BalanceView {
            credits: account.credits(),
            promo_remaining: account.promo_remaining(),
            promo_expires_at: account.promo.map(|p| p.expires_at),
            collection_subscription_expires_at: account.collection_subscription_expires_at,
        })
    }

    /// The user's transaction history, newest first.
    pub fn history(&self, user_id: &str, limit: Option<usize>) -> LedgerResult<Vec<LedgerEntry>> {
        self.store.entries_for_user(user_id, limit)
    }
}

// ---------------------------------------------------------------------------
// Transaction plumbing
// ---------------------------------------------------------------------------

/// Shorthand for aborting a sled transaction with a domain error.
pub(crate) fn abort(e: LedgerError) -> ConflictableTransactionError<LedgerError> {
    ConflictableTransactionError::Abort(e)
}

// ---------------------------------------------------------------------------
// Charging
// ---------------------------------------------------------------------------

/// How a charge split across the two pools.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PoolUsage {
    /// Credits taken from the promotional pool.
    pub promo: u64,
    /// Credits taken from the permanent pool.
    pub permanent: u64,
}

/// Deducts `cost` from an already-normalized account, promotional pool
/// first. Rejects with no mutation when the total can't cover it.
///
/// Draining the expiring pool first means the eventual expiry write-off
/// only ever touches credits the user was given, never credits they
/// bought.
pub(crate) fn charge(account: &mut Account, cost: u64) -> Result<PoolUsage, LedgerError> {
    let available = account.credits();
    if available < cost {
        return Err(LedgerError::InsufficientCredits {
            available,
            requested: cost,
        });
    }

    let mut promo_spent = 0;
    if let Some(mut promo) = account.promo.take() {
        promo_spent = promo.amount.min(cost);
        promo.amount -= promo_spent;
        // An exhausted pool disappears, and its expiry with it.
        if promo.amount > 0 {
            account.promo = Some(promo);
        }
    }
    let permanent_spent = cost - promo_spent;
    account.permanent_credits -= permanent_spent;

    Ok(PoolUsage {
        promo: promo_spent,
        permanent: permanent_spent,
    })
}
