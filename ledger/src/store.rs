//! # LedgerStore — Persistent Storage
//!
//! The persistence layer for the credit ledger, built on sled's embedded
//! key-value store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! sled organizes data into named "trees" (analogous to column families
//! in RocksDB or tables in SQL). Each tree is an independent B+ tree
//! with its own keyspace:
//!
//! | Tree         | Key                          | Value                  |
//! |--------------|------------------------------|------------------------|
//! | `accounts`   | `user_id` (UTF-8)            | `bincode(Account)`     |
//! | `listings`   | `listing_id` (16B UUID)      | `bincode(Listing)`     |
//! | `auctions`   | `auction_id` (16B UUID)      | `bincode(Auction)`     |
//! | `entries`    | `user_id` ++ 0x00 ++ seq BE  | `json(LedgerEntry)`    |
//! | `payments`   | `payment_reference` (UTF-8)  | `bincode(PaymentMarker)` |
//! | `spend_keys` | idempotency key (16B UUID)   | `bincode(SpendReceipt)`  |
//!
//! Entry sequence numbers come from `sled::Db::generate_id()` (monotonic),
//! stored big-endian so lexicographic order matches append order — a
//! reversed prefix scan is exactly "newest first". Entries are stored as
//! JSON rather than bincode because their optional context fields are
//! skipped when absent, and bincode cannot round-trip skipped fields.
//!
//! ## Atomicity
//!
//! Every balance-affecting operation runs inside a sled transaction over
//! the trees it touches. sled transactions are optimistic: the closure is
//! re-run when a conflicting commit invalidates its read set, which gives
//! us linearizable per-account updates without any explicit locks. The
//! `entries` tree deliberately stays OUTSIDE these transactions — appends
//! are post-commit and best-effort, per the ledger-log contract.

use sled::transaction::TransactionError;
use sled::{Db, Tree};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::Account;
use crate::entry::LedgerEntry;
use crate::error::{LedgerError, LedgerResult};
use crate::market::{Auction, Listing};

// ---------------------------------------------------------------------------
// Codec helpers
// ---------------------------------------------------------------------------

/// bincode-encode a record for storage.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LedgerError> {
    bincode::serialize(value).map_err(|e| LedgerError::Codec(e.to_string()))
}

/// bincode-decode a stored record.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LedgerError> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Codec(e.to_string()))
}

/// Collapses a sled transaction error into a [`LedgerError`]: aborts carry
/// our domain error through unchanged, storage failures wrap.
pub(crate) fn unwrap_txn(err: TransactionError<LedgerError>) -> LedgerError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => LedgerError::Storage(e),
    }
}

// ---------------------------------------------------------------------------
// PaymentMarker
// ---------------------------------------------------------------------------

/// Proof that an external payment reference has already been credited.
///
/// Written in the same transaction as the credit itself, so a replayed
/// provider callback finds the marker and becomes a no-op.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentMarker {
    /// The account that was credited.
    pub user_id: String,
    /// Credits granted for this payment.
    pub credits: u64,
    /// When the payment was first processed.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// Persistent storage engine for the credit ledger.
///
/// Wraps a sled `Db` and exposes typed accessors plus the raw trees the
/// operation modules open transactions over. Constructed once and passed
/// by reference — there is no process-global instance.
///
/// # Thread Safety
///
/// sled is inherently thread-safe; `LedgerStore` can be shared across
/// threads via `Arc<LedgerStore>` without external synchronization.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    /// The underlying sled database handle.
    db: Db,
    /// Accounts indexed by user id.
    pub(crate) accounts: Tree,
    /// Listings indexed by UUID bytes.
    pub(crate) listings: Tree,
    /// Auctions indexed by UUID bytes.
    pub(crate) auctions: Tree,
    /// Per-user append-only ledger entries.
    entries: Tree,
    /// Processed payment references (purchase idempotency).
    pub(crate) payments: Tree,
    /// Spend idempotency keys -> stored receipts.
    pub(crate) spend_keys: Tree,
}

impl LedgerStore {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary store that lives in memory and is cleaned up
    /// on drop. Ideal for unit tests — no filesystem side effects.
    pub fn open_temporary() -> LedgerResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> LedgerResult<Self> {
        let accounts = db.open_tree("accounts")?;
        let listings = db.open_tree("listings")?;
        let auctions = db.open_tree("auctions")?;
        let entries = db.open_tree("entries")?;
        let payments = db.open_tree("payments")?;
        let spend_keys = db.open_tree("spend_keys")?;

        Ok(Self {
            db,
            accounts,
            listings,
            auctions,
            entries,
            payments,
            spend_keys,
        })
    }

    // -- Account operations ---------------------------------------------------

    /// Retrieve an account by user id. Returns `None` for unknown users.
    pub fn get_account(&self, user_id: &str) -> LedgerResult<Option<Account>> {
        match self.accounts.get(user_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist an account outside any transaction. The operation modules
    /// never use this on a live balance — it exists for seeding and tests.
    pub fn put_account(&self, account: &Account) -> LedgerResult<()> {
        self.accounts
            .insert(account.user_id.as_bytes(), encode(account)?)?;
        Ok(())
    }

    // -- Listing / auction operations -----------------------------------------

    /// Retrieve a listing by id.
    pub fn get_listing(&self, id: Uuid) -> LedgerResult<Option<Listing>> {
        match self.listings.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist a listing. Used by the marketplace surfaces that create
    /// listings; the ledger itself only mutates them transactionally.
    pub fn put_listing(&self, listing: &Listing) -> LedgerResult<()> {
        self.listings
            .insert(listing.id.as_bytes(), encode(listing)?)?;
        Ok(())
    }

    /// Retrieve an auction by id.
    pub fn get_auction(&self, id: Uuid) -> LedgerResult<Option<Auction>> {
        match self.auctions.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist an auction.
    pub fn put_auction(&self, auction: &Auction) -> LedgerResult<()> {
        self.auctions
            .insert(auction.id.as_bytes(), encode(auction)?)?;
        Ok(())
    }

    // -- Ledger entry log ------------------------------------------------------

    /// Append one entry to the user's ledger log.
    ///
    /// Deliberately not transactional with anything else — the log is an
    /// audit trail, never an authority.
    pub fn append_entry(&self, entry: &LedgerEntry) -> LedgerResult<()> {
        let seq = self.db.generate_id()?;
        let key = entry_key(&entry.user_id, seq);
        let value =
            serde_json::to_vec(entry).map_err(|e| LedgerError::Codec(e.to_string()))?;
        self.entries.insert(key, value)?;
        Ok(())
    }

    /// Append an entry, swallowing (but logging) any failure.
    ///
    /// Called after the balance commit. A lost entry is a rare audit-trail
    /// gap; rolling back a committed spend over it would be worse.
    pub fn append_entry_best_effort(&self, entry: &LedgerEntry) {
        if let Err(e) = self.append_entry(entry) {
            tracing::warn!(
                user_id = %entry.user_id,
                kind = ?entry.kind,
                amount = entry.amount,
                error = %e,
                "failed to append ledger entry; balance already committed"
            );
        }
    }

    /// A user's ledger entries, newest first. `limit` caps the result;
    /// `None` returns the full history.
    pub fn entries_for_user(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let prefix = entry_prefix(user_id);
        let mut out = Vec::new();
        for item in self.entries.scan_prefix(&prefix).rev() {
            let (_key, value) = item?;
            let entry: LedgerEntry = serde_json::from_slice(&value)
                .map_err(|e| LedgerError::Codec(e.to_string()))?;
            out.push(entry);
            if limit.is_some_and(|l| out.len() >= l) {
                break;
            }
        }
        Ok(out)
    }

    // -- Payment idempotency ---------------------------------------------------

    /// Whether an external payment reference has already been credited.
    pub fn payment_processed(&self, reference: &str) -> LedgerResult<bool> {
        Ok(self.payments.contains_key(reference.as_bytes())?)
    }

    /// The stored marker for a processed payment reference, if any.
    pub fn get_payment_marker(&self, reference: &str) -> LedgerResult<Option<PaymentMarker>> {
        match self.payments.get(reference.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // -- Utility ---------------------------------------------------------------

    /// Number of accounts in the store.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> LedgerResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Key prefix for one user's slice of the `entries` tree. User ids are
/// marketplace-issued and never contain NUL, so the 0x00 separator keeps
/// `alice` from matching `alice2`.
fn entry_prefix(user_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(user_id.len() + 1);
    prefix.extend_from_slice(user_id.as_bytes());
    prefix.push(0);
    prefix
}

fn entry_key(user_id: &str, seq: u64) -> Vec<u8> {
    let mut key = entry_prefix(user_id);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}
