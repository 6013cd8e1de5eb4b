//! # Ledger Errors
//!
//! Everything a balance mutation can reject with. Validation errors fire
//! before a transaction is opened; authorization, not-found, and
//! insufficient-funds errors fire inside the transaction before any write.
//! Either way, an `Err` means no state changed.

use thiserror::Error;
use uuid::Uuid;

use crate::fees::FeeError;

/// Errors that can occur during earn/spend operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No account exists for the given user.
    #[error("no account for user {0}")]
    AccountNotFound(String),

    /// The targeted listing does not exist.
    #[error("listing {0} not found")]
    ListingNotFound(Uuid),

    /// The targeted auction does not exist.
    #[error("auction {0} not found")]
    AuctionNotFound(Uuid),

    /// The acting user doesn't own the targeted entity. Skipped only for
    /// legacy rows with no recorded owner.
    #[error("user {user} does not own entity {entity}")]
    NotOwner {
        /// The acting user.
        user: String,
        /// The entity they tried to spend on.
        entity: Uuid,
    },

    /// The account can't cover the cost. Checked after normalization,
    /// before any write.
    #[error("insufficient credits: available {available}, requested {requested}")]
    InsufficientCredits {
        /// Spendable credits after expiry normalization.
        available: u64,
        /// The cost that was rejected.
        requested: u64,
    },

    /// Relisting requires a fixed-price listing; this one is an auction
    /// listing.
    #[error("listing {0} is not a fixed-price listing and cannot be relisted")]
    NotRelistable(Uuid),

    /// The listing has already sold — nothing left to relist.
    #[error("listing {0} has already been sold")]
    ListingSold(Uuid),

    /// The listing was never approved by moderation.
    #[error("listing {0} is not approved")]
    ListingNotApproved(Uuid),

    /// Crediting the account would overflow its balance counter.
    #[error("balance overflow for user {0}")]
    Overflow(String),

    /// A promotion must target exactly one of product or auction.
    #[error("promotion must target exactly one of product or auction")]
    AmbiguousPromotionTarget,

    /// A fee calculator rejected the requested parameters.
    #[error(transparent)]
    Fee(#[from] FeeError),

    /// The storage layer failed outside a transaction.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// A stored record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
