//! # Accounts & the Expiry Normalizer
//!
//! One [`Account`] per marketplace user: a permanent credit balance plus an
//! optional time-limited promotional pool ([`PromoCredits`]). The two pools
//! are explicit and typed — spends always drain the expiring pool first, so
//! the eventual expiry write-off can never claw back credits the user paid
//! for.
//!
//! Expiry is lazy. There is no background job; instead every spend and
//! every balance read runs [`Account::normalize`] and, when it reports a
//! change, persists the normalized account inside the same transaction as
//! the read. Until someone touches the account, an expired pool just sits
//! there, spendable-looking but dead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{self, SignupBonus};

// ---------------------------------------------------------------------------
// PromoCredits
// ---------------------------------------------------------------------------

/// The time-limited promotional sub-balance.
///
/// Created by the signup bonus, topped up at most once by the referral
/// bonus, drained first by every spend, and written off wholesale when
/// `expires_at` passes. `amount` is always > 0 — an exhausted pool is
/// represented by `Account::promo == None`, which is also how "no expiry
/// once the bonus is exhausted" falls out for free.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCredits {
    /// Credits remaining in the promotional pool.
    pub amount: u64,
    /// When the pool stops being spendable.
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Per-user credit balance and promotional bookkeeping.
///
/// The spendable total is `permanent_credits + promo.amount`. Both pools
/// are `u64`, so the ledger-wide invariant "credits never negative" holds
/// by construction — there is no representation for a negative balance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    /// The marketplace user this account belongs to.
    pub user_id: String,

    /// Credits with no expiry: purchases and inviter referral bonuses.
    pub permanent_credits: u64,

    /// The promotional pool, if any of it is left.
    pub promo: Option<PromoCredits>,

    /// Who referred this user. Set once at signup, never changed.
    pub referred_by: Option<String>,

    /// Whether the dual-sided referral bonus has fired. Set once true,
    /// never reverted — this is the at-most-once guard.
    pub referral_bonus_applied: bool,

    /// Annual collection subscription expiry. Advanced only by the
    /// subscription spend operation.
    pub collection_subscription_expires_at: Option<DateTime<Utc>>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// Result of running the expiry normalizer over an account snapshot.
#[derive(Clone, Debug)]
pub struct Normalized {
    /// The post-expiry account. Identical to the input when nothing expired.
    pub account: Account,
    /// Whether normalization changed anything. When true, callers must
    /// persist `account` in the same transaction as the read.
    pub changed: bool,
}

impl Account {
    /// Creates a fresh account with the signup bonus pre-applied.
    ///
    /// The bonus in force depends on whether `now` precedes the
    /// promotional cutoff — see [`config::signup_bonus_at`].
    pub fn with_signup_bonus(
        user_id: impl Into<String>,
        referred_by: Option<String>,
        now: DateTime<Utc>,
    ) -> (Self, SignupBonus) {
        let bonus = config::signup_bonus_at(now);
        let account = Self {
            user_id: user_id.into(),
            permanent_credits: 0,
            promo: Some(PromoCredits {
                amount: bonus.credits,
                expires_at: now + bonus.validity,
            }),
            referred_by,
            referral_bonus_applied: false,
            collection_subscription_expires_at: None,
            created_at: now,
        };
        (account, bonus)
    }

    /// Total spendable credits: permanent plus whatever is left of the
    /// promotional pool. Does NOT apply expiry — normalize first.
    pub fn credits(&self) -> u64 {
        self.permanent_credits + self.promo.map_or(0, |p| p.amount)
    }

    /// Credits still attributable to the unexpired promotional grant.
    pub fn promo_remaining(&self) -> u64 {
        self.promo.map_or(0, |p| p.amount)
    }

    /// The expiry-normalized view of this account at `now`.
    ///
    /// Pure — the caller decides whether and where to persist. Rules:
    ///
    /// - no promotional pool → unchanged
    /// - `now <= expires_at` → unchanged
    /// - otherwise the pool is written off: total credits drop by the
    ///   remaining promo amount (floored at zero by construction) and
    ///   the pool disappears along with its expiry.
    pub fn normalize(&self, now: DateTime<Utc>) -> Normalized {
        match self.promo {
            Some(promo) if now > promo.expires_at => {
                let mut account = self.clone();
                account.promo = None;
                Normalized {
                    account,
                    changed: true,
                }
            }
            _ => Normalized {
                account: self.clone(),
                changed: false,
            },
        }
    }
}
