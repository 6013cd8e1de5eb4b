//! # Pricing & Promotional Constants
//!
//! Every credit price in Curio lives here. If you're hardcoding a cost
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Prices are in whole credits. Real money appears exactly once, as
//! [`CREDIT_UNIT_PRICE_MINOR`] — the conversion rate the payment-provider
//! callbacks use. Changing any of these after launch changes what users
//! pay, so treat edits like production migrations.

use chrono::{DateTime, Duration, Utc};

// ---------------------------------------------------------------------------
// Credit Purchase
// ---------------------------------------------------------------------------

/// Price of one credit in minor currency units (cents). 50 = €0.50.
/// Provider callbacks report paid amounts in the same minor units;
/// credits granted are `floor(paid / CREDIT_UNIT_PRICE_MINOR)`.
pub const CREDIT_UNIT_PRICE_MINOR: i64 = 50;

// ---------------------------------------------------------------------------
// Signup Bonus
// ---------------------------------------------------------------------------

/// Unix timestamp of the promotional cutoff: 2025-10-01T00:00:00Z.
/// Signups before this date get the launch-campaign bonus, signups
/// after get the steady-state one.
const SIGNUP_BONUS_CUTOFF_UNIX: i64 = 1_759_276_800;

/// Launch-campaign signup bonus, granted before the cutoff.
pub const SIGNUP_BONUS_EARLY_CREDITS: u64 = 100;

/// Validity of the launch-campaign bonus, in days.
pub const SIGNUP_BONUS_EARLY_VALIDITY_DAYS: i64 = 90;

/// Steady-state signup bonus, granted on or after the cutoff.
pub const SIGNUP_BONUS_LATE_CREDITS: u64 = 50;

/// Validity of the steady-state bonus, in days.
pub const SIGNUP_BONUS_LATE_VALIDITY_DAYS: i64 = 30;

// ---------------------------------------------------------------------------
// Referral Bonus
// ---------------------------------------------------------------------------

/// Credits granted to the referred (new) user. Added to the promotional
/// pool, so they expire with it.
pub const REFERRAL_BONUS_REFERRED_CREDITS: u64 = 25;

/// Credits granted to the inviter. Permanent — no expiry.
pub const REFERRAL_BONUS_INVITER_CREDITS: u64 = 25;

/// How far the referred user's promotional window is pushed out when the
/// bonus lands. The pool expiry becomes `max(current, now + this)`.
pub const REFERRAL_BONUS_VALIDITY_DAYS: i64 = 30;

// ---------------------------------------------------------------------------
// Boost
// ---------------------------------------------------------------------------

/// Flat price of a visibility boost, in credits.
pub const BOOST_PRICE_CREDITS: u64 = 10;

/// Boost duration. 7 days — long enough to matter, short enough that
/// sellers come back for more.
pub const BOOST_DURATION_HOURS: u32 = 168;

// ---------------------------------------------------------------------------
// Collection Subscription
// ---------------------------------------------------------------------------

/// Annual collection subscription, in credits per year.
pub const SUBSCRIPTION_PRICE_PER_YEAR_CREDITS: u64 = 100;

/// Days credited per subscription year. We bill in whole years, not
/// leap-year-accurate ones.
pub const SUBSCRIPTION_YEAR_DAYS: i64 = 365;

// ---------------------------------------------------------------------------
// Auction Creation Fee (tiered)
// ---------------------------------------------------------------------------

/// Base price for an auction up to [`AUCTION_BASE_DURATION_HOURS`].
/// Kept even so the extra-block price below stays integral.
pub const AUCTION_BASE_PRICE_CREDITS: u64 = 6;

/// Duration covered by the base price: 3 days.
pub const AUCTION_BASE_DURATION_HOURS: u32 = 72;

/// Price for anything up to [`AUCTION_DISCOUNT_DURATION_HOURS`].
/// Discounted against buying base-duration blocks one by one.
pub const AUCTION_DISCOUNT_PRICE_CREDITS: u64 = 10;

/// Duration covered by the discounted price: 7 days.
pub const AUCTION_DISCOUNT_DURATION_HOURS: u32 = 168;

/// Price per additional base-duration block past the discount tier —
/// half the base price.
pub const AUCTION_EXTRA_BLOCK_PRICE_CREDITS: u64 = AUCTION_BASE_PRICE_CREDITS / 2;

// ---------------------------------------------------------------------------
// Listing Fee
// ---------------------------------------------------------------------------

/// Listing time is billed in 30-day periods, partial periods rounded up.
pub const LISTING_PERIOD_DAYS: u32 = 30;

/// Price per 30-day listing period, in credits.
pub const LISTING_PRICE_PER_PERIOD_CREDITS: u64 = 5;

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

/// Flat price of a homepage promotion, in credits. Same price for
/// products and auctions.
pub const PROMOTION_PRICE_CREDITS: u64 = 15;

/// Default promotion duration when the caller doesn't override it.
pub const PROMOTION_DEFAULT_DURATION_HOURS: u32 = 168;

// ---------------------------------------------------------------------------
// Parameter Limits
// ---------------------------------------------------------------------------
// Upper bounds on caller-supplied quantities. The fee calculators reject
// anything beyond these before a transaction opens, which also keeps the
// downstream expiry arithmetic inside chrono's representable range.

/// Longest subscription sold in one charge, in years.
pub const MAX_SUBSCRIPTION_YEARS: u32 = 10;

/// Longest auction duration that can be paid for: 90 days.
pub const MAX_AUCTION_DURATION_HOURS: u32 = 2_160;

/// Longest listing extension in one charge, in days.
pub const MAX_LISTING_DAYS: u32 = 365;

/// Longest promotion window: 30 days.
pub const MAX_PROMOTION_DURATION_HOURS: u32 = 720;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The signup-bonus parameters in force at a given moment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignupBonus {
    /// Credits granted into the promotional pool.
    pub credits: u64,
    /// How long the pool stays spendable.
    pub validity: Duration,
}

/// Returns the promotional cutoff date.
pub fn signup_bonus_cutoff() -> DateTime<Utc> {
    DateTime::from_timestamp(SIGNUP_BONUS_CUTOFF_UNIX, 0).expect("cutoff timestamp is valid")
}

/// Returns the signup bonus in force at `now`: the larger, longer-lived
/// launch bonus before the cutoff, the smaller one after.
pub fn signup_bonus_at(now: DateTime<Utc>) -> SignupBonus {
    if now < signup_bonus_cutoff() {
        SignupBonus {
            credits: SIGNUP_BONUS_EARLY_CREDITS,
            validity: Duration::days(SIGNUP_BONUS_EARLY_VALIDITY_DAYS),
        }
    } else {
        SignupBonus {
            credits: SIGNUP_BONUS_LATE_CREDITS,
            validity: Duration::days(SIGNUP_BONUS_LATE_VALIDITY_DAYS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn bonus_before_cutoff_is_the_launch_bonus() {
        let just_before = signup_bonus_cutoff() - Duration::seconds(1);
        let bonus = signup_bonus_at(just_before);
        assert_eq!(bonus.credits, SIGNUP_BONUS_EARLY_CREDITS);
        assert_eq!(bonus.validity, Duration::days(SIGNUP_BONUS_EARLY_VALIDITY_DAYS));
    }

    #[test]
    fn bonus_at_cutoff_is_the_steady_state_bonus() {
        // The cutoff itself is "after" — the campaign ends at midnight sharp.
        let bonus = signup_bonus_at(signup_bonus_cutoff());
        assert_eq!(bonus.credits, SIGNUP_BONUS_LATE_CREDITS);
        assert_eq!(bonus.validity, Duration::days(SIGNUP_BONUS_LATE_VALIDITY_DAYS));
    }

    #[test]
    fn launch_bonus_dominates_steady_state() {
        // If these flip, the marketing copy is lying.
        assert!(SIGNUP_BONUS_EARLY_CREDITS > SIGNUP_BONUS_LATE_CREDITS);
        assert!(SIGNUP_BONUS_EARLY_VALIDITY_DAYS > SIGNUP_BONUS_LATE_VALIDITY_DAYS);
    }

    #[test]
    fn auction_tiers_are_ordered() {
        assert!(AUCTION_BASE_DURATION_HOURS < AUCTION_DISCOUNT_DURATION_HOURS);
        assert!(AUCTION_BASE_PRICE_CREDITS < AUCTION_DISCOUNT_PRICE_CREDITS);
        // Half-price blocks must stay integral.
        assert_eq!(AUCTION_BASE_PRICE_CREDITS % 2, 0);
        assert_eq!(
            AUCTION_EXTRA_BLOCK_PRICE_CREDITS * 2,
            AUCTION_BASE_PRICE_CREDITS
        );
    }

    #[test]
    fn duration_caps_cover_the_standard_offerings() {
        assert!(MAX_SUBSCRIPTION_YEARS >= 1);
        assert!(MAX_AUCTION_DURATION_HOURS >= AUCTION_DISCOUNT_DURATION_HOURS);
        assert!(MAX_LISTING_DAYS >= LISTING_PERIOD_DAYS);
        assert!(MAX_PROMOTION_DURATION_HOURS >= PROMOTION_DEFAULT_DURATION_HOURS);
    }

    #[test]
    fn prices_are_nonzero() {
        // A zero price means a feature is free. That's a pricing decision,
        // not a default.
        assert!(CREDIT_UNIT_PRICE_MINOR > 0);
        assert!(BOOST_PRICE_CREDITS > 0);
        assert!(SUBSCRIPTION_PRICE_PER_YEAR_CREDITS > 0);
        assert!(LISTING_PRICE_PER_PERIOD_CREDITS > 0);
        assert!(PROMOTION_PRICE_CREDITS > 0);
    }
}
