//! # Fee Calculators & the Stacking Policy
//!
//! Pure pricing functions. No clocks, no storage, no side effects —
//! everything here can be unit-tested with plain numbers, and the spend
//! operations call these before deciding whether a balance can cover the
//! cost.
//!
//! [`extend_expiry`] is the one rule every duration-based feature shares:
//! paying again while a window is still open extends the window from its
//! current end, not from now. Three days left on a boost plus a seven-day
//! boost is ten days, not seven.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::config;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Parameter validation failures from the fee calculators. Raised before
/// any transaction is opened, so they never leave partial state behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeeError {
    /// Subscription years outside `1..=MAX_SUBSCRIPTION_YEARS`.
    #[error("subscription years out of range: {0}")]
    InvalidYears(u32),

    /// Auction/promotion duration outside its configured bounds.
    #[error("duration out of range: {0} hours")]
    InvalidDuration(u32),

    /// Listing days outside `1..=MAX_LISTING_DAYS`.
    #[error("listing days out of range: {0}")]
    InvalidDays(u32),
}

// ---------------------------------------------------------------------------
// Calculators
// ---------------------------------------------------------------------------

/// Cost of a visibility boost. Flat price, flat duration.
pub fn boost_cost() -> u64 {
    config::BOOST_PRICE_CREDITS
}

/// Cost of `years` of collection subscription. Years outside
/// `1..=MAX_SUBSCRIPTION_YEARS` are rejected.
pub fn subscription_cost(years: u32) -> Result<u64, FeeError> {
    if years == 0 || years > config::MAX_SUBSCRIPTION_YEARS {
        return Err(FeeError::InvalidYears(years));
    }
    Ok(config::SUBSCRIPTION_PRICE_PER_YEAR_CREDITS * years as u64)
}

/// Tiered auction-creation fee.
///
/// - up to the base duration: base price
/// - up to the discount duration: discounted price
/// - beyond that: discounted price plus one half-base-price block per
///   additional base-duration block, partial blocks rounded up.
pub fn auction_creation_fee(duration_hours: u32) -> Result<u64, FeeError> {
    if duration_hours == 0 || duration_hours > config::MAX_AUCTION_DURATION_HOURS {
        return Err(FeeError::InvalidDuration(duration_hours));
    }
    if duration_hours <= config::AUCTION_BASE_DURATION_HOURS {
        return Ok(config::AUCTION_BASE_PRICE_CREDITS);
    }
    if duration_hours <= config::AUCTION_DISCOUNT_DURATION_HOURS {
        return Ok(config::AUCTION_DISCOUNT_PRICE_CREDITS);
    }
    let excess = duration_hours - config::AUCTION_DISCOUNT_DURATION_HOURS;
    let blocks = excess.div_ceil(config::AUCTION_BASE_DURATION_HOURS) as u64;
    Ok(config::AUCTION_DISCOUNT_PRICE_CREDITS + blocks * config::AUCTION_EXTRA_BLOCK_PRICE_CREDITS)
}

/// Listing fee: one period price per started 30-day period. Days outside
/// `1..=MAX_LISTING_DAYS` are rejected.
pub fn listing_fee(days: u32) -> Result<u64, FeeError> {
    if days == 0 || days > config::MAX_LISTING_DAYS {
        return Err(FeeError::InvalidDays(days));
    }
    let periods = days.div_ceil(config::LISTING_PERIOD_DAYS) as u64;
    Ok(periods * config::LISTING_PRICE_PER_PERIOD_CREDITS)
}

/// Cost of a homepage promotion. Flat, regardless of target or duration.
pub fn promotion_cost() -> u64 {
    config::PROMOTION_PRICE_CREDITS
}

// ---------------------------------------------------------------------------
// Stacking
// ---------------------------------------------------------------------------

/// The extend-if-active-else-restart rule shared by every duration-based
/// feature: if the current window is still open, the new window extends
/// from its end; otherwise it starts from `now`.
pub fn extend_expiry(
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    extension: Duration,
) -> DateTime<Utc> {
    let base = match current {
        Some(c) if c > now => c,
        _ => now,
    };
    base + extension
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AUCTION_BASE_PRICE_CREDITS, AUCTION_DISCOUNT_PRICE_CREDITS,
        AUCTION_EXTRA_BLOCK_PRICE_CREDITS, LISTING_PRICE_PER_PERIOD_CREDITS,
        SUBSCRIPTION_PRICE_PER_YEAR_CREDITS,
    };

    // -- Subscription --

    #[test]
    fn subscription_cost_scales_with_years() {
        assert_eq!(
            subscription_cost(1).unwrap(),
            SUBSCRIPTION_PRICE_PER_YEAR_CREDITS
        );
        assert_eq!(
            subscription_cost(3).unwrap(),
            3 * SUBSCRIPTION_PRICE_PER_YEAR_CREDITS
        );
    }

    #[test]
    fn subscription_years_outside_bounds_rejected() {
        assert_eq!(subscription_cost(0), Err(FeeError::InvalidYears(0)));
        assert!(subscription_cost(config::MAX_SUBSCRIPTION_YEARS).is_ok());
        assert_eq!(
            subscription_cost(config::MAX_SUBSCRIPTION_YEARS + 1),
            Err(FeeError::InvalidYears(config::MAX_SUBSCRIPTION_YEARS + 1))
        );
        // The multiply itself must never be reachable at this magnitude.
        assert_eq!(
            subscription_cost(u32::MAX),
            Err(FeeError::InvalidYears(u32::MAX))
        );
    }

    // -- Auction creation fee --

    #[test]
    fn auction_fee_base_tier() {
        assert_eq!(auction_creation_fee(1).unwrap(), AUCTION_BASE_PRICE_CREDITS);
        assert_eq!(auction_creation_fee(72).unwrap(), AUCTION_BASE_PRICE_CREDITS);
    }

    #[test]
    fn auction_fee_discount_tier() {
        assert_eq!(
            auction_creation_fee(73).unwrap(),
            AUCTION_DISCOUNT_PRICE_CREDITS
        );
        assert_eq!(
            auction_creation_fee(168).unwrap(),
            AUCTION_DISCOUNT_PRICE_CREDITS
        );
    }

    #[test]
    fn auction_fee_one_extra_block() {
        // 240h = 168h + 72h: exactly one extra base-duration block.
        assert_eq!(
            auction_creation_fee(240).unwrap(),
            AUCTION_DISCOUNT_PRICE_CREDITS + AUCTION_EXTRA_BLOCK_PRICE_CREDITS
        );
    }

    #[test]
    fn auction_fee_partial_block_rounds_up() {
        // 169h is one hour past the discount tier — still one full block.
        assert_eq!(
            auction_creation_fee(169).unwrap(),
            AUCTION_DISCOUNT_PRICE_CREDITS + AUCTION_EXTRA_BLOCK_PRICE_CREDITS
        );
        // 241h tips into the second block.
        assert_eq!(
            auction_creation_fee(241).unwrap(),
            AUCTION_DISCOUNT_PRICE_CREDITS + 2 * AUCTION_EXTRA_BLOCK_PRICE_CREDITS
        );
    }

    #[test]
    fn auction_fee_duration_outside_bounds_rejected() {
        assert_eq!(auction_creation_fee(0), Err(FeeError::InvalidDuration(0)));
        assert!(auction_creation_fee(config::MAX_AUCTION_DURATION_HOURS).is_ok());
        assert_eq!(
            auction_creation_fee(config::MAX_AUCTION_DURATION_HOURS + 1),
            Err(FeeError::InvalidDuration(
                config::MAX_AUCTION_DURATION_HOURS + 1
            ))
        );
        assert_eq!(
            auction_creation_fee(u32::MAX),
            Err(FeeError::InvalidDuration(u32::MAX))
        );
    }

    // -- Listing fee --

    #[test]
    fn listing_fee_rounds_periods_up() {
        assert_eq!(listing_fee(1).unwrap(), LISTING_PRICE_PER_PERIOD_CREDITS);
        assert_eq!(listing_fee(30).unwrap(), LISTING_PRICE_PER_PERIOD_CREDITS);
        assert_eq!(listing_fee(31).unwrap(), 2 * LISTING_PRICE_PER_PERIOD_CREDITS);
        // 45 days is 2 billing periods, not 1.5.
        assert_eq!(listing_fee(45).unwrap(), 2 * LISTING_PRICE_PER_PERIOD_CREDITS);
        assert_eq!(listing_fee(90).unwrap(), 3 * LISTING_PRICE_PER_PERIOD_CREDITS);
    }

    #[test]
    fn listing_days_outside_bounds_rejected() {
        assert_eq!(listing_fee(0), Err(FeeError::InvalidDays(0)));
        assert!(listing_fee(config::MAX_LISTING_DAYS).is_ok());
        assert_eq!(
            listing_fee(config::MAX_LISTING_DAYS + 1),
            Err(FeeError::InvalidDays(config::MAX_LISTING_DAYS + 1))
        );
        assert_eq!(
            listing_fee(100_000_000),
            Err(FeeError::InvalidDays(100_000_000))
        );
    }

    // -- Stacking --

    #[test]
    fn stacking_extends_active_window() {
        let now = Utc::now();
        let current = Some(now + Duration::days(3));
        let new_expiry = extend_expiry(current, now, Duration::days(7));
        assert_eq!(new_expiry, now + Duration::days(10));
    }

    #[test]
    fn stacking_restarts_expired_window() {
        let now = Utc::now();
        let current = Some(now - Duration::days(2));
        let new_expiry = extend_expiry(current, now, Duration::days(7));
        assert_eq!(new_expiry, now + Duration::days(7));
    }

    #[test]
    fn stacking_starts_fresh_without_a_window() {
        let now = Utc::now();
        let new_expiry = extend_expiry(None, now, Duration::hours(168));
        assert_eq!(new_expiry, now + Duration::hours(168));
    }
}
