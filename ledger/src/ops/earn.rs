//! # Earn Operations
//!
//! The three ways credits enter an account: the signup bonus, the
//! dual-sided referral bonus, and confirmed credit purchases. Earns never
//! fail for balance reasons — their failure modes are missing accounts
//! and storage, nothing else.
//!
//! Both idempotency guards live inside the transactions that grant the
//! credits: the `referral_bonus_applied` flag flips in the same commit
//! as the bonus, and the payment marker lands in the same commit as the
//! purchased credits. A replay finds the guard and becomes a no-op.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionError;
use sled::Transactional;

use crate::account::{Account, PromoCredits};
use crate::config;
use crate::entry::{EntryKind, LedgerEntry};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{decode, encode, unwrap_txn, PaymentMarker};

use super::{abort, Ledger};

// ---------------------------------------------------------------------------
// PaymentProvider
// ---------------------------------------------------------------------------

/// The external processors whose callbacks can credit an account.
///
/// Providers differ only in how the entry is labeled; the credit math is
/// identical across all three.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Stripe,
    Iap,
    Netopia,
}

impl PaymentProvider {
    /// The entry kind a purchase through this provider is recorded under.
    pub fn entry_kind(&self) -> EntryKind {
        match self {
            PaymentProvider::Stripe => EntryKind::PurchaseStripe,
            PaymentProvider::Iap => EntryKind::PurchaseIap,
            PaymentProvider::Netopia => EntryKind::PurchaseNetopia,
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Iap => "iap",
            PaymentProvider::Netopia => "netopia",
        };
        f.write_str(s)
    }
}

impl FromStr for PaymentProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(PaymentProvider::Stripe),
            "iap" => Ok(PaymentProvider::Iap),
            "netopia" => Ok(PaymentProvider::Netopia),
            other => Err(format!("unknown payment provider: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of an account-creation call.
#[derive(Clone, Debug)]
pub struct AccountCreation {
    /// The account as stored — freshly created or already existing.
    pub account: Account,
    /// `false` when the user already had an account (the call was a no-op).
    pub created: bool,
}

/// Result of a referral-bonus application.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ReferralOutcome {
    /// `false` when the bonus had already fired or there is no referrer.
    pub applied: bool,
}

/// Result of a purchase confirmation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PurchaseOutcome {
    /// Credits added by this call. Zero on replays and on payments below
    /// the unit price.
    pub credits_added: u64,
    /// `true` when the payment reference had already been credited.
    pub already_processed: bool,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl Ledger {
    /// Creates an account with the signup bonus applied, or returns the
    /// existing one. Safe to call on every login.
    ///
    /// The bonus in force depends on the server clock at creation time —
    /// see [`config::signup_bonus_at`]. `referred_by` is recorded but the
    /// referral bonus itself waits for [`Ledger::apply_referral_bonus`].
    pub fn create_account(
        &self,
        user_id: &str,
        referred_by: Option<String>,
    ) -> LedgerResult<AccountCreation> {
        let now = Utc::now();
        let res: Result<(Account, bool), TransactionError<LedgerError>> =
            self.store().accounts.transaction(|accounts| {
                if let Some(bytes) = accounts.get(user_id.as_bytes())? {
                    let existing: Account = decode(&bytes).map_err(abort)?;
                    return Ok((existing, false));
                }
                let (account, _bonus) =
                    Account::with_signup_bonus(user_id, referred_by.clone(), now);
                accounts.insert(user_id.as_bytes(), encode(&account).map_err(abort)?)?;
                Ok((account, true))
            });
        let (account, created) = res.map_err(unwrap_txn)?;

        if created {
            let bonus = account.promo_remaining();
            tracing::info!(user_id, bonus, "account created with signup bonus");
            self.store().append_entry_best_effort(&LedgerEntry::new(
                user_id,
                EntryKind::SignupBonus,
                bonus as i64,
            ));
        }

        Ok(AccountCreation { account, created })
    }

    /// Fires the dual-sided referral bonus for `user_id`, at most once.
    ///
    /// Both sides land in one transaction over the accounts tree: the new
    /// user's promotional pool grows and its expiry moves to at least
    /// `now + REFERRAL_BONUS_VALIDITY_DAYS` (never backwards), the inviter
    /// gains permanent credits, and the at-most-once flag flips. Either
    /// everything commits or nothing does — there is no state where one
    /// side got paid and the other didn't.
    ///
    /// No-op (applied = false) when the bonus already fired or the user
    /// has no referrer. Errors if either account is missing.
    pub fn apply_referral_bonus(&self, user_id: &str) -> LedgerResult<ReferralOutcome> {
        let now = Utc::now();
        let res: Result<Option<String>, TransactionError<LedgerError>> =
            self.store().accounts.transaction(|accounts| {
                let bytes = accounts
                    .get(user_id.as_bytes())?
                    .ok_or_else(|| abort(LedgerError::AccountNotFound(user_id.to_string())))?;
                let new_user: Account = decode(&bytes).map_err(abort)?;

                if new_user.referral_bonus_applied {
                    return Ok(None);
                }
                let Some(inviter_id) = new_user.referred_by.clone() else {
                    return Ok(None);
                };
                // A self-referral would make the two writes below clobber
                // each other; treat it as no referrer.
                if inviter_id == *user_id {
                    return Ok(None);
                }

                let inviter_bytes = accounts
                    .get(inviter_id.as_bytes())?
                    .ok_or_else(|| abort(LedgerError::AccountNotFound(inviter_id.clone())))?;
                let mut inviter: Account = decode(&inviter_bytes).map_err(abort)?;

                // Expired promo is written off before the top-up so the
                // bonus never resurrects dead credits.
                let mut new_user = new_user.normalize(now).account;
                let floor = now + Duration::days(config::REFERRAL_BONUS_VALIDITY_DAYS);
                new_user.promo = Some(match new_user.promo {
                    Some(p) => PromoCredits {
                        amount: p.amount + config::REFERRAL_BONUS_REFERRED_CREDITS,
                        expires_at: p.expires_at.max(floor),
                    },
                    None => PromoCredits {
                        amount: config::REFERRAL_BONUS_REFERRED_CREDITS,
                        expires_at: floor,
                    },
                });
                new_user.referral_bonus_applied = true;

                inviter.permanent_credits = inviter
                    .permanent_credits
                    .checked_add(config::REFERRAL_BONUS_INVITER_CREDITS)
                    .ok_or_else(|| abort(LedgerError::Overflow(inviter_id.clone())))?;

                accounts.insert(user_id.as_bytes(), encode(&new_user).map_err(abort)?)?;
                accounts.insert(inviter_id.as_bytes(), encode(&inviter).map_err(abort)?)?;
                Ok(Some(inviter_id))
            });

        match res.map_err(unwrap_txn)? {
            Some(inviter_id) => {
                tracing::info!(user_id, inviter_id, "referral bonus applied");
                self.store().append_entry_best_effort(
                    &LedgerEntry::new(
                        user_id,
                        EntryKind::ReferralNewUserBonus,
                        config::REFERRAL_BONUS_REFERRED_CREDITS as i64,
                    )
                    .with_related_user(inviter_id.clone()),
                );
                self.store().append_entry_best_effort(
                    &LedgerEntry::new(
                        &inviter_id,
                        EntryKind::ReferralInviterBonus,
                        config::REFERRAL_BONUS_INVITER_CREDITS as i64,
                    )
                    .with_related_user(user_id),
                );
                Ok(ReferralOutcome { applied: true })
            }
            None => Ok(ReferralOutcome { applied: false }),
        }
    }

    /// Credits an account for a confirmed external payment.
    ///
    /// Credits granted are `floor(paid / CREDIT_UNIT_PRICE_MINOR)` into
    /// the permanent pool. The payment marker is written in the same
    /// transaction, so a replayed provider callback (same reference)
    /// returns `already_processed` and changes nothing. Non-positive
    /// amounts are dropped without touching storage; a positive amount
    /// below the unit price still burns its reference so a retried
    /// callback can't be upgraded later.
    pub fn record_purchase(
        &self,
        user_id: &str,
        provider: PaymentProvider,
        paid_amount_minor: i64,
        payment_reference: &str,
    ) -> LedgerResult<PurchaseOutcome> {
        if paid_amount_minor <= 0 {
            tracing::warn!(
                user_id,
                %provider,
                paid_amount_minor,
                payment_reference,
                "ignoring non-positive payment amount"
            );
            return Ok(PurchaseOutcome {
                credits_added: 0,
                already_processed: false,
            });
        }

        let credits = (paid_amount_minor / config::CREDIT_UNIT_PRICE_MINOR) as u64;
        let now = Utc::now();
        let res: Result<Option<u64>, TransactionError<LedgerError>> =
            (&self.store().accounts, &self.store().payments).transaction(
                |(accounts, payments)| {
                    if payments.get(payment_reference.as_bytes())?.is_some() {
                        return Ok(None);
                    }
                    let bytes = accounts.get(user_id.as_bytes())?.ok_or_else(|| {
                        abort(LedgerError::AccountNotFound(user_id.to_string()))
                    })?;
                    let mut account: Account = decode(&bytes).map_err(abort)?;
                    account.permanent_credits = account
                        .permanent_credits
                        .checked_add(credits)
                        .ok_or_else(|| abort(LedgerError::Overflow(user_id.to_string())))?;
                    accounts.insert(user_id.as_bytes(), encode(&account).map_err(abort)?)?;

                    let marker = PaymentMarker {
                        user_id: user_id.to_string(),
                        credits,
                        created_at: now,
                    };
                    payments.insert(
                        payment_reference.as_bytes(),
                        encode(&marker).map_err(abort)?,
                    )?;
                    Ok(Some(credits))
                },
            );

        match res.map_err(unwrap_txn)? {
            Some(credits_added) => {
                tracing::info!(
                    user_id,
                    %provider,
                    credits_added,
                    payment_reference,
                    "purchase credited"
                );
                if credits_added > 0 {
                    self.store().append_entry_best_effort(
                        &LedgerEntry::new(user_id, provider.entry_kind(), credits_added as i64)
                            .with_payment_reference(payment_reference),
                    );
                }
                Ok(PurchaseOutcome {
                    credits_added,
                    already_processed: false,
                })
            }
            None => {
                tracing::debug!(payment_reference, "payment reference already processed");
                Ok(PurchaseOutcome {
                    credits_added: 0,
                    already_processed: true,
                })
            }
        }
    }
}
