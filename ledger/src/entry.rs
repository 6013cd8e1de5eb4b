//! # Ledger Entries
//!
//! Immutable audit records, one per committed balance mutation. Entries
//! are append-only and never consulted to authorize anything — the live
//! balance is the only authority. Their job is history: the transaction
//! list a user sees, and the trail an operator greps when a balance looks
//! wrong.
//!
//! Context fields are all `Option` and serialization skips absent ones,
//! so a boost entry never carries a `years` field and a subscription
//! entry never carries a `product_id`. Absent means absent, not null.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EntryKind
// ---------------------------------------------------------------------------

/// What kind of balance mutation an entry records.
///
/// Earns are positive-amount kinds, spends negative. The three purchase
/// kinds are the same computation reported under the provider that
/// confirmed the payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    SignupBonus,
    ReferralNewUserBonus,
    ReferralInviterBonus,
    PurchaseStripe,
    PurchaseIap,
    PurchaseNetopia,
    SpendBoost,
    CollectionSubscription,
    AuctionCreationFee,
    ProductListingFee,
    PromotionProduct,
    PromotionAuction,
}

impl EntryKind {
    /// Returns `true` for kinds that add credits.
    pub fn is_earn(&self) -> bool {
        matches!(
            self,
            EntryKind::SignupBonus
                | EntryKind::ReferralNewUserBonus
                | EntryKind::ReferralInviterBonus
                | EntryKind::PurchaseStripe
                | EntryKind::PurchaseIap
                | EntryKind::PurchaseNetopia
        )
    }
}

// ---------------------------------------------------------------------------
// LedgerEntry
// ---------------------------------------------------------------------------

/// One immutable record of a balance mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry id.
    pub id: Uuid,

    /// The account this entry belongs to.
    pub user_id: String,

    /// What happened.
    pub kind: EntryKind,

    /// Signed credit delta: positive for earns, negative for spends.
    pub amount: i64,

    /// The listing involved, for boost/listing-fee/product-promotion spends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<Uuid>,

    /// The auction involved, for auction-fee/auction-promotion spends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<Uuid>,

    /// Requested duration, where the operation has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<u32>,

    /// Subscription length, for collection subscriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years: Option<u32>,

    /// The other side of a referral bonus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_user_id: Option<String>,

    /// External payment reference, for purchase earns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,

    /// Server timestamp at append time.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Creates a context-free entry. Callers set the context fields they
    /// actually have via the builder-ish `with_*` methods.
    pub fn new(user_id: impl Into<String>, kind: EntryKind, amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            kind,
            amount,
            product_id: None,
            auction_id: None,
            duration_hours: None,
            years: None,
            related_user_id: None,
            payment_reference: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_product(mut self, product_id: Uuid) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn with_auction(mut self, auction_id: Uuid) -> Self {
        self.auction_id = Some(auction_id);
        self
    }

    pub fn with_duration_hours(mut self, hours: u32) -> Self {
        self.duration_hours = Some(hours);
        self
    }

    pub fn with_years(mut self, years: u32) -> Self {
        self.years = Some(years);
        self
    }

    pub fn with_related_user(mut self, user_id: impl Into<String>) -> Self {
        self.related_user_id = Some(user_id.into());
        self
    }

    pub fn with_payment_reference(mut self, reference: impl Into<String>) -> Self {
        self.payment_reference = Some(reference.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_kinds_serialize_snake_case() {
        let json = serde_json::to_string(&EntryKind::ReferralNewUserBonus).unwrap();
        assert_eq!(json, "\"referral_new_user_bonus\"");
        let json = serde_json::to_string(&EntryKind::PurchaseIap).unwrap();
        assert_eq!(json, "\"purchase_iap\"");
        let json = serde_json::to_string(&EntryKind::SpendBoost).unwrap();
        assert_eq!(json, "\"spend_boost\"");
    }

    #[test]
    fn earn_kinds_are_classified() {
        assert!(EntryKind::SignupBonus.is_earn());
        assert!(EntryKind::PurchaseStripe.is_earn());
        assert!(!EntryKind::SpendBoost.is_earn());
        assert!(!EntryKind::AuctionCreationFee.is_earn());
    }

    #[test]
    fn absent_context_fields_are_not_written() {
        let entry = LedgerEntry::new("alice", EntryKind::SpendBoost, -10)
            .with_product(Uuid::new_v4())
            .with_duration_hours(168);

        let json = serde_json::to_value(&entry).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("product_id"));
        assert!(obj.contains_key("duration_hours"));
        // Absent fields must not appear at all, not even as null.
        assert!(!obj.contains_key("auction_id"));
        assert!(!obj.contains_key("years"));
        assert!(!obj.contains_key("related_user_id"));
        assert!(!obj.contains_key("payment_reference"));
    }

    #[test]
    fn entry_roundtrips_through_json() {
        let entry = LedgerEntry::new("bob", EntryKind::PurchaseNetopia, 40)
            .with_payment_reference("ntp_12345");
        let json = serde_json::to_vec(&entry).unwrap();
        let recovered: LedgerEntry = serde_json::from_slice(&json).unwrap();
        assert_eq!(recovered.id, entry.id);
        assert_eq!(recovered.kind, EntryKind::PurchaseNetopia);
        assert_eq!(recovered.amount, 40);
        assert_eq!(recovered.payment_reference.as_deref(), Some("ntp_12345"));
        assert_eq!(recovered.years, None);
    }
}
