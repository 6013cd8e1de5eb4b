// Copyright (c) 2026 Curio Marketplace. MIT License.
// See LICENSE for details.

//! # Curio Credit Ledger — Core Library
//!
//! The credit economy underneath every paid feature of the Curio
//! collectibles marketplace. Real-money payments (confirmed by external
//! providers) and promotional grants become an internal credit balance;
//! the balance funds visibility boosts, homepage promotion, listing and
//! auction duration, and the annual collection subscription.
//!
//! This crate is the part of the marketplace where mistakes cost money,
//! so the rules are strict: balances are deterministic under concurrent
//! access, the time-limited signup bonus expires lazily without any
//! background job, and every mutation leaves an immutable ledger entry.
//!
//! ## Architecture
//!
//! - **config** — Pricing constants and the promotional calendar.
//! - **account** — Per-user balance, the promo sub-balance, and the
//!   expiry normalizer.
//! - **entry** — Append-only ledger entries for audit and history.
//! - **market** — The listing/auction state the ledger is allowed to touch.
//! - **fees** — Pure fee calculators and the shared expiry-stacking rule.
//! - **store** — sled-backed persistence with optimistic transactions.
//! - **ops** — The earn and spend operations themselves.
//! - **error** — One typed error for everything that can go wrong.
//!
//! ## Design Philosophy
//!
//! 1. A spend either fully happens or fully doesn't. No partial state.
//! 2. Authorization is always against the live balance, never the log.
//! 3. The ledger log may under-count in rare failure windows; the balance
//!    never lies.

pub mod account;
pub mod config;
pub mod entry;
pub mod error;
pub mod fees;
pub mod market;
pub mod ops;
pub mod store;

pub use error::LedgerError;
pub use ops::Ledger;
