//! # Collateral Collaborators
//!
//! The vault never touches real assets. It talks to two narrow interfaces:
//!
//! - [`CollateralRegistry`] answers "may this kind back the token?".
//! - [`AssetTransfer`] moves a collateral kind in (pull from a payer) and out
//!   (push to a recipient). Transfers are exact-amount and all-or-nothing:
//!   either the full quantity moves or an error comes back and nothing moved.
//!
//! The in-memory implementations here back the test-suites and the operator
//! node. A production deployment swaps in a custodian adapter without the
//! vault noticing.
//!
//! ## Transactions
//!
//! The treasury runs every operation all-or-nothing. Because the asset
//! collaborator lives outside the treasury's own state, it joins the
//! transaction through [`AssetTransfer::begin`], [`AssetTransfer::commit`]
//! and [`AssetTransfer::rollback`]. Implementations that settle somewhere
//! irreversible can leave the defaults alone; the vault only ever calls
//! `transfer_*` as the final step of an operation.

use ballast_protocol::Address;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Identifier of an accepted backing asset, e.g. `"USDC"` or `"T-BILL-2027"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollateralKind(String);

impl CollateralKind {
    /// Wraps a symbol.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// The symbol.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CollateralKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollateralKind {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

impl From<String> for CollateralKind {
    fn from(symbol: String) -> Self {
        Self(symbol)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an asset transfer did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The collaborator doesn't know this collateral kind.
    #[error("unknown asset: {0}")]
    UnknownAsset(CollateralKind),

    /// The paying side doesn't hold enough.
    #[error("{holder} holds {available} {kind}, transfer needs {requested}")]
    InsufficientFunds {
        /// Who was supposed to pay.
        holder: Address,
        /// Which asset.
        kind: CollateralKind,
        /// What they hold, native precision.
        available: u128,
        /// What the transfer needed, native precision.
        requested: u128,
    },

    /// The custodian refused for its own reasons.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Collateral allow-list.
pub trait CollateralRegistry: Send {
    /// Whether `kind` is currently accepted.
    fn is_approved_collateral(&self, kind: &CollateralKind) -> bool;

    /// Every accepted kind, in the registry's preference order.
    fn list_approved_collateral(&self) -> Vec<CollateralKind>;
}

/// Moves collateral between the vault and the outside world.
pub trait AssetTransfer: Send {
    /// Native decimals of `kind`, if the collaborator knows it.
    fn decimals(&self, kind: &CollateralKind) -> Option<u8>;

    /// Pulls exactly `amount` of `kind` from `payer` into the vault.
    fn transfer_from(
        &mut self,
        kind: &CollateralKind,
        payer: &Address,
        amount: u128,
    ) -> Result<(), TransferError>;

    /// Pushes exactly `amount` of `kind` from the vault to `recipient`.
    fn transfer_to(
        &mut self,
        kind: &CollateralKind,
        recipient: &Address,
        amount: u128,
    ) -> Result<(), TransferError>;

    /// A treasury operation is starting.
    fn begin(&mut self) {}

    /// The operation succeeded; keep whatever moved.
    fn commit(&mut self) {}

    /// The operation failed; undo whatever moved since [`AssetTransfer::begin`].
    fn rollback(&mut self) {}
}

// ---------------------------------------------------------------------------
// Static registry
// ---------------------------------------------------------------------------

/// Fixed allow-list kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct StaticCollateralRegistry {
    approved: Vec<CollateralKind>,
}

impl StaticCollateralRegistry {
    /// A registry accepting `kinds`, in the given order. Duplicates are
    /// dropped.
    pub fn new(kinds: impl IntoIterator<Item = CollateralKind>) -> Self {
        let mut registry = Self::default();
        for kind in kinds {
            registry.approve(kind);
        }
        registry
    }

    /// Adds `kind` to the end of the list if it isn't there yet.
    pub fn approve(&mut self, kind: CollateralKind) {
        if !self.approved.contains(&kind) {
            self.approved.push(kind);
        }
    }

    /// Removes `kind`. Returns whether it was present.
    pub fn revoke(&mut self, kind: &CollateralKind) -> bool {
        let before = self.approved.len();
        self.approved.retain(|k| k != kind);
        self.approved.len() != before
    }
}

impl CollateralRegistry for StaticCollateralRegistry {
    fn is_approved_collateral(&self, kind: &CollateralKind) -> bool {
        self.approved.contains(kind)
    }

    fn list_approved_collateral(&self) -> Vec<CollateralKind> {
        self.approved.clone()
    }
}

// ---------------------------------------------------------------------------
// In-memory custody
// ---------------------------------------------------------------------------

type HoldingKey = (Address, CollateralKind);

#[derive(Debug, Default)]
struct CustodyInner {
    decimals: BTreeMap<CollateralKind, u8>,
    holdings: BTreeMap<HoldingKey, u128>,
    /// Prior values of every holding written since `begin`, oldest first.
    journal: Option<Vec<(HoldingKey, Option<u128>)>>,
}

impl CustodyInner {
    fn holding(&self, key: &HoldingKey) -> u128 {
        self.holdings.get(key).copied().unwrap_or(0)
    }

    fn set_holding(&mut self, key: HoldingKey, value: u128) {
        let previous = self.holdings.insert(key.clone(), value);
        if let Some(journal) = self.journal.as_mut() {
            journal.push((key, previous));
        }
    }
}

/// A holdings book: who owns how much of which asset.
///
/// The vault's own holdings sit under `vault`. Clones share the same book,
/// so a test can keep a handle while the treasury owns another.
///
/// Inside a transaction every write records the value it replaced, so a
/// rollback costs as much as the operation did, not as much as the book.
#[derive(Debug, Clone)]
pub struct InMemoryCustody {
    vault: Address,
    inner: Arc<Mutex<CustodyInner>>,
}

impl InMemoryCustody {
    /// Empty book with the vault holding nothing.
    pub fn new(vault: Address) -> Self {
        Self {
            vault,
            inner: Arc::new(Mutex::new(CustodyInner::default())),
        }
    }

    /// Makes `kind` transferable with `decimals` native precision.
    pub fn register_asset(&self, kind: CollateralKind, decimals: u8) {
        self.inner.lock().decimals.insert(kind, decimals);
    }

    /// Gives `holder` an extra `amount` of `kind` out of thin air. Test and
    /// devnet faucet only.
    pub fn credit(&self, holder: &Address, kind: &CollateralKind, amount: u128) {
        let mut inner = self.inner.lock();
        let key = (holder.clone(), kind.clone());
        let credited = inner.holding(&key).saturating_add(amount);
        inner.set_holding(key, credited);
    }

    /// What `holder` owns of `kind`.
    pub fn balance_of(&self, holder: &Address, kind: &CollateralKind) -> u128 {
        self.inner.lock().holding(&(holder.clone(), kind.clone()))
    }

    /// The vault's address in this book.
    pub fn vault(&self) -> &Address {
        &self.vault
    }

    /// Every registered asset kind.
    pub fn assets(&self) -> BTreeSet<CollateralKind> {
        self.inner.lock().decimals.keys().cloned().collect()
    }

    fn move_funds(
        &self,
        kind: &CollateralKind,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        let mut inner = self.inner.lock();
        if !inner.decimals.contains_key(kind) {
            return Err(TransferError::UnknownAsset(kind.clone()));
        }
        let from_key = (from.clone(), kind.clone());
        let available = inner.holding(&from_key);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                holder: from.clone(),
                kind: kind.clone(),
                available,
                requested: amount,
            });
        }
        // A holder paying itself ends up where it started.
        if from == to {
            return Ok(());
        }
        let to_key = (to.clone(), kind.clone());
        let credited = inner
            .holding(&to_key)
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected("recipient balance overflow".into()))?;

        inner.set_holding(from_key, available - amount);
        inner.set_holding(to_key, credited);
        Ok(())
    }
}

impl AssetTransfer for InMemoryCustody {
    fn decimals(&self, kind: &CollateralKind) -> Option<u8> {
        self.inner.lock().decimals.get(kind).copied()
    }

    fn transfer_from(
        &mut self,
        kind: &CollateralKind,
        payer: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        let vault = self.vault.clone();
        self.move_funds(kind, payer, &vault, amount)
    }

    fn transfer_to(
        &mut self,
        kind: &CollateralKind,
        recipient: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        let vault = self.vault.clone();
        self.move_funds(kind, &vault, recipient, amount)
    }

    fn begin(&mut self) {
        self.inner.lock().journal = Some(Vec::new());
    }

    fn commit(&mut self) {
        self.inner.lock().journal = None;
    }

    fn rollback(&mut self) {
        let mut inner = self.inner.lock();
        let Some(journal) = inner.journal.take() else {
            return;
        };
        for (key, previous) in journal.into_iter().rev() {
            match previous {
                Some(value) => inner.holdings.insert(key, value),
                None => inner.holdings.remove(&key),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc() -> CollateralKind {
        CollateralKind::from("USDC")
    }

    #[test]
    fn registry_keeps_order_and_dedups() {
        let mut registry =
            StaticCollateralRegistry::new(vec![usdc(), "DAI".into(), usdc()]);
        assert_eq!(registry.list_approved_collateral(), vec![usdc(), "DAI".into()]);
        assert!(registry.revoke(&usdc()));
        assert!(!registry.is_approved_collateral(&usdc()));
        assert!(!registry.revoke(&usdc()));
    }

    #[test]
    fn custody_moves_exact_amounts() {
        let mut custody = InMemoryCustody::new(Address::from("vault"));
        custody.register_asset(usdc(), 6);
        let alice = Address::from("alice");
        custody.credit(&alice, &usdc(), 1_000);

        custody.transfer_from(&usdc(), &alice, 400).unwrap();
        assert_eq!(custody.balance_of(&alice, &usdc()), 600);
        assert_eq!(custody.balance_of(&Address::from("vault"), &usdc()), 400);

        custody.transfer_to(&usdc(), &alice, 150).unwrap();
        assert_eq!(custody.balance_of(&alice, &usdc()), 750);
    }

    #[test]
    fn custody_rejects_shortfall_without_moving_anything() {
        let mut custody = InMemoryCustody::new(Address::from("vault"));
        custody.register_asset(usdc(), 6);
        let bob = Address::from("bob");
        custody.credit(&bob, &usdc(), 10);

        let err = custody.transfer_from(&usdc(), &bob, 11).unwrap_err();
        assert!(matches!(err, TransferError::InsufficientFunds { available: 10, requested: 11, .. }));
        assert_eq!(custody.balance_of(&bob, &usdc()), 10);
    }

    #[test]
    fn custody_rejects_unknown_asset() {
        let mut custody = InMemoryCustody::new(Address::from("vault"));
        let err = custody
            .transfer_from(&"XAU".into(), &Address::from("carol"), 1)
            .unwrap_err();
        assert_eq!(err, TransferError::UnknownAsset("XAU".into()));
        assert_eq!(custody.decimals(&"XAU".into()), None);
    }

    #[test]
    fn rollback_restores_book() {
        let mut custody = InMemoryCustody::new(Address::from("vault"));
        custody.register_asset(usdc(), 6);
        let alice = Address::from("alice");
        custody.credit(&alice, &usdc(), 100);

        custody.begin();
        custody.transfer_from(&usdc(), &alice, 100).unwrap();
        custody.rollback();
        assert_eq!(custody.balance_of(&alice, &usdc()), 100);

        custody.begin();
        custody.transfer_from(&usdc(), &alice, 40).unwrap();
        custody.commit();
        custody.rollback();
        assert_eq!(custody.balance_of(&alice, &usdc()), 60);
    }

    #[test]
    fn rollback_replays_several_writes_to_one_holding() {
        let mut custody = InMemoryCustody::new(Address::from("vault"));
        custody.register_asset(usdc(), 6);
        let alice = Address::from("alice");
        let vault = Address::from("vault");
        custody.credit(&alice, &usdc(), 100);

        custody.begin();
        custody.transfer_from(&usdc(), &alice, 30).unwrap();
        custody.transfer_from(&usdc(), &alice, 30).unwrap();
        custody.transfer_to(&usdc(), &alice, 10).unwrap();
        custody.credit(&Address::from("carol"), &usdc(), 5);
        custody.rollback();

        assert_eq!(custody.balance_of(&alice, &usdc()), 100);
        assert_eq!(custody.balance_of(&vault, &usdc()), 0);
        assert_eq!(custody.balance_of(&Address::from("carol"), &usdc()), 0);
    }

    #[test]
    fn vault_paying_itself_changes_nothing() {
        let mut custody = InMemoryCustody::new(Address::from("vault"));
        custody.register_asset(usdc(), 6);
        let vault = Address::from("vault");
        custody.credit(&vault, &usdc(), 500);

        custody.transfer_from(&usdc(), &vault, 500).unwrap();
        assert_eq!(custody.balance_of(&vault, &usdc()), 500);
        custody.transfer_to(&usdc(), &vault, 200).unwrap();
        assert_eq!(custody.balance_of(&vault, &usdc()), 500);

        let err = custody.transfer_from(&usdc(), &vault, 501).unwrap_err();
        assert!(matches!(err, TransferError::InsufficientFunds { available: 500, .. }));
    }
}
