//! # Share Ledger
//!
//! Rebasing balance accounting for the stable unit.
//!
//! Holders own **shares**, a fixed accounting unit that never changes when
//! NAV moves. What they see is an **amount**: `shares × nav_per_share /
//! PRECISION`, rounded toward zero. When the oracle publishes a higher NAV
//! every balance grows without a single storage write.
//!
//! ```text
//!   shares (stored)  ──×nav/1e18──▶  amount (displayed, transferred)
//!   amount (input)   ──×1e18/nav──▶  shares (moved)
//! ```
//!
//! Only the configured minter (the vault) may create or destroy shares.
//! Everyone else moves shares around with [`ShareLedger::transfer`] and
//! friends, which convert the requested amount to shares at the current NAV
//! first. The total never changes on a transfer, so `Σ shares ==
//! total_shares` holds after every call.
//!
//! NAV is not stored here. Callers pass a [`NavSource`], the oracle in
//! production, [`ParNav`] (1:1) when no oracle is configured.
//!
//! Between [`ShareLedger::begin`] and [`ShareLedger::commit`] every write
//! logs the value it replaced; [`ShareLedger::rollback`] replays that log
//! backwards.

use ballast_protocol::config::{PRECISION, STABLE_DECIMALS, TOKEN_NAME, TOKEN_SYMBOL};
use ballast_protocol::math::{amount_for_shares, shares_for_amount};
use ballast_protocol::{Address, MathError};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::{math_category, ErrorCategory};
use crate::events::TreasuryEvent;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the share ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Caller is not the configured minter.
    #[error("{caller} is not authorized to mint or burn shares")]
    Unauthorized {
        /// Who tried.
        caller: Address,
    },

    /// Burn exceeds the account's shares.
    #[error("insufficient shares: {account} holds {available}, burn needs {requested}")]
    InsufficientShares {
        /// Account being burned from.
        account: Address,
        /// Shares held.
        available: u128,
        /// Shares requested.
        requested: u128,
    },

    /// A transfer converted to more shares than the sender holds.
    #[error("insufficient balance: {account} holds {available} shares, transfer needs {requested}")]
    InsufficientBalance {
        /// Sender.
        account: Address,
        /// Shares held.
        available: u128,
        /// Shares the transfer converted to.
        requested: u128,
    },

    /// `transfer_from` exceeds what the owner approved.
    #[error("insufficient allowance: {allowed} approved, {requested} requested")]
    InsufficientAllowance {
        /// Remaining allowance, in amount units.
        allowed: u128,
        /// Requested amount.
        requested: u128,
    },

    /// The recipient address is empty.
    #[error("invalid recipient")]
    InvalidRecipient,

    /// Conversion overflowed or NAV was zero.
    #[error("ledger arithmetic: {0}")]
    Math(#[from] MathError),
}

impl LedgerError {
    /// Taxonomy bucket for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::Unauthorized { .. } => ErrorCategory::Authorization,
            LedgerError::InsufficientShares { .. }
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::InsufficientAllowance { .. } => ErrorCategory::ResourceInsufficiency,
            LedgerError::InvalidRecipient => ErrorCategory::Validation,
            LedgerError::Math(e) => math_category(e),
        }
    }

    /// Machine-readable reason code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            LedgerError::Unauthorized { .. } => "UNAUTHORIZED",
            LedgerError::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::InsufficientAllowance { .. } => "INSUFFICIENT_ALLOWANCE",
            LedgerError::InvalidRecipient => "INVALID_RECIPIENT",
            LedgerError::Math(_) => "ARITHMETIC_ERROR",
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Anything that can quote NAV per share (18 decimals).
pub trait NavSource {
    /// Current NAV per share.
    fn nav_per_share(&self) -> u128;
}

/// NAV fixed at 1.0. Used when no oracle is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParNav;

impl NavSource for ParNav {
    fn nav_per_share(&self) -> u128 {
        PRECISION
    }
}

/// Read access to the share total. The oracle needs nothing more.
pub trait ShareSupply {
    /// Total shares outstanding.
    fn total_shares(&self) -> u128;
}

/// Privileged mint/burn. Handed to the vault and nobody else.
pub trait ShareMinter: ShareSupply {
    /// Shares held by `account`.
    fn shares_of(&self, account: &Address) -> u128;

    /// Creates `shares` for `to`. `nav` prices the emitted event.
    fn mint(
        &mut self,
        caller: &Address,
        to: &Address,
        shares: u128,
        nav: &dyn NavSource,
    ) -> Result<(), LedgerError>;

    /// Destroys `shares` held by `from`.
    fn burn(
        &mut self,
        caller: &Address,
        from: &Address,
        shares: u128,
        nav: &dyn NavSource,
    ) -> Result<(), LedgerError>;
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// A value overwritten inside an open transaction. Zero stands for "absent".
#[derive(Debug, Clone)]
enum LedgerUndo {
    Shares(Address, u128),
    TotalShares(u128),
    Allowance((Address, Address), u128),
}

/// The rebasing share ledger.
#[derive(Debug, Clone)]
pub struct ShareLedger {
    name: String,
    symbol: String,
    minter: Address,
    shares: HashMap<Address, u128>,
    total_shares: u128,
    allowances: HashMap<(Address, Address), u128>,
    journal: Option<Vec<LedgerUndo>>,
    events: Vec<TreasuryEvent>,
}

impl ShareLedger {
    /// Empty ledger whose only minter is `minter`.
    pub fn new(minter: Address) -> Self {
        Self {
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            minter,
            shares: HashMap::new(),
            total_shares: 0,
            allowances: HashMap::new(),
            journal: None,
            events: Vec::new(),
        }
    }

    // -- Transactions -------------------------------------------------------

    /// Starts logging writes.
    pub fn begin(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Keeps every write since [`ShareLedger::begin`].
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Undoes every write since [`ShareLedger::begin`] and drops the
    /// buffered events.
    pub fn rollback(&mut self) {
        self.events.clear();
        let Some(journal) = self.journal.take() else {
            return;
        };
        for undo in journal.into_iter().rev() {
            match undo {
                LedgerUndo::Shares(account, shares) => self.set_shares(&account, shares),
                LedgerUndo::TotalShares(total) => self.total_shares = total,
                LedgerUndo::Allowance((owner, spender), amount) => {
                    self.set_allowance(&owner, &spender, amount)
                }
            }
        }
    }

    fn log(&mut self, undo: impl FnOnce(&Self) -> LedgerUndo) {
        if self.journal.is_some() {
            let entry = undo(self);
            if let Some(journal) = self.journal.as_mut() {
                journal.push(entry);
            }
        }
    }

    /// Token display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token ticker.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Decimals of the amount unit.
    pub fn decimals(&self) -> u8 {
        STABLE_DECIMALS
    }

    /// The only address allowed to mint and burn.
    pub fn minter(&self) -> &Address {
        &self.minter
    }

    // -- Reads --------------------------------------------------------------

    /// Raw shares held by `account`. Zero for never-seen accounts.
    pub fn shares_of(&self, account: &Address) -> u128 {
        self.shares.get(account).copied().unwrap_or(0)
    }

    /// Total shares outstanding.
    pub fn total_shares(&self) -> u128 {
        self.total_shares
    }

    /// Rebased balance of `account` at `nav`.
    pub fn balance_of(&self, account: &Address, nav: &dyn NavSource) -> Result<u128, LedgerError> {
        Ok(amount_for_shares(self.shares_of(account), nav.nav_per_share())?)
    }

    /// Rebased total supply at `nav`.
    pub fn total_supply(&self, nav: &dyn NavSource) -> Result<u128, LedgerError> {
        Ok(amount_for_shares(self.total_shares, nav.nav_per_share())?)
    }

    /// Shares that `amount` is worth at `nav`, rounded down.
    pub fn get_shares_by_amount(&self, amount: u128, nav: &dyn NavSource) -> Result<u128, LedgerError> {
        Ok(shares_for_amount(amount, nav.nav_per_share())?)
    }

    /// Amount that `shares` are worth at `nav`, rounded down.
    pub fn get_amount_by_shares(&self, shares: u128, nav: &dyn NavSource) -> Result<u128, LedgerError> {
        Ok(amount_for_shares(shares, nav.nav_per_share())?)
    }

    /// Remaining allowance `owner` granted `spender`, in amount units.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Every account with a non-zero share balance.
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, u128)> + '_ {
        self.shares.iter().map(|(addr, shares)| (addr, *shares))
    }

    /// Number of accounts with a non-zero share balance.
    pub fn holder_count(&self) -> usize {
        self.shares.len()
    }

    /// Drains the events buffered since the last call.
    pub fn take_events(&mut self) -> Vec<TreasuryEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Transfers ----------------------------------------------------------

    /// Moves `amount` (converted to shares at `nav`) from `caller` to `to`.
    /// Returns the shares moved.
    pub fn transfer(
        &mut self,
        caller: &Address,
        to: &Address,
        amount: u128,
        nav: &dyn NavSource,
    ) -> Result<u128, LedgerError> {
        let shares = shares_for_amount(amount, nav.nav_per_share())?;
        self.move_shares(caller, to, shares, amount)?;
        Ok(shares)
    }

    /// Sets the allowance `owner` grants `spender` to exactly `amount`.
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: u128) -> Result<(), LedgerError> {
        if spender.is_empty() {
            return Err(LedgerError::InvalidRecipient);
        }
        self.write_allowance(owner, spender, amount);
        debug!(owner = %owner, spender = %spender, amount, "allowance set");
        self.events.push(TreasuryEvent::Approval {
            owner: owner.clone(),
            spender: spender.clone(),
            amount,
        });
        Ok(())
    }

    /// Moves `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance in amount units. Returns the shares moved.
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
        nav: &dyn NavSource,
    ) -> Result<u128, LedgerError> {
        let allowed = self.allowance(from, spender);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                allowed,
                requested: amount,
            });
        }
        let shares = shares_for_amount(amount, nav.nav_per_share())?;
        self.move_shares(from, to, shares, amount)?;

        self.write_allowance(from, spender, allowed - amount);
        Ok(shares)
    }

    /// Moves raw `shares` from `caller` to `to`. Returns the amount they
    /// were worth at `nav`.
    pub fn transfer_shares(
        &mut self,
        caller: &Address,
        to: &Address,
        shares: u128,
        nav: &dyn NavSource,
    ) -> Result<u128, LedgerError> {
        let amount = amount_for_shares(shares, nav.nav_per_share())?;
        self.move_shares(caller, to, shares, amount)?;
        Ok(amount)
    }

    fn move_shares(
        &mut self,
        from: &Address,
        to: &Address,
        shares: u128,
        amount: u128,
    ) -> Result<(), LedgerError> {
        if to.is_empty() {
            return Err(LedgerError::InvalidRecipient);
        }
        let available = self.shares_of(from);
        if available < shares {
            return Err(LedgerError::InsufficientBalance {
                account: from.clone(),
                available,
                requested: shares,
            });
        }
        if from != to {
            // Cannot overflow: the recipient's shares plus the moved shares
            // are bounded by total_shares.
            let credited = self.shares_of(to) + shares;
            self.write_shares(from, available - shares);
            self.write_shares(to, credited);
        }
        debug!(from = %from, to = %to, shares, amount, "shares transferred");
        self.emit_pair(Some(from.clone()), Some(to.clone()), amount, shares);
        Ok(())
    }

    fn write_shares(&mut self, account: &Address, shares: u128) {
        self.log(|l| LedgerUndo::Shares(account.clone(), l.shares_of(account)));
        self.set_shares(account, shares);
    }

    fn write_total_shares(&mut self, total: u128) {
        self.log(|l| LedgerUndo::TotalShares(l.total_shares));
        self.total_shares = total;
    }

    fn write_allowance(&mut self, owner: &Address, spender: &Address, amount: u128) {
        self.log(|l| {
            LedgerUndo::Allowance((owner.clone(), spender.clone()), l.allowance(owner, spender))
        });
        self.set_allowance(owner, spender, amount);
    }

    fn set_shares(&mut self, account: &Address, shares: u128) {
        if shares == 0 {
            self.shares.remove(account);
        } else {
            self.shares.insert(account.clone(), shares);
        }
    }

    fn set_allowance(&mut self, owner: &Address, spender: &Address, amount: u128) {
        let key = (owner.clone(), spender.clone());
        if amount == 0 {
            self.allowances.remove(&key);
        } else {
            self.allowances.insert(key, amount);
        }
    }

    fn emit_pair(&mut self, from: Option<Address>, to: Option<Address>, amount: u128, shares: u128) {
        self.events.push(TreasuryEvent::Transfer {
            from: from.clone(),
            to: to.clone(),
            amount,
        });
        self.events
            .push(TreasuryEvent::TransferShares { from, to, shares });
    }

    fn ensure_minter(&self, caller: &Address) -> Result<(), LedgerError> {
        if caller != &self.minter {
            return Err(LedgerError::Unauthorized {
                caller: caller.clone(),
            });
        }
        Ok(())
    }
}

impl ShareSupply for ShareLedger {
    fn total_shares(&self) -> u128 {
        self.total_shares
    }
}

impl ShareMinter for ShareLedger {
    fn shares_of(&self, account: &Address) -> u128 {
        ShareLedger::shares_of(self, account)
    }

    fn mint(
        &mut self,
        caller: &Address,
        to: &Address,
        shares: u128,
        nav: &dyn NavSource,
    ) -> Result<(), LedgerError> {
        self.ensure_minter(caller)?;
        if to.is_empty() {
            return Err(LedgerError::InvalidRecipient);
        }
        let amount = amount_for_shares(shares, nav.nav_per_share())?;
        let total = self
            .total_shares
            .checked_add(shares)
            .ok_or(MathError::Overflow)?;
        let credited = self
            .shares_of(to)
            .checked_add(shares)
            .ok_or(MathError::Overflow)?;

        self.write_total_shares(total);
        self.write_shares(to, credited);
        info!(to = %to, shares, amount, total_shares = total, "shares minted");
        self.emit_pair(None, Some(to.clone()), amount, shares);
        Ok(())
    }

    fn burn(
        &mut self,
        caller: &Address,
        from: &Address,
        shares: u128,
        nav: &dyn NavSource,
    ) -> Result<(), LedgerError> {
        self.ensure_minter(caller)?;
        let available = self.shares_of(from);
        if available < shares {
            return Err(LedgerError::InsufficientShares {
                account: from.clone(),
                available,
                requested: shares,
            });
        }
        let amount = amount_for_shares(shares, nav.nav_per_share())?;

        // available ≤ total_shares, so neither subtraction can underflow.
        self.write_total_shares(self.total_shares - shares);
        self.write_shares(from, available - shares);
        info!(from = %from, shares, amount, total_shares = self.total_shares, "shares burned");
        self.emit_pair(Some(from.clone()), None, amount, shares);
        Ok(())
    }
}
