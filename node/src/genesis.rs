//! # Genesis Configuration
//!
//! A node starts from a JSON genesis file that fixes the owner, the
//! attestor set, oracle and vault tunables, the approved collateral and,
//! on development networks, opening custody balances for demo accounts.
//!
//! `ballast-node init` writes one; `ballast-node run` reads it back.
//!
//! The owner and every attestor must be key-derived addresses (lowercase
//! hex Ed25519 public keys): those accounts act only through signed calls,
//! so an address nobody holds a key for could never administer anything.

use anyhow::{bail, Context, Result};
use ballast_contracts::{
    CollateralKind, InMemoryCustody, OracleConfig, StaticCollateralRegistry, Treasury,
    TreasuryConfig, VaultConfig,
};
use ballast_protocol::config::{
    DEFAULT_ATTESTATION_EXPIRY, DEFAULT_ATTESTATION_THRESHOLD, DEFAULT_CIRCUIT_BREAKER_THRESHOLD_BPS,
    DEFAULT_MAX_NAV_CHANGE_BPS, DEFAULT_MAX_STALENESS, DEFAULT_MINT_FEE_BPS, DEFAULT_MIN_DEPOSIT,
    DEFAULT_NAV_DECREASE_TOLERANCE_BPS, DEFAULT_REDEEM_FEE_BPS, DEFAULT_REDEMPTION_DELAY,
    MAX_COLLATERAL_DECIMALS, PRECISION,
};
use ballast_protocol::crypto::{Keypair, PublicKey};
use ballast_protocol::{amount_serde, Address, Clock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// File name of the genesis document inside the data directory.
pub const GENESIS_FILE: &str = "genesis.json";

/// Directory under the data directory holding devnet account keys.
pub const KEYS_DIR: &str = "keys";

/// Keys for the devnet's owner, attestor and two demo holders.
#[derive(Debug)]
pub struct DevAccounts {
    pub owner: Keypair,
    pub auditor: Keypair,
    pub alice: Keypair,
    pub bob: Keypair,
}

impl DevAccounts {
    /// Fresh keys from the OS RNG.
    pub fn generate() -> Self {
        Self {
            owner: Keypair::generate(),
            auditor: Keypair::generate(),
            alice: Keypair::generate(),
            bob: Keypair::generate(),
        }
    }

    /// Fixed keys for tests.
    #[cfg(test)]
    pub fn deterministic() -> Self {
        Self {
            owner: Keypair::from_seed(&[1; 32]),
            auditor: Keypair::from_seed(&[2; 32]),
            alice: Keypair::from_seed(&[3; 32]),
            bob: Keypair::from_seed(&[4; 32]),
        }
    }
}

/// Writes `keypair`'s secret as hex to `<dir>/<name>.key`, readable by the
/// owner only on Unix.
pub fn write_key(dir: &Path, name: &str, keypair: &Keypair) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create key directory {}", dir.display()))?;
    let path = dir.join(format!("{name}.key"));
    std::fs::write(&path, format!("{}\n", keypair.secret_key_hex()))
        .with_context(|| format!("failed to write key to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Reads a key written by [`write_key`].
pub fn read_key(path: &Path) -> Result<Keypair> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    Keypair::from_hex(&raw).with_context(|| format!("{} does not hold a secret key", path.display()))
}

/// The genesis document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Genesis {
    /// Network label reported by `/status`.
    pub network: String,
    /// Administrator of the oracle and the vault.
    pub owner: Address,
    /// Custody and minting identity of the vault.
    pub vault_address: Address,
    /// Initial attestor set.
    pub attestors: Vec<Address>,
    /// Oracle tunables.
    #[serde(default)]
    pub oracle: OracleParams,
    /// Vault tunables.
    #[serde(default)]
    pub vault: VaultParams,
    /// Approved collateral, in payout-preference order.
    pub collateral: Vec<CollateralAsset>,
    /// Opening custody balances.
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,
}

/// Oracle section of the genesis file. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OracleParams {
    pub threshold: usize,
    pub max_change_bps: u32,
    pub max_decrease_bps: u32,
    pub max_staleness_secs: u64,
    pub attestation_expiry_secs: u64,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ATTESTATION_THRESHOLD,
            max_change_bps: DEFAULT_MAX_NAV_CHANGE_BPS,
            max_decrease_bps: DEFAULT_NAV_DECREASE_TOLERANCE_BPS,
            max_staleness_secs: DEFAULT_MAX_STALENESS.as_secs(),
            attestation_expiry_secs: DEFAULT_ATTESTATION_EXPIRY.as_secs(),
        }
    }
}

/// Vault section of the genesis file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultParams {
    pub mint_fee_bps: u32,
    pub redeem_fee_bps: u32,
    pub redemption_delay_secs: u64,
    /// 18-decimal minimum deposit.
    #[serde(with = "amount_serde")]
    pub min_deposit: u128,
    pub circuit_breaker_enabled: bool,
    pub circuit_breaker_threshold_bps: u32,
}

impl Default for VaultParams {
    fn default() -> Self {
        Self {
            mint_fee_bps: DEFAULT_MINT_FEE_BPS,
            redeem_fee_bps: DEFAULT_REDEEM_FEE_BPS,
            redemption_delay_secs: DEFAULT_REDEMPTION_DELAY.as_secs(),
            min_deposit: DEFAULT_MIN_DEPOSIT,
            circuit_breaker_enabled: true,
            circuit_breaker_threshold_bps: DEFAULT_CIRCUIT_BREAKER_THRESHOLD_BPS,
        }
    }
}

/// One approved collateral kind and its native precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollateralAsset {
    pub kind: CollateralKind,
    pub decimals: u8,
}

/// An opening custody balance, in the collateral's native precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisBalance {
    pub holder: Address,
    pub kind: CollateralKind,
    #[serde(with = "amount_serde")]
    pub amount: u128,
}

impl Genesis {
    /// A single-attestor development network with USDC (6 decimals) and
    /// DAI (18 decimals) approved and the two demo holders in `accounts`
    /// funded.
    pub fn devnet(accounts: &DevAccounts) -> Self {
        let usdc = CollateralKind::from("USDC");
        let dai = CollateralKind::from("DAI");
        let mut balances = Vec::new();
        for holder in [accounts.alice.address(), accounts.bob.address()] {
            balances.push(GenesisBalance {
                holder: holder.clone(),
                kind: usdc.clone(),
                amount: 1_000_000 * 1_000_000,
            });
            balances.push(GenesisBalance {
                holder,
                kind: dai.clone(),
                amount: 1_000_000 * PRECISION,
            });
        }
        Self {
            network: "devnet".to_string(),
            owner: accounts.owner.address(),
            vault_address: Address::from("vault"),
            attestors: vec![accounts.auditor.address()],
            oracle: OracleParams::default(),
            vault: VaultParams::default(),
            collateral: vec![
                CollateralAsset {
                    kind: usdc,
                    decimals: 6,
                },
                CollateralAsset {
                    kind: dai,
                    decimals: 18,
                },
            ],
            balances,
        }
    }

    /// Reads and validates a genesis file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read genesis file {}", path.display()))?;
        let genesis: Genesis = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse genesis file {}", path.display()))?;
        genesis
            .validate()
            .with_context(|| format!("invalid genesis file {}", path.display()))?;
        Ok(genesis)
    }

    /// Writes the document as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to encode genesis")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write genesis file {}", path.display()))
    }

    /// Structural checks the treasury constructor can't make on its own.
    /// Parameter ranges are left to the treasury.
    pub fn validate(&self) -> Result<()> {
        check_signing_address("owner", &self.owner)?;
        if self.vault_address.is_empty() {
            bail!("vault_address must not be empty");
        }
        for attestor in &self.attestors {
            check_signing_address("attestor", attestor)?;
        }
        if self.collateral.is_empty() {
            bail!("at least one collateral kind must be approved");
        }
        let mut kinds = BTreeSet::new();
        for asset in &self.collateral {
            if asset.kind.as_str().is_empty() {
                bail!("collateral kind must not be empty");
            }
            if asset.decimals > MAX_COLLATERAL_DECIMALS {
                bail!(
                    "collateral {} has {} decimals, more than the supported {}",
                    asset.kind,
                    asset.decimals,
                    MAX_COLLATERAL_DECIMALS
                );
            }
            if !kinds.insert(&asset.kind) {
                bail!("collateral {} is listed twice", asset.kind);
            }
        }
        for balance in &self.balances {
            if !kinds.contains(&balance.kind) {
                bail!(
                    "opening balance for {} uses undeclared collateral {}",
                    balance.holder,
                    balance.kind
                );
            }
        }
        Ok(())
    }

    /// The treasury configuration this genesis describes.
    pub fn treasury_config(&self) -> TreasuryConfig {
        TreasuryConfig {
            owner: self.owner.clone(),
            vault_address: self.vault_address.clone(),
            attestors: self.attestors.clone(),
            oracle: OracleConfig {
                threshold: self.oracle.threshold,
                max_change_bps: self.oracle.max_change_bps,
                max_decrease_bps: self.oracle.max_decrease_bps,
                max_staleness: Duration::from_secs(self.oracle.max_staleness_secs),
                attestation_expiry: Duration::from_secs(self.oracle.attestation_expiry_secs),
            },
            vault: VaultConfig {
                mint_fee_bps: self.vault.mint_fee_bps,
                redeem_fee_bps: self.vault.redeem_fee_bps,
                redemption_delay: Duration::from_secs(self.vault.redemption_delay_secs),
                min_deposit: self.vault.min_deposit,
                deposits_paused: false,
                redemptions_paused: false,
            },
            circuit_breaker_enabled: self.vault.circuit_breaker_enabled,
            circuit_breaker_threshold_bps: self.vault.circuit_breaker_threshold_bps,
        }
    }

    /// Builds the treasury plus the custody book backing it.
    pub fn build(&self, clock: Arc<dyn Clock>) -> Result<(Treasury, InMemoryCustody)> {
        self.validate()?;
        let custody = InMemoryCustody::new(self.vault_address.clone());
        for asset in &self.collateral {
            custody.register_asset(asset.kind.clone(), asset.decimals);
        }
        for balance in &self.balances {
            custody.credit(&balance.holder, &balance.kind, balance.amount);
        }
        let registry = StaticCollateralRegistry::new(self.collateral.iter().map(|a| a.kind.clone()));
        let treasury = Treasury::new(self.treasury_config(), registry, custody.clone(), clock)
            .context("genesis parameters rejected by the treasury")?;
        Ok((treasury, custody))
    }
}

/// `address` must be the canonical address of an Ed25519 key.
fn check_signing_address(role: &str, address: &Address) -> Result<()> {
    let key = PublicKey::from_address(address)
        .with_context(|| format!("{role} {address} is not a hex Ed25519 public key"))?;
    if key.address() != *address {
        bail!("{role} {address} must be written in lowercase hex");
    }
    Ok(())
}
