// programs/tranche_pool/src/state.rs

use anchor_lang::prelude::*;
use credit_core::constants::MAX_COVERS;
use credit_core::math::mul_div;
pub use credit_core::PayPeriodDuration;

use crate::epoch::{CurrentEpoch, TrancheDemand};
use crate::first_loss::FirstLossCover;
use crate::policy::{SeniorYieldTracker, TranchesPolicy};
use crate::redemption::{LenderRedemptionRecord, RedemptionSummary};

// =============================================================================
// TRANCHES
// =============================================================================

/// Seniority rank of a slice of lender capital
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, InitSpace)]
#[repr(u8)]
pub enum Tranche {
    Junior = 0,
    Senior = 1,
}

impl Tranche {
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tranche::Junior => "Junior",
            Tranche::Senior => "Senior",
        }
    }
}

/// Lender-attributable assets per tranche
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Default, PartialEq, Eq, Debug, InitSpace)]
pub struct TrancheAssets {
    pub senior_total_assets: u64,
    pub junior_total_assets: u64,
}

impl TrancheAssets {
    pub fn new(senior_total_assets: u64, junior_total_assets: u64) -> Self {
        Self {
            senior_total_assets,
            junior_total_assets,
        }
    }

    pub fn get(&self, tranche: Tranche) -> u64 {
        match tranche {
            Tranche::Senior => self.senior_total_assets,
            Tranche::Junior => self.junior_total_assets,
        }
    }

    pub fn get_mut(&mut self, tranche: Tranche) -> &mut u64 {
        match tranche {
            Tranche::Senior => &mut self.senior_total_assets,
            Tranche::Junior => &mut self.junior_total_assets,
        }
    }

    pub fn total(&self) -> u64 {
        self.senior_total_assets
            .saturating_add(self.junior_total_assets)
    }
}

/// Losses absorbed by each tranche and not yet recovered
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Default, PartialEq, Eq, Debug, InitSpace)]
pub struct TrancheLosses {
    pub senior_loss: u64,
    pub junior_loss: u64,
}

impl TrancheLosses {
    pub fn total(&self) -> u64 {
        self.senior_loss.saturating_add(self.junior_loss)
    }
}

/// Per-tranche share and redemption bookkeeping
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Default, PartialEq, Eq, Debug, InitSpace)]
pub struct TrancheLedger {
    /// Shares outstanding, including shares parked in redemption requests
    pub total_supply: u64,

    /// Latest epoch redemption summary; rolled forward lazily
    pub redemption: RedemptionSummary,

    /// Processed redemptions not yet disbursed to lenders
    pub unwithdrawn_amount: u64,

    /// Lenders holding shares who take profit as cash instead of reinvesting
    pub non_reinvesting_lenders: u32,

    /// Non-reinvesting lenders already paid for the current profit round
    pub yield_lenders_processed: u32,

    /// Time of the latest yield processing batch
    pub yield_processed_at: i64,
}

impl TrancheLedger {
    /// The open epoch's summary, carrying forward unfulfilled shares from a
    /// closed epoch the first time the new epoch is touched
    pub fn current_redemption(&mut self, epoch_id: u64) -> &mut RedemptionSummary {
        self.redemption.roll_to(epoch_id);
        &mut self.redemption
    }

    pub fn demand(&self, epoch_id: u64) -> TrancheDemand {
        let mut summary = self.redemption;
        summary.roll_to(epoch_id);
        TrancheDemand {
            shares_requested: summary.shares_requested,
            total_supply: self.total_supply,
        }
    }
}

// =============================================================================
// SHARE CONVERSION
// =============================================================================

/// Value of `shares` at the tranche's current price. An empty tranche
/// prices shares 1:1.
pub fn shares_to_assets(shares: u64, tranche_assets: u64, total_supply: u64) -> u64 {
    if total_supply == 0 {
        return shares;
    }
    mul_div(shares, tranche_assets, total_supply)
}

/// Shares worth `amount` at the tranche's current price. Returns `None` when
/// shares exist but carry no value, since no price can be derived.
pub fn assets_to_shares(amount: u64, tranche_assets: u64, total_supply: u64) -> Option<u64> {
    if total_supply == 0 {
        return Some(amount);
    }
    if tranche_assets == 0 {
        return None;
    }
    Some(mul_div(amount, total_supply, tranche_assets))
}

// =============================================================================
// POOL CONFIGURATION
// =============================================================================

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, InitSpace)]
#[repr(u8)]
pub enum PoolStatus {
    /// Created, waiting for covers and junior capital
    Off = 0,
    On = 1,
    /// Permanently closed; only withdrawals remain
    Closed = 2,
}

impl Default for PoolStatus {
    fn default() -> Self {
        PoolStatus::Off
    }
}

/// Pool configuration - read-only to the waterfall and settlement engines
/// PDA seeds: ["pool_config", pool_id]
#[account]
#[derive(InitSpace)]
pub struct PoolConfig {
    pub pool_id: u64,

    /// Pool owner; enables and closes the pool
    pub authority: Pubkey,

    /// The only signer allowed to report profit, loss and recovery
    pub credit_authority: Pubkey,

    pub underlying_mint: Pubkey,

    /// Token account holding lender, cover and redemption funds
    pub pool_vault: Pubkey,

    pub tranches_policy: TranchesPolicy,

    /// Maximum senior assets as a multiple of junior assets (0 disables)
    pub max_senior_junior_ratio: u8,

    /// Length of each redemption epoch
    pub pay_period_duration: PayPeriodDuration,

    /// Maximum total lender assets
    pub liquidity_cap: u64,

    pub min_deposit_amount: u64,

    /// Seconds after a deposit before the lender may request redemption
    pub withdrawal_lockout_secs: i64,

    /// Junior assets required before the pool can be enabled
    pub min_junior_liquidity: u64,

    pub created_at: i64,

    pub bump: u8,
}

impl PoolConfig {
    pub const SEED_PREFIX: &'static [u8] = b"pool_config";

    pub const DEFAULT_MAX_SENIOR_JUNIOR_RATIO: u8 = 4;
    pub const DEFAULT_LIQUIDITY_CAP: u64 = u64::MAX;
    pub const DEFAULT_MIN_DEPOSIT_AMOUNT: u64 = 1_000_000; // 1 token at 6 decimals
    pub const DEFAULT_WITHDRAWAL_LOCKOUT_SECS: i64 = 30 * 24 * 60 * 60; // 30 days
    pub const DEFAULT_MIN_JUNIOR_LIQUIDITY: u64 = 0;

    pub fn ratio_enabled(&self) -> bool {
        self.max_senior_junior_ratio > 0
    }

    /// Largest senior balance the junior tranche can support
    pub fn max_senior_assets(&self, junior_total_assets: u64) -> u64 {
        if !self.ratio_enabled() {
            return u64::MAX;
        }
        junior_total_assets.saturating_mul(self.max_senior_junior_ratio as u64)
    }
}

// =============================================================================
// POOL STATE
// =============================================================================

/// Pool state - tranche balances, covers, ledgers and the open epoch
/// PDA seeds: ["pool_state", pool_config]
#[account]
#[derive(InitSpace)]
pub struct PoolState {
    pub pool_config: Pubkey,

    pub status: PoolStatus,

    pub tranche_assets: TrancheAssets,

    pub tranche_losses: TrancheLosses,

    /// First-loss covers in priority order (borrower first)
    #[max_len(MAX_COVERS)]
    pub covers: Vec<FirstLossCover>,

    /// Accrual state for the fixed senior yield policy
    pub senior_yield_tracker: SeniorYieldTracker,

    /// Indexed by `Tranche::index()`
    pub tranches: [TrancheLedger; 2],

    pub current_epoch: CurrentEpoch,

    /// Last time a non-zero profit was distributed
    pub last_profit_at: i64,

    /// Number of non-zero profit distributions so far
    pub profit_round: u64,

    /// Cumulative loss beyond every cover and tranche
    pub uncovered_loss: u64,

    pub total_profit_distributed: u64,
    pub total_loss_distributed: u64,
    pub total_loss_recovered: u64,

    pub bump: u8,
}

impl PoolState {
    pub const SEED_PREFIX: &'static [u8] = b"pool_state";
    pub const VAULT_SEED_PREFIX: &'static [u8] = b"pool_vault";

    pub fn is_on(&self) -> bool {
        self.status == PoolStatus::On
    }

    pub fn ledger(&self, tranche: Tranche) -> &TrancheLedger {
        &self.tranches[tranche.index()]
    }

    pub fn ledger_mut(&mut self, tranche: Tranche) -> &mut TrancheLedger {
        &mut self.tranches[tranche.index()]
    }

    pub fn tranche_total_assets(&self, tranche: Tranche) -> u64 {
        self.tranche_assets.get(tranche)
    }

    /// Lender-attributable assets across both tranches
    pub fn total_assets(&self) -> u64 {
        self.tranche_assets.total()
    }

    pub fn current_epoch_id(&self) -> u64 {
        self.current_epoch.id
    }

    pub fn cover_total_assets(&self) -> u64 {
        self.covers
            .iter()
            .fold(0u64, |acc, cover| acc.saturating_add(cover.total_assets))
    }

    pub fn unwithdrawn_total(&self) -> u64 {
        self.tranches
            .iter()
            .fold(0u64, |acc, ledger| acc.saturating_add(ledger.unwithdrawn_amount))
    }

    /// Vault balance free for redemptions: excludes processed-but-undisbursed
    /// redemptions and cover capital
    pub fn available_liquidity(&self, vault_balance: u64) -> u64 {
        vault_balance
            .saturating_sub(self.unwithdrawn_total())
            .saturating_sub(self.cover_total_assets())
    }

    pub fn convert_to_assets(&self, tranche: Tranche, shares: u64) -> u64 {
        shares_to_assets(
            shares,
            self.tranche_total_assets(tranche),
            self.ledger(tranche).total_supply,
        )
    }

    pub fn convert_to_shares(&self, tranche: Tranche, amount: u64) -> Option<u64> {
        assets_to_shares(
            amount,
            self.tranche_total_assets(tranche),
            self.ledger(tranche).total_supply,
        )
    }

    /// Mint shares for `amount` at the current price and grow the tranche.
    /// Returns `None` when the tranche's shares carry no value.
    pub fn record_deposit(&mut self, tranche: Tranche, amount: u64) -> Option<u64> {
        let shares = self.convert_to_shares(tranche, amount)?;
        let assets = self.tranche_assets.get_mut(tranche);
        *assets = assets.saturating_add(amount);
        let ledger = self.ledger_mut(tranche);
        ledger.total_supply = ledger.total_supply.saturating_add(shares);
        Some(shares)
    }

    /// True while some non-reinvesting lender has not been paid its share of
    /// the latest profit
    pub fn has_unprocessed_profit(&self) -> bool {
        self.tranches
            .iter()
            .any(|ledger| ledger.yield_lenders_processed < ledger.non_reinvesting_lenders)
    }

    /// Open a new profit round; every cash-yield lender is owed processing again
    pub fn start_profit_round(&mut self, now: i64) {
        self.last_profit_at = now;
        self.profit_round = self.profit_round.saturating_add(1);
        for ledger in self.tranches.iter_mut() {
            ledger.yield_lenders_processed = 0;
        }
    }

    /// A counted lender not yet processed for the current profit round
    pub fn owes_yield(&self, lender: &LenderState) -> bool {
        !lender.reinvest_yield && lender.shares > 0 && lender.yield_round != self.profit_round
    }

    /// Count `lender` as processed for the current round. Returns false for
    /// lenders outside the count or already processed this round.
    pub fn mark_yield_processed(&mut self, lender: &mut LenderState, now: i64) -> bool {
        if !self.owes_yield(lender) {
            return false;
        }
        lender.yield_round = self.profit_round;
        lender.yield_processed_at = now;
        let ledger = self.ledger_mut(lender.tranche);
        ledger.yield_lenders_processed = ledger.yield_lenders_processed.saturating_add(1);
        true
    }

    /// Keep the non-reinvesting count in step with a lender's share balance
    /// moving from `shares_before` to `lender.shares`. A lender is counted
    /// only while it holds shares.
    pub fn sync_yield_lender(&mut self, lender: &mut LenderState, shares_before: u64) {
        if lender.reinvest_yield {
            return;
        }
        let round = self.profit_round;
        let ledger = self.ledger_mut(lender.tranche);
        match (shares_before == 0, lender.shares == 0) {
            (true, false) => {
                // Nothing is owed from profit distributed before joining
                lender.yield_round = round;
                ledger.non_reinvesting_lenders = ledger.non_reinvesting_lenders.saturating_add(1);
                ledger.yield_lenders_processed = ledger.yield_lenders_processed.saturating_add(1);
            }
            (false, true) => {
                ledger.non_reinvesting_lenders = ledger.non_reinvesting_lenders.saturating_sub(1);
                if lender.yield_round == round {
                    ledger.yield_lenders_processed =
                        ledger.yield_lenders_processed.saturating_sub(1);
                }
            }
            _ => {}
        }
    }
}

// =============================================================================
// LENDERS
// =============================================================================

/// Lender position in one tranche
/// PDA seeds: ["lender", pool_config, tranche, lender]
#[account]
#[derive(InitSpace)]
pub struct LenderState {
    pub pool_config: Pubkey,

    pub lender: Pubkey,

    pub tranche: Tranche,

    /// Spendable share balance (excludes shares parked in requests)
    pub shares: u64,

    /// Principal backing the spendable shares
    pub principal: u64,

    /// When false, profit above principal is paid out in cash
    pub reinvest_yield: bool,

    pub last_deposit_at: i64,

    /// Last time yield was paid to this lender
    pub yield_processed_at: i64,

    /// Profit round this lender was last settled for
    pub yield_round: u64,

    pub redemption: LenderRedemptionRecord,

    pub created_at: i64,

    pub bump: u8,
}

impl LenderState {
    pub const SEED_PREFIX: &'static [u8] = b"lender";

    pub fn withdrawable_assets(&self) -> u64 {
        self.redemption.withdrawable_assets()
    }

    pub fn can_request_redemption(&self, lockout_secs: i64, now: i64) -> bool {
        now >= self.last_deposit_at.saturating_add(lockout_secs)
    }

    /// Principal attributable to `shares` of the spendable balance
    pub fn principal_for(&self, shares: u64) -> u64 {
        if shares >= self.shares {
            return self.principal;
        }
        mul_div(self.principal, shares, self.shares)
    }
}

/// Immutable record of one tranche's redemption processing for a closed epoch
/// PDA seeds: ["redemption_summary", pool_config, tranche, epoch_id]
#[account]
#[derive(InitSpace)]
pub struct EpochRedemptionSummary {
    pub pool_config: Pubkey,

    pub tranche: Tranche,

    pub summary: RedemptionSummary,

    pub closed_at: i64,
}

impl EpochRedemptionSummary {
    pub const SEED_PREFIX: &'static [u8] = b"redemption_summary";
}
