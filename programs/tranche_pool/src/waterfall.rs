// programs/tranche_pool/src/waterfall.rs
//
// Waterfall Distributor
// =====================
// Turns one credit event into new tranche and cover balances:
// - Profit: policy split, then covers take their share of the junior part
// - Loss: covers first, then junior, then senior
// - Recovery: senior, then junior, then covers in reverse priority
//
// Every entry point takes a `CreditCapability`, which can only be built by
// checking the caller against the pool's credit authority.

use anchor_lang::prelude::*;

use crate::errors::PoolError;
use crate::first_loss::FirstLossCoverStack;
use crate::policy::{SeniorYieldTracker, TranchesPolicy};
use crate::state::{PoolConfig, PoolState, TrancheAssets, TrancheLosses};

// =============================================================================
// CALLER CAPABILITY
// =============================================================================

/// Proof that the caller is the pool's credit authority
#[derive(Debug)]
pub struct CreditCapability {
    caller: Pubkey,
}

impl CreditCapability {
    pub fn authorize(caller: &Pubkey, config: &PoolConfig) -> Result<Self> {
        require_keys_eq!(*caller, config.credit_authority, PoolError::Unauthorized);
        Ok(Self { caller: *caller })
    }

    pub fn caller(&self) -> Pubkey {
        self.caller
    }
}

// =============================================================================
// DISTRIBUTION RESULTS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfitDistribution {
    pub senior: u64,
    pub junior: u64,
    pub per_cover: Vec<u64>,
    pub before: TrancheAssets,
    pub after: TrancheAssets,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LossDistribution {
    pub senior: u64,
    pub junior: u64,
    pub per_cover: Vec<u64>,
    /// Loss beyond every cover and tranche; floored, never recoverable
    pub uncovered: u64,
    pub before: TrancheAssets,
    pub after: TrancheAssets,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryDistribution {
    pub senior: u64,
    pub junior: u64,
    pub per_cover: Vec<u64>,
    /// Recovery beyond every recorded loss
    pub unapplied: u64,
    pub before: TrancheAssets,
    pub after: TrancheAssets,
}

// =============================================================================
// DISTRIBUTOR
// =============================================================================

pub struct WaterfallDistributor<'a> {
    policy: TranchesPolicy,
    assets: &'a mut TrancheAssets,
    losses: &'a mut TrancheLosses,
    covers: FirstLossCoverStack<'a>,
    tracker: &'a mut SeniorYieldTracker,
}

impl<'a> WaterfallDistributor<'a> {
    pub fn new(policy: TranchesPolicy, state: &'a mut PoolState) -> Self {
        Self {
            policy,
            assets: &mut state.tranche_assets,
            losses: &mut state.tranche_losses,
            covers: FirstLossCoverStack::new(&mut state.covers),
            tracker: &mut state.senior_yield_tracker,
        }
    }

    /// Tranche plus cover assets
    pub fn total_value(&self) -> u64 {
        self.assets.total().saturating_add(self.covers.total_assets())
    }

    pub fn distribute_profit(
        &mut self,
        _capability: &CreditCapability,
        profit: u64,
        now: i64,
    ) -> ProfitDistribution {
        let before = *self.assets;

        let split = self
            .policy
            .distribute_profit(profit, self.assets, self.tracker, now);
        let cover = self
            .covers
            .absorb_profit(split.junior, self.assets.junior_total_assets);

        self.assets.senior_total_assets = self.assets.senior_total_assets.saturating_add(split.senior);
        self.assets.junior_total_assets = self.assets.junior_total_assets.saturating_add(cover.remainder);
        self.tracker
            .refresh(&self.policy, self.assets.senior_total_assets, now);

        ProfitDistribution {
            senior: split.senior,
            junior: cover.remainder,
            per_cover: cover.per_cover,
            before,
            after: *self.assets,
        }
    }

    pub fn distribute_loss(
        &mut self,
        _capability: &CreditCapability,
        loss: u64,
        now: i64,
    ) -> LossDistribution {
        let before = *self.assets;

        let cover = self.covers.absorb_loss(loss);
        let split = self
            .policy
            .distribute_loss(cover.remainder, self.assets, self.losses);
        self.tracker
            .refresh(&self.policy, self.assets.senior_total_assets, now);

        LossDistribution {
            senior: split.senior,
            junior: split.junior,
            per_cover: cover.per_cover,
            uncovered: split.remainder,
            before,
            after: *self.assets,
        }
    }

    pub fn distribute_loss_recovery(
        &mut self,
        _capability: &CreditCapability,
        recovery: u64,
        now: i64,
    ) -> RecoveryDistribution {
        let before = *self.assets;

        let split = self
            .policy
            .distribute_recovery(recovery, self.assets, self.losses);
        let cover = self.covers.absorb_recovery(split.remainder);
        self.tracker
            .refresh(&self.policy, self.assets.senior_total_assets, now);

        RecoveryDistribution {
            senior: split.senior,
            junior: split.junior,
            per_cover: cover.per_cover,
            unapplied: cover.remainder,
            before,
            after: *self.assets,
        }
    }
}
