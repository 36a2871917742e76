// programs/tranche_pool/src/policy.rs
//
// Tranches Policy
// ===============
// Splits profit between senior and junior, and orders loss and recovery:
// - RiskAdjusted: pro-rata by assets, senior share reduced by an adjustment
// - FixedSeniorYield: senior earns simple interest on its principal base,
//   with any shortfall carried as unpaid yield
// Loss always hits junior first; recovery always restores senior first.

use anchor_lang::prelude::*;
use credit_core::calendar::days_diff;
use credit_core::constants::{BPS_DENOMINATOR, DAYS_IN_A_YEAR};
use credit_core::math::{apply_bps, mul_div};

use crate::state::{TrancheAssets, TrancheLosses};

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, InitSpace)]
pub enum TranchesPolicy {
    RiskAdjusted { risk_adjustment_bps: u16 },
    FixedSeniorYield { yield_bps: u16 },
}

impl TranchesPolicy {
    pub fn is_valid(&self) -> bool {
        match self {
            TranchesPolicy::RiskAdjusted {
                risk_adjustment_bps,
            } => (*risk_adjustment_bps as u64) <= BPS_DENOMINATOR,
            TranchesPolicy::FixedSeniorYield { yield_bps } => {
                (*yield_bps as u64) <= BPS_DENOMINATOR
            }
        }
    }

    /// Senior and junior-candidate profit for one event. The junior
    /// candidate still has to pass through the first-loss covers.
    pub fn distribute_profit(
        &self,
        profit: u64,
        assets: &TrancheAssets,
        tracker: &mut SeniorYieldTracker,
        now: i64,
    ) -> ProfitSplit {
        let senior = match *self {
            TranchesPolicy::RiskAdjusted {
                risk_adjustment_bps,
            } => {
                let pro_rata = mul_div(profit, assets.senior_total_assets, assets.total());
                pro_rata - apply_bps(pro_rata, risk_adjustment_bps)
            }
            TranchesPolicy::FixedSeniorYield { yield_bps } => {
                tracker.accrue(yield_bps, now);
                let paid = profit.min(tracker.unpaid_yield);
                tracker.unpaid_yield -= paid;
                paid
            }
        };

        ProfitSplit {
            senior,
            junior: profit - senior,
        }
    }

    /// Junior absorbs first, then senior. Loss beyond both is returned.
    pub fn distribute_loss(
        &self,
        loss: u64,
        assets: &mut TrancheAssets,
        losses: &mut TrancheLosses,
    ) -> TrancheSplit {
        let junior = loss.min(assets.junior_total_assets);
        let senior = (loss - junior).min(assets.senior_total_assets);

        assets.junior_total_assets -= junior;
        assets.senior_total_assets -= senior;
        losses.junior_loss = losses.junior_loss.saturating_add(junior);
        losses.senior_loss = losses.senior_loss.saturating_add(senior);

        TrancheSplit {
            senior,
            junior,
            remainder: loss - junior - senior,
        }
    }

    /// Senior recovers first, then junior, each up to its recorded loss.
    /// Recovery beyond both is returned for the covers.
    pub fn distribute_recovery(
        &self,
        recovery: u64,
        assets: &mut TrancheAssets,
        losses: &mut TrancheLosses,
    ) -> TrancheSplit {
        let senior = recovery.min(losses.senior_loss);
        let junior = (recovery - senior).min(losses.junior_loss);

        assets.senior_total_assets = assets.senior_total_assets.saturating_add(senior);
        assets.junior_total_assets = assets.junior_total_assets.saturating_add(junior);
        losses.senior_loss -= senior;
        losses.junior_loss -= junior;

        TrancheSplit {
            senior,
            junior,
            remainder: recovery - senior - junior,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProfitSplit {
    pub senior: u64,
    /// Junior candidate before first-loss covers take their share
    pub junior: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrancheSplit {
    pub senior: u64,
    pub junior: u64,
    pub remainder: u64,
}

// =============================================================================
// SENIOR YIELD TRACKER
// =============================================================================

/// Fixed-yield accrual on the senior principal base
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Default, PartialEq, Eq, Debug, InitSpace)]
pub struct SeniorYieldTracker {
    /// Senior assets the yield accrues on
    pub total_assets: u64,

    /// Never moves backwards
    pub last_updated_date: i64,

    /// Accrued yield not yet paid out of profit
    pub unpaid_yield: u64,
}

impl SeniorYieldTracker {
    /// Simple interest on `total_assets` from the last update to `now`,
    /// counted in 30/360 days
    pub fn accrued_since_update(&self, yield_bps: u16, now: i64) -> u64 {
        let days = days_diff(self.last_updated_date, now);
        let numerator = (self.total_assets as u128) * (yield_bps as u128) * (days as u128);
        let denominator = (DAYS_IN_A_YEAR as u128) * (BPS_DENOMINATOR as u128);
        u64::try_from(numerator / denominator).unwrap_or(u64::MAX)
    }

    pub fn accrue(&mut self, yield_bps: u16, now: i64) {
        if now <= self.last_updated_date {
            return;
        }
        let accrued = self.accrued_since_update(yield_bps, now);
        self.unpaid_yield = self.unpaid_yield.saturating_add(accrued);
        self.last_updated_date = now;
    }

    /// Accrue on the old base up to `now`, then switch to the new senior
    /// balance. A no-op for the risk-adjusted policy.
    pub fn refresh(&mut self, policy: &TranchesPolicy, senior_assets: u64, now: i64) {
        if let TranchesPolicy::FixedSeniorYield { yield_bps } = *policy {
            self.accrue(yield_bps, now);
            self.total_assets = senior_assets;
        }
    }
}
