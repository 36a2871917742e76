// programs/tranche_pool/src/first_loss.rs
//
// First-Loss Cover Stack
// ======================
// Ordered reserves that sit beneath the junior tranche:
// - Profit: each cover earns a share of the junior candidate, weighted by
//   its risk yield multiplier and capped at its asset ceiling
// - Loss: covers absorb in priority order before any tranche
// - Recovery: covers are repaid in reverse priority order, after tranches

use anchor_lang::prelude::*;
use credit_core::math::{apply_bps, mul_div};

/// Who funds a cover. Declaration order is the default priority order.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, InitSpace)]
#[repr(u8)]
pub enum CoverKind {
    Borrower = 0,
    Admin = 1,
    Affiliate = 2,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, InitSpace)]
pub struct FirstLossCover {
    pub kind: CoverKind,

    /// Only this key may deposit into the cover
    pub provider: Pubkey,

    pub total_assets: u64,

    /// Ceiling on a single loss, and on the cover's assets when earning profit
    pub cover_cap_per_loss: u64,

    /// Share of the cover's assets exposed to a single loss (bps)
    pub cover_rate_per_loss_bps: u16,

    /// Profit weight relative to junior capital (bps, 10000 = 1x)
    pub risk_yield_multiplier_bps: u16,

    /// Loss absorbed and not yet recovered
    pub covered_loss: u64,

    /// Assets required before the pool can be enabled
    pub min_liquidity: u64,
}

impl FirstLossCover {
    pub fn earns_profit(&self) -> bool {
        self.risk_yield_multiplier_bps > 0
    }

    /// Assets weighted by the risk yield multiplier
    pub fn weighted_assets(&self) -> u64 {
        apply_bps(self.total_assets, self.risk_yield_multiplier_bps)
    }

    /// Profit the cover can still take before reaching its ceiling
    pub fn profit_headroom(&self) -> u64 {
        self.cover_cap_per_loss.saturating_sub(self.total_assets)
    }

    /// Largest single loss the cover absorbs
    pub fn loss_capacity(&self) -> u64 {
        self.total_assets
            .min(apply_bps(self.total_assets, self.cover_rate_per_loss_bps))
            .min(self.cover_cap_per_loss)
    }

    pub fn meets_min_liquidity(&self) -> bool {
        self.total_assets >= self.min_liquidity
    }
}

/// Result of pushing an amount through the stack
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoverDistribution {
    /// Amount the stack did not take
    pub remainder: u64,
    /// Amount taken by each cover, in stack order
    pub per_cover: Vec<u64>,
}

impl CoverDistribution {
    fn untouched(amount: u64, cover_count: usize) -> Self {
        Self {
            remainder: amount,
            per_cover: vec![0; cover_count],
        }
    }

    pub fn total(&self) -> u64 {
        self.per_cover
            .iter()
            .fold(0u64, |acc, amount| acc.saturating_add(*amount))
    }
}

/// Mutable view over a pool's covers in priority order
pub struct FirstLossCoverStack<'a> {
    covers: &'a mut [FirstLossCover],
}

impl<'a> FirstLossCoverStack<'a> {
    pub fn new(covers: &'a mut [FirstLossCover]) -> Self {
        Self { covers }
    }

    pub fn total_assets(&self) -> u64 {
        self.covers
            .iter()
            .fold(0u64, |acc, cover| acc.saturating_add(cover.total_assets))
    }

    /// Split the junior profit candidate between covers and junior capital.
    /// Each cover's share is weighted against `junior_assets`; anything a
    /// cover cannot hold carries to the next cover and finally to junior.
    pub fn absorb_profit(&mut self, candidate: u64, junior_assets: u64) -> CoverDistribution {
        let mut result = CoverDistribution::untouched(candidate, self.covers.len());
        if candidate == 0 {
            return result;
        }

        let weights: Vec<u64> = self
            .covers
            .iter()
            .map(|cover| if cover.earns_profit() { cover.weighted_assets() } else { 0 })
            .collect();
        let total_weight = weights
            .iter()
            .fold(junior_assets, |acc, weight| acc.saturating_add(*weight));
        if total_weight == 0 {
            return result;
        }

        let mut carry = 0u64;
        let mut distributed = 0u64;
        for (i, cover) in self.covers.iter_mut().enumerate() {
            if !cover.earns_profit() {
                continue;
            }
            let share = mul_div(candidate, weights[i], total_weight).saturating_add(carry);
            let taken = share.min(cover.profit_headroom());
            carry = share - taken;

            cover.total_assets = cover.total_assets.saturating_add(taken);
            result.per_cover[i] = taken;
            distributed = distributed.saturating_add(taken);
        }

        result.remainder = candidate.saturating_sub(distributed);
        result
    }

    /// Absorb loss in priority order; the remainder flows to the tranches
    pub fn absorb_loss(&mut self, loss: u64) -> CoverDistribution {
        let mut result = CoverDistribution::untouched(loss, self.covers.len());

        for (i, cover) in self.covers.iter_mut().enumerate() {
            if result.remainder == 0 {
                break;
            }
            let taken = result.remainder.min(cover.loss_capacity());
            cover.total_assets -= taken;
            cover.covered_loss = cover.covered_loss.saturating_add(taken);
            result.per_cover[i] = taken;
            result.remainder -= taken;
        }

        result
    }

    /// Repay covers in reverse priority order, each up to its recorded loss
    pub fn absorb_recovery(&mut self, recovery: u64) -> CoverDistribution {
        let mut result = CoverDistribution::untouched(recovery, self.covers.len());

        for (i, cover) in self.covers.iter_mut().enumerate().rev() {
            if result.remainder == 0 {
                break;
            }
            let taken = result.remainder.min(cover.covered_loss);
            cover.total_assets = cover.total_assets.saturating_add(taken);
            cover.covered_loss -= taken;
            result.per_cover[i] = taken;
            result.remainder -= taken;
        }

        result
    }
}
