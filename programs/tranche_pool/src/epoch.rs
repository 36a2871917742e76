// programs/tranche_pool/src/epoch.rs
//
// Epoch Settlement
// ================
// An epoch is Open until its end time passes. Closing it computes how much
// redemption demand each tranche can be paid:
// 1. Senior first, limited by available liquidity
// 2. Junior next, limited by what is left and by the senior:junior ratio
// Unfulfilled shares stay requested and roll into the next epoch.

use anchor_lang::prelude::*;
use credit_core::calendar::start_of_next_period;
use credit_core::math::div_ceil;
use credit_core::PayPeriodDuration;

use crate::errors::PoolError;
use crate::state::{assets_to_shares, shares_to_assets, TrancheAssets};

// =============================================================================
// EPOCH STATE MACHINE
// =============================================================================

/// The open epoch
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Default, PartialEq, Eq, Debug, InitSpace)]
pub struct CurrentEpoch {
    pub id: u64,
    pub end_time: i64,
}

impl CurrentEpoch {
    pub fn is_complete(&self, now: i64) -> bool {
        now >= self.end_time
    }

    /// Move to Closing. Fails while the epoch is still running.
    pub fn begin_close(&self, now: i64) -> Result<ClosingEpoch> {
        require!(self.is_complete(now), PoolError::EpochNotComplete);
        Ok(ClosingEpoch {
            id: self.id,
            closed_at: now,
        })
    }

    /// Move to Closing regardless of the end time; used when the pool shuts
    pub fn force_close(&self, now: i64) -> ClosingEpoch {
        ClosingEpoch {
            id: self.id,
            closed_at: now,
        }
    }
}

/// An epoch that is being settled. Only `CurrentEpoch::begin_close` and
/// `CurrentEpoch::force_close` produce one.
#[derive(Debug, PartialEq, Eq)]
pub struct ClosingEpoch {
    id: u64,
    closed_at: i64,
}

impl ClosingEpoch {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn closed_at(&self) -> i64 {
        self.closed_at
    }

    /// Open the next epoch, ending at the next period boundary
    pub fn finish(self, duration: PayPeriodDuration) -> CurrentEpoch {
        CurrentEpoch {
            id: self.id + 1,
            end_time: start_of_next_period(duration, self.closed_at),
        }
    }

    /// Open the terminal epoch of a closed pool. It never ends, so lenders
    /// can only replay up to the epoch closed here.
    pub fn finish_final(self) -> CurrentEpoch {
        CurrentEpoch {
            id: self.id + 1,
            end_time: i64::MAX,
        }
    }
}

// =============================================================================
// SETTLEMENT MATH
// =============================================================================

/// A tranche's outstanding demand at close
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrancheDemand {
    pub shares_requested: u64,
    pub total_supply: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrancheFulfillment {
    pub shares_requested: u64,
    pub shares_processed: u64,
    pub amount_processed: u64,
}

impl TrancheFulfillment {
    pub fn has_demand(&self) -> bool {
        self.shares_requested > 0
    }

    pub fn shares_unfulfilled(&self) -> u64 {
        self.shares_requested - self.shares_processed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettlementRequest {
    pub assets: TrancheAssets,
    pub available_liquidity: u64,
    pub senior: TrancheDemand,
    pub junior: TrancheDemand,
    /// 0 leaves junior redemptions unconstrained
    pub max_senior_junior_ratio: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub senior: TrancheFulfillment,
    pub junior: TrancheFulfillment,
    pub assets_after: TrancheAssets,
    pub liquidity_remaining: u64,
}

impl SettlementOutcome {
    pub fn is_empty(&self) -> bool {
        !self.senior.has_demand() && !self.junior.has_demand()
    }
}

/// Junior assets that may leave without breaking the ratio. Keeps at least
/// `ceil(senior / ratio)` in junior so the ratio holds exactly.
pub fn junior_redeemable_under_ratio(assets: &TrancheAssets, max_senior_junior_ratio: u8) -> u64 {
    if max_senior_junior_ratio == 0 {
        return u64::MAX;
    }
    let min_junior = div_ceil(assets.senior_total_assets, max_senior_junior_ratio as u64);
    assets.junior_total_assets.saturating_sub(min_junior)
}

// Serve as much of one tranche's demand as `limit` allows. A partial fill
// redeems whole shares only and pays exactly what those shares are worth.
fn fulfill(demand: TrancheDemand, tranche_assets: u64, limit: u64) -> TrancheFulfillment {
    if demand.shares_requested == 0 {
        return TrancheFulfillment::default();
    }

    let amount_requested = shares_to_assets(demand.shares_requested, tranche_assets, demand.total_supply);
    if amount_requested <= limit {
        return TrancheFulfillment {
            shares_requested: demand.shares_requested,
            shares_processed: demand.shares_requested,
            amount_processed: amount_requested,
        };
    }

    let shares_processed = assets_to_shares(limit, tranche_assets, demand.total_supply)
        .unwrap_or(0)
        .min(demand.shares_requested);
    TrancheFulfillment {
        shares_requested: demand.shares_requested,
        shares_processed,
        amount_processed: shares_to_assets(shares_processed, tranche_assets, demand.total_supply),
    }
}

/// Fixed-order settlement: senior against liquidity, then junior against
/// the remaining liquidity and the ratio computed on post-senior assets
pub fn settle_redemptions(request: &SettlementRequest) -> SettlementOutcome {
    let mut assets = request.assets;
    let mut available = request.available_liquidity;

    let senior = fulfill(request.senior, assets.senior_total_assets, available);
    available -= senior.amount_processed;
    assets.senior_total_assets -= senior.amount_processed;

    let junior_limit = available.min(junior_redeemable_under_ratio(
        &assets,
        request.max_senior_junior_ratio,
    ));
    let junior = fulfill(request.junior, assets.junior_total_assets, junior_limit);
    available -= junior.amount_processed;
    assets.junior_total_assets -= junior.amount_processed;

    SettlementOutcome {
        senior,
        junior,
        assets_after: assets,
        liquidity_remaining: available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credit_core::CalendarDate;

    fn ts(year: i64, month: u32, day: u32) -> i64 {
        CalendarDate { year, month, day }.to_timestamp()
    }

    fn create_test_request(senior_shares: u64, junior_shares: u64, liquidity: u64) -> SettlementRequest {
        SettlementRequest {
            assets: TrancheAssets::new(4_000_000, 2_000_000),
            available_liquidity: liquidity,
            senior: TrancheDemand {
                shares_requested: senior_shares,
                total_supply: 4_000_000,
            },
            junior: TrancheDemand {
                shares_requested: junior_shares,
                total_supply: 1_000_000,
            },
            max_senior_junior_ratio: 4,
        }
    }

    // ==================== STATE MACHINE ====================

    #[test]
    fn test_epoch_cannot_close_early() {
        let epoch = CurrentEpoch {
            id: 7,
            end_time: ts(2024, 6, 1),
        };
        assert!(epoch.begin_close(ts(2024, 5, 31)).is_err());

        let closing = epoch.begin_close(ts(2024, 6, 1) + 60).unwrap();
        assert_eq!(closing.id(), 7);

        let next = closing.finish(PayPeriodDuration::Monthly);
        assert_eq!(next.id, 8);
        assert_eq!(next.end_time, ts(2024, 7, 1));
    }

    #[test]
    fn test_late_close_skips_to_next_boundary() {
        let epoch = CurrentEpoch {
            id: 2,
            end_time: ts(2024, 2, 1),
        };
        let next = epoch
            .begin_close(ts(2024, 4, 15))
            .unwrap()
            .finish(PayPeriodDuration::Quarterly);
        assert_eq!(next, CurrentEpoch { id: 3, end_time: ts(2024, 7, 1) });
    }

    #[test]
    fn test_force_close_ignores_end_time() {
        let epoch = CurrentEpoch {
            id: 4,
            end_time: i64::MAX,
        };
        let closing = epoch.force_close(10);
        assert_eq!(closing.id(), 4);
        assert_eq!(closing.closed_at(), 10);

        let terminal = closing.finish_final();
        assert_eq!(terminal.id, 5);
        assert!(!terminal.is_complete(i64::MAX - 1));
    }

    // ==================== SETTLEMENT ====================

    #[test]
    fn test_empty_epoch_is_noop() {
        let request = create_test_request(0, 0, 1_000_000);
        let outcome = settle_redemptions(&request);

        assert!(outcome.is_empty());
        assert_eq!(outcome.assets_after, request.assets);
        assert_eq!(outcome.liquidity_remaining, 1_000_000);
    }

    #[test]
    fn test_full_fulfillment_when_liquid() {
        let outcome = settle_redemptions(&create_test_request(400_000, 100_000, 5_000_000));

        // Junior shares are worth 2 each
        assert_eq!(outcome.senior.amount_processed, 400_000);
        assert_eq!(outcome.junior.amount_processed, 200_000);
        assert_eq!(outcome.junior.shares_processed, 100_000);
        assert_eq!(outcome.assets_after, TrancheAssets::new(3_600_000, 1_800_000));
        assert_eq!(outcome.liquidity_remaining, 4_400_000);
    }

    #[test]
    fn test_senior_served_before_junior() {
        let outcome = settle_redemptions(&create_test_request(400_000, 100_000, 450_000));

        assert_eq!(outcome.senior.shares_processed, 400_000);
        assert_eq!(outcome.junior.amount_processed, 50_000);
        assert_eq!(outcome.junior.shares_processed, 25_000);
        assert_eq!(outcome.junior.shares_unfulfilled(), 75_000);
        assert_eq!(outcome.liquidity_remaining, 0);
    }

    #[test]
    fn test_zero_liquidity_processes_nothing() {
        let outcome = settle_redemptions(&create_test_request(400_000, 100_000, 0));
        assert_eq!(outcome.senior.shares_processed, 0);
        assert_eq!(outcome.junior.shares_processed, 0);
        assert_eq!(outcome.senior.shares_requested, 400_000);
    }

    #[test]
    fn test_ratio_limits_junior_without_failing() {
        // Junior must keep 1M behind 4M senior: only 1M of 2M may leave
        let outcome = settle_redemptions(&create_test_request(0, 800_000, 5_000_000));
        assert_eq!(outcome.junior.amount_processed, 1_000_000);
        assert_eq!(outcome.junior.shares_processed, 500_000);

        let after = outcome.assets_after;
        assert!(after.senior_total_assets <= after.junior_total_assets * 4);
    }

    #[test]
    fn test_ratio_counts_senior_redemptions_first() {
        // Senior leaves 800k, so junior only needs to keep 800k
        let outcome = settle_redemptions(&create_test_request(800_000, 800_000, 5_000_000));
        assert_eq!(outcome.junior.amount_processed, 1_200_000);
        assert_eq!(outcome.assets_after, TrancheAssets::new(3_200_000, 800_000));
    }

    #[test]
    fn test_ratio_already_breached_blocks_junior() {
        let mut request = create_test_request(0, 10_000, 5_000_000);
        request.assets = TrancheAssets::new(4_000_000, 900_000);
        let outcome = settle_redemptions(&request);
        assert_eq!(outcome.junior.shares_processed, 0);
        assert_eq!(outcome.junior.amount_processed, 0);
    }

    #[test]
    fn test_disabled_ratio_leaves_junior_unconstrained() {
        let mut request = create_test_request(0, 1_000_000, 5_000_000);
        request.max_senior_junior_ratio = 0;
        let outcome = settle_redemptions(&request);
        assert_eq!(outcome.junior.amount_processed, 2_000_000);
        assert_eq!(outcome.assets_after.junior_total_assets, 0);
    }

    #[test]
    fn test_worthless_tranche_burns_shares_for_nothing() {
        let mut request = create_test_request(0, 1_000, 0);
        request.assets = TrancheAssets::new(0, 0);
        request.max_senior_junior_ratio = 0;
        let outcome = settle_redemptions(&request);
        assert_eq!(outcome.junior.shares_processed, 1_000);
        assert_eq!(outcome.junior.amount_processed, 0);
    }
}
