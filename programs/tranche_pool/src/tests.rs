// programs/tranche_pool/src/tests.rs
//
// End-to-end pool flows run against the pure engines that back each
// instruction: deposits, a credit event, epoch settlement and lender replay.

use anchor_lang::prelude::*;
use credit_core::math::{apply_bps, div_ceil, mul_div};
use credit_core::{CalendarDate, PayPeriodDuration};
use proptest::prelude::*;

use crate::epoch::{CurrentEpoch, SettlementOutcome};
use crate::first_loss::{CoverKind, FirstLossCover};
use crate::instructions::settlement::{apply_settlement, settle_lender_yield, yield_payout};
use crate::policy::{SeniorYieldTracker, TranchesPolicy};
use crate::redemption::{replay_epochs, EpochSlot, LenderRedemptionRecord};
use crate::state::{
    LenderState, PoolConfig, PoolState, PoolStatus, Tranche, TrancheAssets, TrancheLedger,
    TrancheLosses,
};
use crate::waterfall::{CreditCapability, WaterfallDistributor};

// =============================================================================
// FIXTURES
// =============================================================================

const RISK_ADJUSTMENT_BPS: u16 = 2000;

fn ts(year: i64, month: u32, day: u32) -> i64 {
    CalendarDate { year, month, day }.to_timestamp()
}

fn create_test_config(credit_authority: Pubkey) -> PoolConfig {
    PoolConfig {
        pool_id: 7,
        authority: Pubkey::new_unique(),
        credit_authority,
        underlying_mint: Pubkey::new_unique(),
        pool_vault: Pubkey::new_unique(),
        tranches_policy: TranchesPolicy::RiskAdjusted {
            risk_adjustment_bps: RISK_ADJUSTMENT_BPS,
        },
        max_senior_junior_ratio: 4,
        pay_period_duration: PayPeriodDuration::Monthly,
        liquidity_cap: PoolConfig::DEFAULT_LIQUIDITY_CAP,
        min_deposit_amount: PoolConfig::DEFAULT_MIN_DEPOSIT_AMOUNT,
        withdrawal_lockout_secs: 0,
        min_junior_liquidity: 0,
        created_at: ts(2024, 1, 1),
        bump: 255,
    }
}

fn create_test_cover(kind: CoverKind, total_assets: u64, multiplier_bps: u16) -> FirstLossCover {
    FirstLossCover {
        kind,
        provider: Pubkey::new_unique(),
        total_assets,
        cover_cap_per_loss: 2_000_000,
        cover_rate_per_loss_bps: 10000,
        risk_yield_multiplier_bps: multiplier_bps,
        covered_loss: 0,
        min_liquidity: 0,
    }
}

/// Enabled pool in epoch 1 with a borrower cover and a profit-earning
/// admin cover, no lender capital yet
fn create_scenario_pool() -> PoolState {
    PoolState {
        pool_config: Pubkey::new_unique(),
        status: PoolStatus::On,
        tranche_assets: TrancheAssets::default(),
        tranche_losses: TrancheLosses::default(),
        covers: vec![
            create_test_cover(CoverKind::Borrower, 1_000_000, 0),
            create_test_cover(CoverKind::Admin, 500_000, 10000),
        ],
        senior_yield_tracker: SeniorYieldTracker::default(),
        tranches: [TrancheLedger::default(); 2],
        current_epoch: CurrentEpoch {
            id: 1,
            end_time: ts(2024, 2, 1),
        },
        last_profit_at: 0,
        profit_round: 0,
        uncovered_loss: 0,
        total_profit_distributed: 0,
        total_loss_distributed: 0,
        total_loss_recovered: 0,
        bump: 255,
    }
}

fn create_test_lender(tranche: Tranche, shares: u64, epoch_id: u64) -> LenderState {
    LenderState {
        pool_config: Pubkey::new_unique(),
        lender: Pubkey::new_unique(),
        tranche,
        shares,
        principal: shares,
        reinvest_yield: true,
        last_deposit_at: 0,
        yield_processed_at: 0,
        yield_round: 0,
        redemption: LenderRedemptionRecord {
            last_updated_epoch_id: epoch_id,
            ..Default::default()
        },
        created_at: 0,
        bump: 255,
    }
}

/// Mirror of add_redemption_request on the lender and the tranche summary
fn request_redemption(state: &mut PoolState, lender: &mut LenderState, shares: u64) {
    let epoch_id = state.current_epoch_id();
    let principal = lender.principal_for(shares);
    lender
        .redemption
        .add_request(shares, principal, epoch_id)
        .unwrap();
    let shares_before = lender.shares;
    lender.shares -= shares;
    lender.principal -= principal;
    state.sync_yield_lender(lender, shares_before);
    state
        .ledger_mut(lender.tranche)
        .current_redemption(epoch_id)
        .shares_requested += shares;
}

/// Mirror of deposit after the transfer lands
fn deposit(state: &mut PoolState, lender: &mut LenderState, amount: u64) -> u64 {
    let shares = state.record_deposit(lender.tranche, amount).unwrap();
    let shares_before = lender.shares;
    lender.shares += shares;
    lender.principal += amount;
    state.sync_yield_lender(lender, shares_before);
    shares
}

fn create_cash_yield_lender(tranche: Tranche) -> LenderState {
    LenderState {
        reinvest_yield: false,
        ..create_test_lender(tranche, 0, 1)
    }
}

/// Mirror of close_epoch: settle, then open the next epoch
fn close_epoch(
    state: &mut PoolState,
    config: &PoolConfig,
    vault_balance: u64,
) -> (u64, SettlementOutcome) {
    let now = state.current_epoch.end_time;
    let closing = state.current_epoch.begin_close(now).unwrap();
    let epoch_id = closing.id();
    let outcome = apply_settlement(
        state,
        &config.tranches_policy,
        vault_balance,
        epoch_id,
        config.max_senior_junior_ratio,
        now,
    );
    state.current_epoch = closing.finish(config.pay_period_duration);
    (epoch_id, outcome)
}

/// The summary close_epoch would persist for a tranche with demand
fn closed_slot(state: &PoolState, tranche: Tranche, epoch_id: u64) -> EpochSlot {
    let mut summary = state.ledger(tranche).redemption;
    summary.roll_to(epoch_id);
    EpochSlot {
        epoch_id,
        summary: Some(summary),
    }
}

// =============================================================================
// SCENARIO
// =============================================================================

#[test]
fn test_first_payment_and_ratio_limited_junior_redemption() {
    let credit_authority = Pubkey::new_unique();
    let config = create_test_config(credit_authority);
    let mut state = create_scenario_pool();

    // Senior 5M and junior 2M open at par
    assert_eq!(state.record_deposit(Tranche::Senior, 5_000_000), Some(5_000_000));
    assert_eq!(state.record_deposit(Tranche::Junior, 2_000_000), Some(2_000_000));
    let mut junior_lender = create_test_lender(Tranche::Junior, 2_000_000, 1);

    // Borrower draws 10M; first payment is 30 days at 12% APR, of which
    // 20% goes to pool fees
    let drawn = 10_000_000u64;
    let interest = mul_div(drawn, 1200 * 30, 360 * 10_000);
    let fees = apply_bps(interest, 2000);
    let profit = interest - fees;
    assert_eq!(profit, 80_000);

    let capability = CreditCapability::authorize(&credit_authority, &config).unwrap();
    let result = WaterfallDistributor::new(config.tranches_policy, &mut state).distribute_profit(
        &capability,
        profit,
        ts(2024, 1, 31),
    );

    // Risk-adjusted split, then the admin cover's weighted share of junior
    let pro_rata = mul_div(profit, 5_000_000, 7_000_000);
    let senior_profit = pro_rata - apply_bps(pro_rata, RISK_ADJUSTMENT_BPS);
    let junior_candidate = profit - senior_profit;
    let admin_profit = mul_div(junior_candidate, 500_000, 2_000_000 + 500_000);
    let junior_profit = junior_candidate - admin_profit;

    assert_eq!(result.senior, senior_profit);
    assert_eq!(result.junior, junior_profit);
    assert_eq!(result.per_cover, vec![0, admin_profit]);
    assert_eq!((senior_profit, admin_profit, junior_profit), (45_714, 6_857, 27_429));
    assert_eq!(state.tranche_assets.senior_total_assets, 5_000_000 + senior_profit);
    assert_eq!(state.tranche_assets.junior_total_assets, 2_000_000 + junior_profit);
    assert_eq!(state.covers[1].total_assets, 506_857);

    // Senior tops up to just under the 4x ceiling
    let junior_assets = state.tranche_total_assets(Tranche::Junior);
    assert!(state.tranche_total_assets(Tranche::Senior) + 3_000_000 <= config.max_senior_assets(junior_assets));
    assert_eq!(state.record_deposit(Tranche::Senior, 3_000_000), Some(2_972_820));

    // Junior asks for 150,000 worth of shares
    let shares = state.convert_to_shares(Tranche::Junior, 150_000).unwrap();
    assert_eq!(shares, 147_970);
    request_redemption(&mut state, &mut junior_lender, shares);

    // Vault: capital in, loan out, payment in, fees out
    let vault_balance = 5_000_000 + 2_000_000 + 1_500_000 + 3_000_000 - drawn + interest - fees;
    assert_eq!(state.available_liquidity(vault_balance), 73_143);

    let (epoch_id, outcome) = close_epoch(&mut state, &config, vault_balance);
    assert_eq!(epoch_id, 1);
    assert_eq!(state.current_epoch_id(), 2);

    // Liquidity would cover it; the ratio only lets 16,000 leave junior
    let senior_assets = state.tranche_total_assets(Tranche::Senior);
    assert_eq!(senior_assets, 8_045_714);
    assert_eq!(outcome.junior.shares_requested, 147_970);
    assert_eq!(outcome.junior.shares_processed, 15_783);
    assert_eq!(outcome.junior.amount_processed, 15_999);
    assert!(outcome.junior.amount_processed <= 2_027_429 - div_ceil(senior_assets, 4));
    assert!(senior_assets <= 4 * state.tranche_total_assets(Tranche::Junior));
    assert_eq!(state.ledger(Tranche::Junior).unwithdrawn_amount, 15_999);
    assert_eq!(state.ledger(Tranche::Junior).total_supply, 2_000_000 - 15_783);

    // Lender replays epoch 1: paid for what was processed, remainder kept
    let slot = closed_slot(&state, Tranche::Junior, epoch_id);
    let report = replay_epochs(&mut junior_lender.redemption, state.current_epoch_id(), vec![slot]).unwrap();
    assert_eq!(report.shares_processed, 15_783);
    assert_eq!(junior_lender.withdrawable_assets(), 15_999);
    assert_eq!(junior_lender.redemption.shares_requested, 147_970 - 15_783);
    assert_eq!(junior_lender.redemption.last_updated_epoch_id, 2);

    // The unfulfilled remainder is the next epoch's opening demand
    assert_eq!(
        state.ledger(Tranche::Junior).demand(2).shares_requested,
        junior_lender.redemption.shares_requested
    );
}

// =============================================================================
// MULTI-EPOCH REDEMPTIONS
// =============================================================================

#[test]
fn test_redemptions_conserve_funds_across_epochs() {
    let config = PoolConfig {
        max_senior_junior_ratio: 0,
        ..create_test_config(Pubkey::new_unique())
    };
    let mut state = create_scenario_pool();
    state.covers.clear();
    state.record_deposit(Tranche::Junior, 2_000_000);

    let mut lenders = vec![
        create_test_lender(Tranche::Junior, 1_000_000, 1),
        create_test_lender(Tranche::Junior, 600_000, 1),
        create_test_lender(Tranche::Junior, 400_000, 1),
    ];
    for (lender, shares) in lenders.iter_mut().zip([90_000u64, 30_001, 7]) {
        request_redemption(&mut state, lender, shares);
    }

    // Epoch 1 pays 60,000 of 120,008 requested
    let vault_1 = 60_000;
    let (epoch_1, first) = close_epoch(&mut state, &config, vault_1);
    assert!(first.junior.shares_processed < first.junior.shares_requested);
    let slot_1 = closed_slot(&state, Tranche::Junior, epoch_1);

    // Epoch 2 has liquidity for everything
    let vault_2 = state.unwithdrawn_total() + 1_000_000;
    let (epoch_2, second) = close_epoch(&mut state, &config, vault_2);
    assert_eq!(second.junior.shares_processed, second.junior.shares_requested);
    let slot_2 = closed_slot(&state, Tranche::Junior, epoch_2);

    let mut paid = 0;
    for lender in lenders.iter_mut() {
        replay_epochs(&mut lender.redemption, state.current_epoch_id(), vec![slot_1, slot_2]).unwrap();
        assert_eq!(lender.redemption.shares_requested, 0);
        paid += lender.redemption.mark_withdrawn();
    }

    let processed = first.junior.amount_processed + second.junior.amount_processed;
    assert!(paid <= processed);
    assert!(processed - paid <= lenders.len() as u64);
}

#[test]
fn test_replay_over_unserved_epochs_is_idempotent() {
    let config = create_test_config(Pubkey::new_unique());
    let mut state = create_scenario_pool();
    state.record_deposit(Tranche::Junior, 2_000_000);
    let mut lender = create_test_lender(Tranche::Junior, 2_000_000, 1);
    request_redemption(&mut state, &mut lender, 10_000);

    // No liquidity in either epoch; the request carries forward twice
    close_epoch(&mut state, &config, 0);
    let slot_1 = closed_slot(&state, Tranche::Junior, 1);
    close_epoch(&mut state, &config, 0);
    let slot_2 = closed_slot(&state, Tranche::Junior, 2);
    assert_eq!(state.current_epoch_id(), 3);
    assert_eq!(state.ledger(Tranche::Junior).demand(3).shares_requested, 10_000);

    replay_epochs(&mut lender.redemption, 3, vec![slot_1, slot_2]).unwrap();
    let reconciled = lender.redemption;
    assert_eq!(reconciled.shares_requested, 10_000);
    assert_eq!(reconciled.amount_processed, 0);
    assert!(reconciled.is_reconciled(3));

    // Replaying again changes nothing
    let report = replay_epochs(&mut lender.redemption, 3, vec![slot_1, slot_2]).unwrap();
    assert_eq!(report.epochs_replayed, 0);
    assert_eq!(lender.redemption, reconciled);
}

// =============================================================================
// YIELD PAYOUT
// =============================================================================

#[test]
fn test_yield_payout_leaves_principal() {
    let mut state = create_scenario_pool();
    state.record_deposit(Tranche::Senior, 1_000_000);
    state.tranche_assets.senior_total_assets = 1_050_000;

    let mut lender = create_test_lender(Tranche::Senior, 400_000, 1);
    lender.reinvest_yield = false;

    let (shares_burned, payout) = yield_payout(&state, &lender);
    assert_eq!(shares_burned, 19_047);
    assert_eq!(payout, 19_999);

    let remaining_value = state.convert_to_assets(Tranche::Senior, lender.shares - shares_burned);
    assert!(remaining_value >= lender.principal);

    lender.principal = 500_000;
    assert_eq!(yield_payout(&state, &lender), (0, 0));
}

#[test]
fn test_yield_processing_spans_batches() {
    let mut state = create_scenario_pool();
    let mut lenders: Vec<LenderState> = (0..40)
        .map(|_| create_cash_yield_lender(Tranche::Junior))
        .collect();
    for lender in lenders.iter_mut() {
        assert_eq!(deposit(&mut state, lender, 50_000), 50_000);
    }
    let ledger = state.ledger(Tranche::Junior);
    assert_eq!(ledger.non_reinvesting_lenders, 40);
    assert_eq!(ledger.yield_lenders_processed, 40);
    assert!(!state.has_unprocessed_profit());

    // 2% junior profit
    state.tranche_assets.junior_total_assets += 40_000;
    state.start_profit_round(ts(2024, 1, 15));
    assert!(state.has_unprocessed_profit());

    let now = ts(2024, 1, 20);
    let mut total_paid = 0;
    for lender in lenders[..20].iter_mut() {
        let (shares_burned, payout) =
            settle_lender_yield(&mut state, lender, u64::MAX, now).unwrap();
        assert!(shares_burned > 0 && payout > 0 && payout <= 1_000);
        assert_eq!(lender.yield_processed_at, now);
        total_paid += payout;
    }
    assert_eq!(state.ledger(Tranche::Junior).yield_lenders_processed, 20);
    assert!(state.has_unprocessed_profit());

    // Resending a batch pays nothing and counts nothing
    for lender in lenders[..20].iter_mut() {
        assert_eq!(settle_lender_yield(&mut state, lender, u64::MAX, now).unwrap(), (0, 0));
    }
    assert_eq!(state.ledger(Tranche::Junior).yield_lenders_processed, 20);

    for lender in lenders[20..].iter_mut() {
        let (_, payout) = settle_lender_yield(&mut state, lender, u64::MAX, now).unwrap();
        total_paid += payout;
    }
    assert!(!state.has_unprocessed_profit());
    assert!(total_paid <= 40_000);
    for lender in lenders.iter() {
        assert!(state.convert_to_assets(Tranche::Junior, lender.shares) >= lender.principal);
    }

    let config = create_test_config(Pubkey::new_unique());
    let (epoch_id, outcome) = close_epoch(&mut state, &config, 5_000_000);
    assert_eq!(epoch_id, 1);
    assert!(outcome.is_empty());
}

#[test]
fn test_yield_settlement_requires_liquidity() {
    let mut state = create_scenario_pool();
    let mut lender = create_cash_yield_lender(Tranche::Junior);
    deposit(&mut state, &mut lender, 100_000);
    state.tranche_assets.junior_total_assets += 10_000;
    state.start_profit_round(ts(2024, 1, 15));

    let now = ts(2024, 1, 20);
    let before = lender.clone();
    assert!(settle_lender_yield(&mut state, &mut lender, 5_000, now).is_err());
    assert_eq!(lender.shares, before.shares);
    assert_eq!(lender.yield_round, before.yield_round);
    assert_eq!(state.ledger(Tranche::Junior).yield_lenders_processed, 0);

    let (_, payout) = settle_lender_yield(&mut state, &mut lender, 20_000, now).unwrap();
    assert_eq!(payout, 9_999);
    assert!(!state.has_unprocessed_profit());
}

#[test]
fn test_zero_share_registrations_do_not_block_close() {
    let mut state = create_scenario_pool();
    let mut idle: Vec<LenderState> = (0..64)
        .map(|_| create_cash_yield_lender(Tranche::Junior))
        .collect();
    let mut active = create_cash_yield_lender(Tranche::Junior);
    let mut leaving = create_cash_yield_lender(Tranche::Junior);
    deposit(&mut state, &mut active, 200_000);
    deposit(&mut state, &mut leaving, 100_000);
    assert_eq!(state.ledger(Tranche::Junior).non_reinvesting_lenders, 2);

    state.tranche_assets.junior_total_assets += 3_000;
    state.start_profit_round(ts(2024, 1, 15));
    assert!(state.has_unprocessed_profit());

    // Idle registrations are outside the count and change nothing
    let now = ts(2024, 1, 20);
    for lender in idle.iter_mut() {
        assert_eq!(settle_lender_yield(&mut state, lender, u64::MAX, now).unwrap(), (0, 0));
    }
    assert_eq!(state.ledger(Tranche::Junior).yield_lenders_processed, 0);

    // Queuing every share for redemption leaves the count
    let all_shares = leaving.shares;
    request_redemption(&mut state, &mut leaving, all_shares);
    assert_eq!(state.ledger(Tranche::Junior).non_reinvesting_lenders, 1);

    settle_lender_yield(&mut state, &mut active, u64::MAX, now).unwrap();
    assert!(!state.has_unprocessed_profit());

    let config = create_test_config(Pubkey::new_unique());
    let (_, outcome) = close_epoch(&mut state, &config, 5_000_000);
    assert_eq!(outcome.junior.shares_processed, all_shares);
}

// =============================================================================
// EMPTY EPOCHS
// =============================================================================

#[test]
fn test_empty_epoch_leaves_pool_untouched() {
    let config = create_test_config(Pubkey::new_unique());
    let mut state = create_scenario_pool();
    state.record_deposit(Tranche::Senior, 4_000_000);
    state.record_deposit(Tranche::Junior, 1_000_000);
    state.tranches[Tranche::Junior.index()].unwithdrawn_amount = 25_000;

    let assets_before = state.tranche_assets;
    let ledgers_before = state.tranches;

    for expected_epoch in 1..=2 {
        let (epoch_id, outcome) = close_epoch(&mut state, &config, 6_000_000);
        assert_eq!(epoch_id, expected_epoch);
        assert!(outcome.is_empty());

        assert_eq!(state.tranche_assets, assets_before);
        for tranche in [Tranche::Senior, Tranche::Junior] {
            let ledger = state.ledger(tranche);
            let before = &ledgers_before[tranche.index()];
            assert_eq!(ledger.total_supply, before.total_supply);
            assert_eq!(ledger.unwithdrawn_amount, before.unwithdrawn_amount);
            assert_eq!(ledger.redemption, before.redemption);
        }
    }
    assert_eq!(state.current_epoch_id(), 3);
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn prop_settlement_keeps_ratio_and_liquidity(
        senior in 0u64..20_000_000,
        junior in 1u64..5_000_000,
        senior_request in 0u64..5_000_000,
        junior_request in 0u64..5_000_000,
        liquidity in 0u64..10_000_000,
        ratio in 0u8..8,
    ) {
        let config = PoolConfig {
            max_senior_junior_ratio: ratio,
            ..create_test_config(Pubkey::new_unique())
        };
        prop_assume!(ratio == 0 || senior <= junior.saturating_mul(ratio as u64));

        let mut state = create_scenario_pool();
        state.covers.clear();
        state.record_deposit(Tranche::Senior, senior);
        state.record_deposit(Tranche::Junior, junior);

        let senior_request = senior_request.min(state.ledger(Tranche::Senior).total_supply);
        let junior_request = junior_request.min(state.ledger(Tranche::Junior).total_supply);
        state.ledger_mut(Tranche::Senior).current_redemption(1).shares_requested = senior_request;
        state.ledger_mut(Tranche::Junior).current_redemption(1).shares_requested = junior_request;

        let (_, outcome) = close_epoch(&mut state, &config, liquidity);
        let paid = outcome.senior.amount_processed + outcome.junior.amount_processed;

        prop_assert!(paid <= liquidity);
        prop_assert_eq!(state.tranche_assets.total(), senior + junior - paid);
        prop_assert_eq!(state.unwithdrawn_total(), paid);
        if ratio > 0 && outcome.junior.shares_processed > 0 {
            let assets = state.tranche_assets;
            prop_assert!(assets.senior_total_assets <= assets.junior_total_assets * ratio as u64);
        }
    }
}
