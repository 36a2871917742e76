// programs/tranche_pool/src/instructions/settlement.rs
//
// Epoch Settlement and Pool Closure
// =================================
// close_epoch is permissionless once the epoch end time has passed. It pays
// senior redemptions first, then junior within the senior:junior ratio, and
// freezes each tranche's outcome in an EpochRedemptionSummary account that
// lenders later replay into their own records.
//
// close_pool runs one last settlement with the ratio lifted and stops the
// pool. Remaining shares are then redeemed with withdraw_after_pool_closure.

use anchor_lang::prelude::*;
use anchor_spl::token_interface::{
    Mint as MintInterface, TokenAccount as TokenAccountInterface, TokenInterface,
};

use super::transfer_from_vault;
use crate::epoch::{settle_redemptions, SettlementOutcome, SettlementRequest, TrancheFulfillment};
use crate::errors::PoolError;
use crate::events::{
    EpochProcessed, LenderYieldProcessed, NewEpochStarted, PoolClosed, YieldPaidOut,
};
use crate::policy::TranchesPolicy;
use crate::state::{
    EpochRedemptionSummary, LenderState, PoolConfig, PoolState, PoolStatus, Tranche,
};

// =============================================================================
// SHARED SETTLEMENT
// =============================================================================

/// Settle the closing epoch's demand and apply the outcome to pool state
pub(crate) fn apply_settlement(
    state: &mut PoolState,
    policy: &TranchesPolicy,
    vault_balance: u64,
    epoch_id: u64,
    max_senior_junior_ratio: u8,
    now: i64,
) -> SettlementOutcome {
    let request = SettlementRequest {
        assets: state.tranche_assets,
        available_liquidity: state.available_liquidity(vault_balance),
        senior: state.ledger(Tranche::Senior).demand(epoch_id),
        junior: state.ledger(Tranche::Junior).demand(epoch_id),
        max_senior_junior_ratio,
    };
    let outcome = settle_redemptions(&request);

    for (tranche, fulfillment) in [
        (Tranche::Senior, outcome.senior),
        (Tranche::Junior, outcome.junior),
    ] {
        if !fulfillment.has_demand() {
            continue;
        }
        let ledger = state.ledger_mut(tranche);
        ledger
            .current_redemption(epoch_id)
            .record_processing(fulfillment.shares_processed, fulfillment.amount_processed);
        ledger.total_supply -= fulfillment.shares_processed;
        ledger.unwithdrawn_amount = ledger
            .unwithdrawn_amount
            .saturating_add(fulfillment.amount_processed);
    }

    state.tranche_assets = outcome.assets_after;
    let senior_assets = state.tranche_total_assets(Tranche::Senior);
    state.senior_yield_tracker.refresh(policy, senior_assets, now);

    outcome
}

/// Freeze a tranche's summary for the closed epoch. Required whenever the
/// tranche had demand; written as an empty record if passed without demand.
fn write_epoch_summary(
    account: Option<&mut Account<EpochRedemptionSummary>>,
    state: &PoolState,
    tranche: Tranche,
    fulfillment: &TrancheFulfillment,
    epoch_id: u64,
    closed_at: i64,
) -> Result<()> {
    let account = match account {
        Some(account) => account,
        None => {
            require!(!fulfillment.has_demand(), PoolError::MissingRedemptionSummary);
            return Ok(());
        }
    };

    let mut summary = state.ledger(tranche).redemption;
    summary.roll_to(epoch_id);

    account.pool_config = state.pool_config;
    account.tranche = tranche;
    account.summary = summary;
    account.closed_at = closed_at;
    Ok(())
}

fn emit_epoch_processed(state: &PoolState, epoch_id: u64, outcome: &SettlementOutcome, now: i64) {
    emit!(EpochProcessed {
        pool_config: state.pool_config,
        epoch_id,
        senior_shares_requested: outcome.senior.shares_requested,
        senior_shares_processed: outcome.senior.shares_processed,
        senior_amount_processed: outcome.senior.amount_processed,
        junior_shares_requested: outcome.junior.shares_requested,
        junior_shares_processed: outcome.junior.shares_processed,
        junior_amount_processed: outcome.junior.amount_processed,
        senior_assets_after: outcome.assets_after.senior_total_assets,
        junior_assets_after: outcome.assets_after.junior_total_assets,
        timestamp: now,
    });
}

// =============================================================================
// CLOSE EPOCH
// =============================================================================

#[derive(Accounts)]
pub struct CloseEpoch<'info> {
    #[account(
        seeds = [PoolConfig::SEED_PREFIX, &pool_config.pool_id.to_le_bytes()],
        bump = pool_config.bump,
    )]
    pub pool_config: Account<'info, PoolConfig>,

    #[account(
        mut,
        seeds = [PoolState::SEED_PREFIX, pool_config.key().as_ref()],
        bump = pool_state.bump,
        constraint = pool_state.is_on() @ PoolError::PoolNotOn
    )]
    pub pool_state: Account<'info, PoolState>,

    #[account(
        constraint = pool_vault.key() == pool_config.pool_vault @ PoolError::InvalidTokenAccount
    )]
    pub pool_vault: InterfaceAccount<'info, TokenAccountInterface>,

    /// Needed only when the senior tranche has redemption demand
    #[account(
        init,
        payer = payer,
        space = 8 + EpochRedemptionSummary::INIT_SPACE,
        seeds = [
            EpochRedemptionSummary::SEED_PREFIX,
            pool_config.key().as_ref(),
            &[Tranche::Senior as u8],
            &pool_state.current_epoch.id.to_le_bytes()
        ],
        bump
    )]
    pub senior_summary: Option<Account<'info, EpochRedemptionSummary>>,

    /// Needed only when the junior tranche has redemption demand
    #[account(
        init,
        payer = payer,
        space = 8 + EpochRedemptionSummary::INIT_SPACE,
        seeds = [
            EpochRedemptionSummary::SEED_PREFIX,
            pool_config.key().as_ref(),
            &[Tranche::Junior as u8],
            &pool_state.current_epoch.id.to_le_bytes()
        ],
        bump
    )]
    pub junior_summary: Option<Account<'info, EpochRedemptionSummary>>,

    #[account(mut)]
    pub payer: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn close_epoch(ctx: Context<CloseEpoch>) -> Result<()> {
    let clock = Clock::get()?;
    let now = clock.unix_timestamp;
    let config = &ctx.accounts.pool_config;
    let vault_balance = ctx.accounts.pool_vault.amount;
    let state = &mut ctx.accounts.pool_state;

    require!(
        !state.has_unprocessed_profit(),
        PoolError::UnprocessedProfitPending
    );
    let closing = state.current_epoch.begin_close(now)?;
    let epoch_id = closing.id();

    let outcome = apply_settlement(
        state,
        &config.tranches_policy,
        vault_balance,
        epoch_id,
        config.max_senior_junior_ratio,
        now,
    );

    write_epoch_summary(
        ctx.accounts.senior_summary.as_mut(),
        state,
        Tranche::Senior,
        &outcome.senior,
        epoch_id,
        now,
    )?;
    write_epoch_summary(
        ctx.accounts.junior_summary.as_mut(),
        state,
        Tranche::Junior,
        &outcome.junior,
        epoch_id,
        now,
    )?;

    state.current_epoch = closing.finish(config.pay_period_duration);

    emit_epoch_processed(state, epoch_id, &outcome, now);
    emit!(NewEpochStarted {
        pool_config: state.pool_config,
        epoch_id: state.current_epoch.id,
        end_time: state.current_epoch.end_time,
    });

    msg!(
        "Epoch {} closed: senior paid {}, junior paid {}, {} liquidity left",
        epoch_id,
        outcome.senior.amount_processed,
        outcome.junior.amount_processed,
        outcome.liquidity_remaining
    );

    Ok(())
}

// =============================================================================
// CLOSE POOL
// =============================================================================

#[derive(Accounts)]
pub struct ClosePool<'info> {
    #[account(
        seeds = [PoolConfig::SEED_PREFIX, &pool_config.pool_id.to_le_bytes()],
        bump = pool_config.bump,
        has_one = authority @ PoolError::Unauthorized
    )]
    pub pool_config: Account<'info, PoolConfig>,

    #[account(
        mut,
        seeds = [PoolState::SEED_PREFIX, pool_config.key().as_ref()],
        bump = pool_state.bump,
        constraint = pool_state.is_on() @ PoolError::PoolNotOn
    )]
    pub pool_state: Account<'info, PoolState>,

    #[account(
        constraint = pool_vault.key() == pool_config.pool_vault @ PoolError::InvalidTokenAccount
    )]
    pub pool_vault: InterfaceAccount<'info, TokenAccountInterface>,

    #[account(
        init,
        payer = authority,
        space = 8 + EpochRedemptionSummary::INIT_SPACE,
        seeds = [
            EpochRedemptionSummary::SEED_PREFIX,
            pool_config.key().as_ref(),
            &[Tranche::Senior as u8],
            &pool_state.current_epoch.id.to_le_bytes()
        ],
        bump
    )]
    pub senior_summary: Option<Account<'info, EpochRedemptionSummary>>,

    #[account(
        init,
        payer = authority,
        space = 8 + EpochRedemptionSummary::INIT_SPACE,
        seeds = [
            EpochRedemptionSummary::SEED_PREFIX,
            pool_config.key().as_ref(),
            &[Tranche::Junior as u8],
            &pool_state.current_epoch.id.to_le_bytes()
        ],
        bump
    )]
    pub junior_summary: Option<Account<'info, EpochRedemptionSummary>>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,
}

/// Settle the open epoch early with no ratio limit and stop the pool
pub fn close_pool(ctx: Context<ClosePool>) -> Result<()> {
    let clock = Clock::get()?;
    let now = clock.unix_timestamp;
    let config = &ctx.accounts.pool_config;
    let vault_balance = ctx.accounts.pool_vault.amount;
    let state = &mut ctx.accounts.pool_state;

    require!(
        !state.has_unprocessed_profit(),
        PoolError::UnprocessedProfitPending
    );
    let closing = state.current_epoch.force_close(now);
    let epoch_id = closing.id();

    let outcome = apply_settlement(
        state,
        &config.tranches_policy,
        vault_balance,
        epoch_id,
        0,
        now,
    );

    write_epoch_summary(
        ctx.accounts.senior_summary.as_mut(),
        state,
        Tranche::Senior,
        &outcome.senior,
        epoch_id,
        now,
    )?;
    write_epoch_summary(
        ctx.accounts.junior_summary.as_mut(),
        state,
        Tranche::Junior,
        &outcome.junior,
        epoch_id,
        now,
    )?;

    state.current_epoch = closing.finish_final();
    state.status = PoolStatus::Closed;

    emit_epoch_processed(state, epoch_id, &outcome, now);
    emit!(PoolClosed {
        pool_config: state.pool_config,
        final_epoch_id: epoch_id,
        senior_amount_processed: outcome.senior.amount_processed,
        junior_amount_processed: outcome.junior.amount_processed,
        senior_total_assets: state.tranche_total_assets(Tranche::Senior),
        junior_total_assets: state.tranche_total_assets(Tranche::Junior),
        timestamp: now,
    });

    msg!("Pool {} closed after epoch {}", config.pool_id, epoch_id);

    Ok(())
}

// =============================================================================
// PROCESS YIELD FOR LENDERS
// =============================================================================

/// Remaining accounts: `(lender_state, lender_token_account)` pairs for a
/// batch of non-reinvesting lenders in the tranche, sorted by lender key.
/// Batches may be sent in any number of transactions; settlement waits until
/// every counted lender has been processed for the latest profit.
#[derive(Accounts)]
pub struct ProcessYieldForLenders<'info> {
    #[account(
        seeds = [PoolConfig::SEED_PREFIX, &pool_config.pool_id.to_le_bytes()],
        bump = pool_config.bump,
    )]
    pub pool_config: Account<'info, PoolConfig>,

    #[account(
        mut,
        seeds = [PoolState::SEED_PREFIX, pool_config.key().as_ref()],
        bump = pool_state.bump,
    )]
    pub pool_state: Account<'info, PoolState>,

    #[account(
        constraint = underlying_mint.key() == pool_config.underlying_mint @ PoolError::InvalidTokenAccount
    )]
    pub underlying_mint: InterfaceAccount<'info, MintInterface>,

    #[account(
        mut,
        constraint = pool_vault.key() == pool_config.pool_vault @ PoolError::InvalidTokenAccount
    )]
    pub pool_vault: InterfaceAccount<'info, TokenAccountInterface>,

    pub token_program: Interface<'info, TokenInterface>,
}

/// Shares to burn and cash to pay so a lender is left holding its principal.
/// Burns whole shares only and pays exactly what they are worth.
pub(crate) fn yield_payout(state: &PoolState, lender: &LenderState) -> (u64, u64) {
    let tranche = lender.tranche;
    let value = state.convert_to_assets(tranche, lender.shares);
    let excess = value.saturating_sub(lender.principal);
    if excess == 0 {
        return (0, 0);
    }
    let shares_burned = state
        .convert_to_shares(tranche, excess)
        .unwrap_or(0)
        .min(lender.shares);
    (shares_burned, state.convert_to_assets(tranche, shares_burned))
}

/// Settle one lender's cash yield for the current profit round. Lenders
/// already processed this round are left untouched and pay nothing.
pub(crate) fn settle_lender_yield(
    state: &mut PoolState,
    lender: &mut LenderState,
    liquidity_left: u64,
    now: i64,
) -> Result<(u64, u64)> {
    if !state.owes_yield(lender) {
        return Ok((0, 0));
    }

    let shares_before = lender.shares;
    let (shares_burned, payout) = yield_payout(state, lender);
    require!(payout <= liquidity_left, PoolError::InsufficientPoolLiquidity);
    state.mark_yield_processed(lender, now);
    if payout > 0 {
        let tranche = lender.tranche;
        lender.shares -= shares_burned;
        let ledger = state.ledger_mut(tranche);
        ledger.total_supply -= shares_burned;
        let tranche_assets = state.tranche_assets.get_mut(tranche);
        *tranche_assets = tranche_assets.saturating_sub(payout);
    }
    state.sync_yield_lender(lender, shares_before);

    Ok((shares_burned, payout))
}

pub fn process_yield_for_lenders<'info>(
    ctx: Context<'_, '_, 'info, 'info, ProcessYieldForLenders<'info>>,
    tranche: Tranche,
) -> Result<()> {
    let clock = Clock::get()?;
    let now = clock.unix_timestamp;

    let pool_config_key = ctx.accounts.pool_config.key();
    let underlying_mint = ctx.accounts.pool_config.underlying_mint;
    let policy = ctx.accounts.pool_config.tranches_policy;
    let decimals = ctx.accounts.underlying_mint.decimals;
    let token_program_info = ctx.accounts.token_program.to_account_info();
    let vault_info = ctx.accounts.pool_vault.to_account_info();
    let mint_info = ctx.accounts.underlying_mint.to_account_info();
    let pool_state_info = ctx.accounts.pool_state.to_account_info();
    let vault_balance = ctx.accounts.pool_vault.amount;

    require!(
        !ctx.remaining_accounts.is_empty() && ctx.remaining_accounts.len() % 2 == 0,
        PoolError::LenderAccountsIncomplete
    );

    let state = &mut ctx.accounts.pool_state;
    let available = state.available_liquidity(vault_balance);
    let mut total_paid: u64 = 0;
    let mut lenders_processed: u32 = 0;
    let mut previous_lender: Option<Pubkey> = None;

    for pair in ctx.remaining_accounts.chunks(2) {
        let mut lender_state: Account<'info, LenderState> = Account::try_from(&pair[0])?;
        require!(
            lender_state.pool_config == pool_config_key
                && lender_state.tranche == tranche
                && !lender_state.reinvest_yield,
            PoolError::InvalidLenderAccount
        );
        // Strict ordering rules out passing the same lender twice
        require!(
            previous_lender.map_or(true, |previous| previous < lender_state.lender),
            PoolError::LenderAccountsIncomplete
        );
        previous_lender = Some(lender_state.lender);

        let token_account: InterfaceAccount<'info, TokenAccountInterface> =
            InterfaceAccount::try_from(&pair[1])?;
        require!(
            token_account.owner == lender_state.lender && token_account.mint == underlying_mint,
            PoolError::InvalidTokenAccount
        );

        let round_before = lender_state.yield_round;
        let (shares_burned, payout) = settle_lender_yield(
            state,
            &mut lender_state,
            available.saturating_sub(total_paid),
            now,
        )?;
        if lender_state.yield_round != round_before {
            lenders_processed += 1;
        }

        if payout > 0 {
            total_paid = total_paid.saturating_add(payout);

            transfer_from_vault(
                token_program_info.clone(),
                vault_info.clone(),
                mint_info.clone(),
                pair[1].clone(),
                pool_state_info.clone(),
                &pool_config_key,
                state.bump,
                payout,
                decimals,
            )?;

            emit!(YieldPaidOut {
                pool_config: pool_config_key,
                lender: lender_state.lender,
                tranche: tranche as u8,
                amount: payout,
                shares_burned,
                timestamp: now,
            });
        }

        lender_state.exit(ctx.program_id)?;
    }

    state.ledger_mut(tranche).yield_processed_at = now;
    let senior_assets = state.tranche_total_assets(Tranche::Senior);
    state.senior_yield_tracker.refresh(&policy, senior_assets, now);

    let ledger = state.ledger(tranche);
    emit!(LenderYieldProcessed {
        pool_config: pool_config_key,
        tranche: tranche as u8,
        lenders_processed,
        lenders_outstanding: ledger
            .non_reinvesting_lenders
            .saturating_sub(ledger.yield_lenders_processed),
        total_paid,
        timestamp: now,
    });

    msg!(
        "Paid {} yield to {} {} lenders",
        total_paid,
        lenders_processed,
        tranche.name()
    );

    Ok(())
}
