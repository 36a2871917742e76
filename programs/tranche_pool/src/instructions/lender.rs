// programs/tranche_pool/src/instructions/lender.rs
//
// Lender Operations
// =================
// Registration, deposits, epoch redemption requests and disbursement.
//
// Instructions that touch a lender's redemption record take the tranche's
// closed-epoch summary accounts as `remaining_accounts`, one per epoch from
// the record's last updated epoch onwards. The record is replayed against
// them before anything else happens.

use anchor_lang::prelude::*;
use anchor_spl::token_interface::{
    Mint as MintInterface, TokenAccount as TokenAccountInterface, TokenInterface,
};
use credit_core::token_utils;

use super::{reconcile_lender, transfer_from_vault};
use crate::errors::PoolError;
use crate::events::{
    LenderFundsDisbursed, LenderRegistered, LiquidityDeposited, PoolClosureWithdrawal,
    RedemptionRequestAdded, RedemptionRequestCancelled,
};
use crate::redemption::LenderRedemptionRecord;
use crate::state::{LenderState, PoolConfig, PoolState, PoolStatus, Tranche};

// =============================================================================
// REGISTER LENDER
// =============================================================================

#[derive(Accounts)]
#[instruction(tranche: Tranche)]
pub struct RegisterLender<'info> {
    #[account(
        seeds = [PoolConfig::SEED_PREFIX, &pool_config.pool_id.to_le_bytes()],
        bump = pool_config.bump,
    )]
    pub pool_config: Account<'info, PoolConfig>,

    #[account(
        seeds = [PoolState::SEED_PREFIX, pool_config.key().as_ref()],
        bump = pool_state.bump,
        constraint = pool_state.status != PoolStatus::Closed @ PoolError::PoolClosed
    )]
    pub pool_state: Account<'info, PoolState>,

    #[account(
        init,
        payer = lender,
        space = 8 + LenderState::INIT_SPACE,
        seeds = [
            LenderState::SEED_PREFIX,
            pool_config.key().as_ref(),
            &[tranche as u8],
            lender.key().as_ref()
        ],
        bump
    )]
    pub lender_state: Account<'info, LenderState>,

    #[account(mut)]
    pub lender: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn register_lender(
    ctx: Context<RegisterLender>,
    tranche: Tranche,
    reinvest_yield: bool,
) -> Result<()> {
    let clock = Clock::get()?;

    // Cash-yield lenders are counted once they hold shares
    let state = &ctx.accounts.pool_state;
    let lender_state = &mut ctx.accounts.lender_state;
    lender_state.pool_config = ctx.accounts.pool_config.key();
    lender_state.lender = ctx.accounts.lender.key();
    lender_state.tranche = tranche;
    lender_state.shares = 0;
    lender_state.principal = 0;
    lender_state.reinvest_yield = reinvest_yield;
    lender_state.last_deposit_at = 0;
    lender_state.yield_processed_at = clock.unix_timestamp;
    lender_state.yield_round = state.profit_round;
    lender_state.redemption = LenderRedemptionRecord {
        last_updated_epoch_id: state.current_epoch_id(),
        ..Default::default()
    };
    lender_state.created_at = clock.unix_timestamp;
    lender_state.bump = ctx.bumps.lender_state;

    emit!(LenderRegistered {
        pool_config: lender_state.pool_config,
        lender: lender_state.lender,
        tranche: tranche as u8,
        reinvest_yield,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

// =============================================================================
// DEPOSIT
// =============================================================================

#[derive(Accounts)]
pub struct Deposit<'info> {
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
        mut,
        seeds = [
            LenderState::SEED_PREFIX,
            pool_config.key().as_ref(),
            &[lender_state.tranche as u8],
            lender.key().as_ref()
        ],
        bump = lender_state.bump,
    )]
    pub lender_state: Account<'info, LenderState>,

    #[account(
        constraint = underlying_mint.key() == pool_config.underlying_mint @ PoolError::InvalidTokenAccount
    )]
    pub underlying_mint: InterfaceAccount<'info, MintInterface>,

    #[account(
        mut,
        constraint = lender_token_account.mint == pool_config.underlying_mint @ PoolError::InvalidTokenAccount,
        constraint = lender_token_account.owner == lender.key() @ PoolError::Unauthorized
    )]
    pub lender_token_account: InterfaceAccount<'info, TokenAccountInterface>,

    #[account(
        mut,
        constraint = pool_vault.key() == pool_config.pool_vault @ PoolError::InvalidTokenAccount
    )]
    pub pool_vault: InterfaceAccount<'info, TokenAccountInterface>,

    pub lender: Signer<'info>,

    pub token_program: Interface<'info, TokenInterface>,
}

pub fn deposit(ctx: Context<Deposit>, amount: u64) -> Result<()> {
    let clock = Clock::get()?;
    let config = &ctx.accounts.pool_config;
    let tranche = ctx.accounts.lender_state.tranche;

    require!(amount > 0, PoolError::ZeroAmount);

    // Before the pool is enabled only the pool owner may seed capital
    let state = &ctx.accounts.pool_state;
    match state.status {
        PoolStatus::On => {}
        PoolStatus::Off => {
            require_keys_eq!(
                ctx.accounts.lender.key(),
                config.authority,
                PoolError::PoolNotOn
            );
        }
        PoolStatus::Closed => return err!(PoolError::PoolClosed),
    }

    require!(
        amount >= config.min_deposit_amount,
        PoolError::DepositAmountTooLow
    );
    require!(
        state.total_assets().saturating_add(amount) <= config.liquidity_cap,
        PoolError::PoolLiquidityCapExceeded
    );
    if tranche == Tranche::Senior {
        let senior_after = state
            .tranche_total_assets(Tranche::Senior)
            .saturating_add(amount);
        require!(
            senior_after <= config.max_senior_assets(state.tranche_total_assets(Tranche::Junior)),
            PoolError::RatioExceeded
        );
    }

    token_utils::transfer_checked(
        ctx.accounts.token_program.to_account_info(),
        ctx.accounts.lender_token_account.to_account_info(),
        ctx.accounts.underlying_mint.to_account_info(),
        ctx.accounts.pool_vault.to_account_info(),
        ctx.accounts.lender.to_account_info(),
        &[],
        amount,
        ctx.accounts.underlying_mint.decimals,
    )?;

    let state = &mut ctx.accounts.pool_state;
    let assets_before = state.tranche_total_assets(tranche);
    let shares = state
        .record_deposit(tranche, amount)
        .ok_or(PoolError::TrancheAssetsDepleted)?;
    require!(shares > 0, PoolError::DepositAmountTooLow);
    let senior_assets = state.tranche_total_assets(Tranche::Senior);
    state
        .senior_yield_tracker
        .refresh(&config.tranches_policy, senior_assets, clock.unix_timestamp);

    let lender_state = &mut ctx.accounts.lender_state;
    let shares_before = lender_state.shares;
    lender_state.shares = lender_state.shares.saturating_add(shares);
    lender_state.principal = lender_state.principal.saturating_add(amount);
    lender_state.last_deposit_at = clock.unix_timestamp;
    state.sync_yield_lender(lender_state, shares_before);

    emit!(LiquidityDeposited {
        pool_config: state.pool_config,
        lender: lender_state.lender,
        tranche: tranche as u8,
        amount,
        shares,
        tranche_assets_before: assets_before,
        tranche_assets_after: state.tranche_total_assets(tranche),
        timestamp: clock.unix_timestamp,
    });

    msg!(
        "Deposited {} into {} tranche for {} shares",
        amount,
        tranche.name(),
        shares
    );

    Ok(())
}

// =============================================================================
// REDEMPTION REQUESTS
// =============================================================================

/// Shared by add and cancel
#[derive(Accounts)]
pub struct UpdateRedemptionRequest<'info> {
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
        mut,
        seeds = [
            LenderState::SEED_PREFIX,
            pool_config.key().as_ref(),
            &[lender_state.tranche as u8],
            lender.key().as_ref()
        ],
        bump = lender_state.bump,
    )]
    pub lender_state: Account<'info, LenderState>,

    pub lender: Signer<'info>,
}

pub fn add_redemption_request<'info>(
    ctx: Context<'_, '_, 'info, 'info, UpdateRedemptionRequest<'info>>,
    shares: u64,
) -> Result<()> {
    let clock = Clock::get()?;

    require!(shares > 0, PoolError::ZeroAmount);

    let config = &ctx.accounts.pool_config;
    let state = &mut ctx.accounts.pool_state;
    let lender_state = &mut ctx.accounts.lender_state;

    require!(
        shares <= lender_state.shares,
        PoolError::InsufficientSharesForRequest
    );
    require!(
        lender_state.can_request_redemption(config.withdrawal_lockout_secs, clock.unix_timestamp),
        PoolError::WithdrawalTooEarly
    );

    reconcile_lender(ctx.program_id, state, lender_state, ctx.remaining_accounts)?;

    let epoch_id = state.current_epoch_id();
    let principal = lender_state.principal_for(shares);
    lender_state
        .redemption
        .add_request(shares, principal, epoch_id)?;
    let shares_before = lender_state.shares;
    lender_state.shares -= shares;
    lender_state.principal -= principal;
    state.sync_yield_lender(lender_state, shares_before);

    let tranche = lender_state.tranche;
    let summary = state.ledger_mut(tranche).current_redemption(epoch_id);
    summary.shares_requested = summary.shares_requested.saturating_add(shares);
    let epoch_shares_requested = summary.shares_requested;

    emit!(RedemptionRequestAdded {
        pool_config: state.pool_config,
        lender: lender_state.lender,
        tranche: tranche as u8,
        epoch_id,
        shares,
        principal,
        epoch_shares_requested,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

pub fn cancel_redemption_request<'info>(
    ctx: Context<'_, '_, 'info, 'info, UpdateRedemptionRequest<'info>>,
    shares: u64,
) -> Result<()> {
    let clock = Clock::get()?;

    require!(shares > 0, PoolError::ZeroAmount);

    let state = &mut ctx.accounts.pool_state;
    let lender_state = &mut ctx.accounts.lender_state;

    reconcile_lender(ctx.program_id, state, lender_state, ctx.remaining_accounts)?;

    let epoch_id = state.current_epoch_id();
    let principal = lender_state.redemption.cancel_request(shares, epoch_id)?;
    let shares_before = lender_state.shares;
    lender_state.shares = lender_state.shares.saturating_add(shares);
    lender_state.principal = lender_state.principal.saturating_add(principal);
    state.sync_yield_lender(lender_state, shares_before);

    let tranche = lender_state.tranche;
    let summary = state.ledger_mut(tranche).current_redemption(epoch_id);
    summary.shares_requested = summary.shares_requested.saturating_sub(shares);
    let epoch_shares_requested = summary.shares_requested;

    emit!(RedemptionRequestCancelled {
        pool_config: state.pool_config,
        lender: lender_state.lender,
        tranche: tranche as u8,
        epoch_id,
        shares,
        principal_restored: principal,
        epoch_shares_requested,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

// =============================================================================
// WITHDRAWABLE ASSETS
// =============================================================================

/// Permissionless: anyone may reconcile a lender's record
#[derive(Accounts)]
pub struct ReconcileLender<'info> {
    #[account(
        seeds = [PoolConfig::SEED_PREFIX, &pool_config.pool_id.to_le_bytes()],
        bump = pool_config.bump,
    )]
    pub pool_config: Account<'info, PoolConfig>,

    #[account(
        seeds = [PoolState::SEED_PREFIX, pool_config.key().as_ref()],
        bump = pool_state.bump,
    )]
    pub pool_state: Account<'info, PoolState>,

    #[account(
        mut,
        constraint = lender_state.pool_config == pool_config.key() @ PoolError::InvalidLenderAccount
    )]
    pub lender_state: Account<'info, LenderState>,
}

/// Processed redemption funds the lender can disburse right now
pub fn withdrawable_assets<'info>(
    ctx: Context<'_, '_, 'info, 'info, ReconcileLender<'info>>,
) -> Result<u64> {
    let lender_state = &mut ctx.accounts.lender_state;
    reconcile_lender(
        ctx.program_id,
        &ctx.accounts.pool_state,
        lender_state,
        ctx.remaining_accounts,
    )?;
    Ok(lender_state.withdrawable_assets())
}

// =============================================================================
// DISBURSE
// =============================================================================

#[derive(Accounts)]
pub struct Disburse<'info> {
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
        mut,
        seeds = [
            LenderState::SEED_PREFIX,
            pool_config.key().as_ref(),
            &[lender_state.tranche as u8],
            lender.key().as_ref()
        ],
        bump = lender_state.bump,
    )]
    pub lender_state: Account<'info, LenderState>,

    #[account(
        constraint = underlying_mint.key() == pool_config.underlying_mint @ PoolError::InvalidTokenAccount
    )]
    pub underlying_mint: InterfaceAccount<'info, MintInterface>,

    #[account(
        mut,
        constraint = lender_token_account.mint == pool_config.underlying_mint @ PoolError::InvalidTokenAccount,
        constraint = lender_token_account.owner == lender.key() @ PoolError::Unauthorized
    )]
    pub lender_token_account: InterfaceAccount<'info, TokenAccountInterface>,

    #[account(
        mut,
        constraint = pool_vault.key() == pool_config.pool_vault @ PoolError::InvalidTokenAccount
    )]
    pub pool_vault: InterfaceAccount<'info, TokenAccountInterface>,

    pub lender: Signer<'info>,

    pub token_program: Interface<'info, TokenInterface>,
}

pub fn disburse<'info>(ctx: Context<'_, '_, 'info, 'info, Disburse<'info>>) -> Result<()> {
    let clock = Clock::get()?;

    let state = &mut ctx.accounts.pool_state;
    let lender_state = &mut ctx.accounts.lender_state;

    reconcile_lender(ctx.program_id, state, lender_state, ctx.remaining_accounts)?;

    let amount = lender_state.redemption.mark_withdrawn();
    require!(amount > 0, PoolError::NothingToWithdraw);

    let tranche = lender_state.tranche;
    let ledger = state.ledger_mut(tranche);
    ledger.unwithdrawn_amount = ledger.unwithdrawn_amount.saturating_sub(amount);

    let pool_config_key = ctx.accounts.pool_config.key();
    let pool_state_bump = state.bump;
    transfer_from_vault(
        ctx.accounts.token_program.to_account_info(),
        ctx.accounts.pool_vault.to_account_info(),
        ctx.accounts.underlying_mint.to_account_info(),
        ctx.accounts.lender_token_account.to_account_info(),
        ctx.accounts.pool_state.to_account_info(),
        &pool_config_key,
        pool_state_bump,
        amount,
        ctx.accounts.underlying_mint.decimals,
    )?;

    emit!(LenderFundsDisbursed {
        pool_config: pool_config_key,
        lender: ctx.accounts.lender.key(),
        tranche: tranche as u8,
        amount,
        timestamp: clock.unix_timestamp,
    });

    msg!("Disbursed {} to {} lender", amount, tranche.name());

    Ok(())
}

// =============================================================================
// WITHDRAW AFTER POOL CLOSURE
// =============================================================================

/// Same accounts as `Disburse`; the pool must be closed
#[derive(Accounts)]
pub struct WithdrawAfterPoolClosure<'info> {
    #[account(
        seeds = [PoolConfig::SEED_PREFIX, &pool_config.pool_id.to_le_bytes()],
        bump = pool_config.bump,
    )]
    pub pool_config: Account<'info, PoolConfig>,

    #[account(
        mut,
        seeds = [PoolState::SEED_PREFIX, pool_config.key().as_ref()],
        bump = pool_state.bump,
        constraint = pool_state.status == PoolStatus::Closed @ PoolError::PoolNotClosed
    )]
    pub pool_state: Account<'info, PoolState>,

    #[account(
        mut,
        seeds = [
            LenderState::SEED_PREFIX,
            pool_config.key().as_ref(),
            &[lender_state.tranche as u8],
            lender.key().as_ref()
        ],
        bump = lender_state.bump,
    )]
    pub lender_state: Account<'info, LenderState>,

    #[account(
        constraint = underlying_mint.key() == pool_config.underlying_mint @ PoolError::InvalidTokenAccount
    )]
    pub underlying_mint: InterfaceAccount<'info, MintInterface>,

    #[account(
        mut,
        constraint = lender_token_account.mint == pool_config.underlying_mint @ PoolError::InvalidTokenAccount,
        constraint = lender_token_account.owner == lender.key() @ PoolError::Unauthorized
    )]
    pub lender_token_account: InterfaceAccount<'info, TokenAccountInterface>,

    #[account(
        mut,
        constraint = pool_vault.key() == pool_config.pool_vault @ PoolError::InvalidTokenAccount
    )]
    pub pool_vault: InterfaceAccount<'info, TokenAccountInterface>,

    pub lender: Signer<'info>,

    pub token_program: Interface<'info, TokenInterface>,
}

/// Redeem every remaining share at the current price and disburse any
/// processed redemptions in one transfer
pub fn withdraw_after_pool_closure<'info>(
    ctx: Context<'_, '_, 'info, 'info, WithdrawAfterPoolClosure<'info>>,
) -> Result<()> {
    let clock = Clock::get()?;

    let vault_balance = ctx.accounts.pool_vault.amount;
    let state = &mut ctx.accounts.pool_state;
    let lender_state = &mut ctx.accounts.lender_state;
    let tranche = lender_state.tranche;

    reconcile_lender(ctx.program_id, state, lender_state, ctx.remaining_accounts)?;

    let shares_before = lender_state.shares;

    // Requests the final epoch could not serve go back to the balance
    let epoch_id = state.current_epoch_id();
    let unserved = lender_state.redemption.shares_requested;
    if unserved > 0 {
        let principal = lender_state.redemption.cancel_request(unserved, epoch_id)?;
        lender_state.shares = lender_state.shares.saturating_add(unserved);
        lender_state.principal = lender_state.principal.saturating_add(principal);
        let summary = state.ledger_mut(tranche).current_redemption(epoch_id);
        summary.shares_requested = summary.shares_requested.saturating_sub(unserved);
    }

    let shares = lender_state.shares;
    let share_amount = state.convert_to_assets(tranche, shares);
    require!(
        share_amount <= state.available_liquidity(vault_balance),
        PoolError::InsufficientPoolLiquidity
    );

    let tranche_assets = state.tranche_assets.get_mut(tranche);
    *tranche_assets = tranche_assets.saturating_sub(share_amount);
    let ledger = state.ledger_mut(tranche);
    ledger.total_supply = ledger.total_supply.saturating_sub(shares);
    lender_state.shares = 0;
    lender_state.principal = 0;
    state.sync_yield_lender(lender_state, shares_before);

    let redeemed = lender_state.redemption.mark_withdrawn();
    let ledger = state.ledger_mut(tranche);
    ledger.unwithdrawn_amount = ledger.unwithdrawn_amount.saturating_sub(redeemed);

    let amount = share_amount.saturating_add(redeemed);
    require!(amount > 0, PoolError::NothingToWithdraw);

    let pool_config_key = ctx.accounts.pool_config.key();
    let pool_state_bump = state.bump;
    transfer_from_vault(
        ctx.accounts.token_program.to_account_info(),
        ctx.accounts.pool_vault.to_account_info(),
        ctx.accounts.underlying_mint.to_account_info(),
        ctx.accounts.lender_token_account.to_account_info(),
        ctx.accounts.pool_state.to_account_info(),
        &pool_config_key,
        pool_state_bump,
        amount,
        ctx.accounts.underlying_mint.decimals,
    )?;

    emit!(PoolClosureWithdrawal {
        pool_config: pool_config_key,
        lender: ctx.accounts.lender.key(),
        tranche: tranche as u8,
        shares_redeemed: shares,
        amount,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}
