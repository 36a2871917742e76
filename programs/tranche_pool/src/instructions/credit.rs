// programs/tranche_pool/src/instructions/credit.rs
//
// Credit Events
// =============
// The pool's credit authority reports profit, loss and loss recovery from
// the underlying credit book. Each report runs through the waterfall and
// only moves accounting balances; funds arrive in the vault separately.

use anchor_lang::prelude::*;

use crate::errors::PoolError;
use crate::events::{LossDistributed, LossRecoveryDistributed, ProfitDistributed};
use crate::state::{PoolConfig, PoolState, PoolStatus};
use crate::waterfall::{CreditCapability, WaterfallDistributor};

#[derive(Accounts)]
pub struct ReportCreditEvent<'info> {
    #[account(
        seeds = [PoolConfig::SEED_PREFIX, &pool_config.pool_id.to_le_bytes()],
        bump = pool_config.bump,
    )]
    pub pool_config: Account<'info, PoolConfig>,

    #[account(
        mut,
        seeds = [PoolState::SEED_PREFIX, pool_config.key().as_ref()],
        bump = pool_state.bump,
        constraint = pool_state.status != PoolStatus::Off @ PoolError::PoolNotOn
    )]
    pub pool_state: Account<'info, PoolState>,

    pub credit_authority: Signer<'info>,
}

// =============================================================================
// PROFIT
// =============================================================================

pub fn distribute_profit(ctx: Context<ReportCreditEvent>, profit: u64) -> Result<()> {
    let clock = Clock::get()?;
    let config = &ctx.accounts.pool_config;
    let capability = CreditCapability::authorize(&ctx.accounts.credit_authority.key(), config)?;

    let state = &mut ctx.accounts.pool_state;
    let mut waterfall = WaterfallDistributor::new(config.tranches_policy, state);
    let result = waterfall.distribute_profit(&capability, profit, clock.unix_timestamp);
    let pool_value = waterfall.total_value();

    if profit > 0 {
        state.start_profit_round(clock.unix_timestamp);
    }
    state.total_profit_distributed = state.total_profit_distributed.saturating_add(profit);

    msg!(
        "Profit {}: senior {}, junior {}, covers {:?}, pool value {}",
        profit,
        result.senior,
        result.junior,
        result.per_cover,
        pool_value
    );

    emit!(ProfitDistributed {
        pool_config: state.pool_config,
        profit,
        senior_profit: result.senior,
        junior_profit: result.junior,
        cover_profits: result.per_cover,
        senior_assets_before: result.before.senior_total_assets,
        junior_assets_before: result.before.junior_total_assets,
        senior_assets_after: result.after.senior_total_assets,
        junior_assets_after: result.after.junior_total_assets,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

// =============================================================================
// LOSS
// =============================================================================

pub fn distribute_loss(ctx: Context<ReportCreditEvent>, loss: u64) -> Result<()> {
    let clock = Clock::get()?;
    let config = &ctx.accounts.pool_config;
    let capability = CreditCapability::authorize(&ctx.accounts.credit_authority.key(), config)?;

    let state = &mut ctx.accounts.pool_state;
    let mut waterfall = WaterfallDistributor::new(config.tranches_policy, state);
    let result = waterfall.distribute_loss(&capability, loss, clock.unix_timestamp);
    let pool_value = waterfall.total_value();

    state.uncovered_loss = state.uncovered_loss.saturating_add(result.uncovered);
    state.total_loss_distributed = state.total_loss_distributed.saturating_add(loss);

    if result.uncovered > 0 {
        msg!("Loss exceeds pool capacity by {}", result.uncovered);
    }
    msg!("Loss {}: pool value now {}", loss, pool_value);

    emit!(LossDistributed {
        pool_config: state.pool_config,
        loss,
        senior_loss: result.senior,
        junior_loss: result.junior,
        cover_losses: result.per_cover,
        uncovered_loss: result.uncovered,
        senior_assets_before: result.before.senior_total_assets,
        junior_assets_before: result.before.junior_total_assets,
        senior_assets_after: result.after.senior_total_assets,
        junior_assets_after: result.after.junior_total_assets,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

// =============================================================================
// LOSS RECOVERY
// =============================================================================

pub fn distribute_loss_recovery(ctx: Context<ReportCreditEvent>, recovery: u64) -> Result<()> {
    let clock = Clock::get()?;
    let config = &ctx.accounts.pool_config;
    let capability = CreditCapability::authorize(&ctx.accounts.credit_authority.key(), config)?;

    let state = &mut ctx.accounts.pool_state;
    let result = WaterfallDistributor::new(config.tranches_policy, state)
        .distribute_loss_recovery(&capability, recovery, clock.unix_timestamp);

    let applied = recovery - result.unapplied;
    state.total_loss_recovered = state.total_loss_recovered.saturating_add(applied);

    emit!(LossRecoveryDistributed {
        pool_config: state.pool_config,
        recovery,
        senior_recovery: result.senior,
        junior_recovery: result.junior,
        cover_recoveries: result.per_cover,
        unapplied: result.unapplied,
        senior_assets_before: result.before.senior_total_assets,
        junior_assets_before: result.before.junior_total_assets,
        senior_assets_after: result.after.senior_total_assets,
        junior_assets_after: result.after.junior_total_assets,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}
