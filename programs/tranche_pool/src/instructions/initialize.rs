// programs/tranche_pool/src/instructions/initialize.rs
//
// Pool Setup
// ==========
// Creates the pool config, pool state and vault, funds first-loss covers,
// and opens the first epoch once covers and junior capital are in place.

use anchor_lang::prelude::*;
use anchor_spl::token_interface::{
    Mint as MintInterface, TokenAccount as TokenAccountInterface, TokenInterface,
};
use credit_core::calendar::start_of_next_period;
use credit_core::constants::{BPS_DENOMINATOR, MAX_COVERS};
use credit_core::token_utils;

use crate::epoch::CurrentEpoch;
use crate::errors::PoolError;
use crate::events::{CoverDeposited, PoolEnabled, PoolInitialized};
use crate::first_loss::{CoverKind, FirstLossCover};
use crate::policy::{SeniorYieldTracker, TranchesPolicy};
use crate::state::{
    PayPeriodDuration, PoolConfig, PoolState, PoolStatus, Tranche, TrancheAssets, TrancheLedger,
    TrancheLosses,
};

// =============================================================================
// INITIALIZE POOL
// =============================================================================

#[derive(Accounts)]
#[instruction(params: InitializePoolParams)]
pub struct InitializePool<'info> {
    #[account(
        init,
        payer = authority,
        space = 8 + PoolConfig::INIT_SPACE,
        seeds = [PoolConfig::SEED_PREFIX, &params.pool_id.to_le_bytes()],
        bump
    )]
    pub pool_config: Account<'info, PoolConfig>,

    #[account(
        init,
        payer = authority,
        space = 8 + PoolState::INIT_SPACE,
        seeds = [PoolState::SEED_PREFIX, pool_config.key().as_ref()],
        bump
    )]
    pub pool_state: Account<'info, PoolState>,

    pub underlying_mint: InterfaceAccount<'info, MintInterface>,

    /// Holds lender capital, cover capital and processed redemptions
    #[account(
        init,
        payer = authority,
        token::mint = underlying_mint,
        token::authority = pool_state,
        token::token_program = token_program,
        seeds = [PoolState::VAULT_SEED_PREFIX, pool_config.key().as_ref()],
        bump
    )]
    pub pool_vault: InterfaceAccount<'info, TokenAccountInterface>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,

    pub token_program: Interface<'info, TokenInterface>,

    pub rent: Sysvar<'info, Rent>,
}

/// One first-loss cover. Covers are listed in priority order.
#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct CoverParams {
    pub kind: CoverKind,
    pub provider: Pubkey,
    pub cover_cap_per_loss: u64,
    pub cover_rate_per_loss_bps: u16,
    pub risk_yield_multiplier_bps: u16,
    pub min_liquidity: Option<u64>,
}

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct InitializePoolParams {
    pub pool_id: u64,
    pub credit_authority: Pubkey,
    pub tranches_policy: TranchesPolicy,
    pub covers: Vec<CoverParams>,
    pub max_senior_junior_ratio: Option<u8>,
    pub pay_period_duration: Option<PayPeriodDuration>,
    pub liquidity_cap: Option<u64>,
    pub min_deposit_amount: Option<u64>,
    pub withdrawal_lockout_secs: Option<i64>,
    pub min_junior_liquidity: Option<u64>,
}

fn build_covers(params: &[CoverParams]) -> Result<Vec<FirstLossCover>> {
    require!(params.len() <= MAX_COVERS, PoolError::TooManyCovers);

    let mut covers = Vec::with_capacity(params.len());
    let mut previous_kind = CoverKind::Borrower;
    for cover in params {
        require!(
            cover.kind as u8 >= previous_kind as u8,
            PoolError::InvalidCoverOrder
        );
        require!(
            (cover.cover_rate_per_loss_bps as u64) <= BPS_DENOMINATOR,
            PoolError::InvalidBasisPoints
        );
        previous_kind = cover.kind;

        covers.push(FirstLossCover {
            kind: cover.kind,
            provider: cover.provider,
            total_assets: 0,
            cover_cap_per_loss: cover.cover_cap_per_loss,
            cover_rate_per_loss_bps: cover.cover_rate_per_loss_bps,
            risk_yield_multiplier_bps: cover.risk_yield_multiplier_bps,
            covered_loss: 0,
            min_liquidity: cover.min_liquidity.unwrap_or(0),
        });
    }
    Ok(covers)
}

pub fn handler(ctx: Context<InitializePool>, params: InitializePoolParams) -> Result<()> {
    let clock = Clock::get()?;

    require!(
        token_utils::is_supported_token_program(&ctx.accounts.token_program.key()),
        PoolError::UnsupportedTokenProgram
    );
    require!(params.tranches_policy.is_valid(), PoolError::InvalidBasisPoints);
    let covers = build_covers(&params.covers)?;

    let pool_config_key = ctx.accounts.pool_config.key();

    let config = &mut ctx.accounts.pool_config;
    config.pool_id = params.pool_id;
    config.authority = ctx.accounts.authority.key();
    config.credit_authority = params.credit_authority;
    config.underlying_mint = ctx.accounts.underlying_mint.key();
    config.pool_vault = ctx.accounts.pool_vault.key();
    config.tranches_policy = params.tranches_policy;
    config.max_senior_junior_ratio = params
        .max_senior_junior_ratio
        .unwrap_or(PoolConfig::DEFAULT_MAX_SENIOR_JUNIOR_RATIO);
    config.pay_period_duration = params.pay_period_duration.unwrap_or_default();
    config.liquidity_cap = params.liquidity_cap.unwrap_or(PoolConfig::DEFAULT_LIQUIDITY_CAP);
    config.min_deposit_amount = params
        .min_deposit_amount
        .unwrap_or(PoolConfig::DEFAULT_MIN_DEPOSIT_AMOUNT);
    config.withdrawal_lockout_secs = params
        .withdrawal_lockout_secs
        .unwrap_or(PoolConfig::DEFAULT_WITHDRAWAL_LOCKOUT_SECS);
    config.min_junior_liquidity = params
        .min_junior_liquidity
        .unwrap_or(PoolConfig::DEFAULT_MIN_JUNIOR_LIQUIDITY);
    config.created_at = clock.unix_timestamp;
    config.bump = ctx.bumps.pool_config;

    let cover_count = covers.len() as u8;

    let state = &mut ctx.accounts.pool_state;
    state.pool_config = pool_config_key;
    state.status = PoolStatus::Off;
    state.tranche_assets = TrancheAssets::default();
    state.tranche_losses = TrancheLosses::default();
    state.covers = covers;
    state.senior_yield_tracker = SeniorYieldTracker {
        total_assets: 0,
        last_updated_date: clock.unix_timestamp,
        unpaid_yield: 0,
    };
    state.tranches = [TrancheLedger::default(); 2];
    // Epoch 0 is a placeholder until the pool is enabled
    state.current_epoch = CurrentEpoch::default();
    state.last_profit_at = 0;
    state.profit_round = 0;
    state.uncovered_loss = 0;
    state.total_profit_distributed = 0;
    state.total_loss_distributed = 0;
    state.total_loss_recovered = 0;
    state.bump = ctx.bumps.pool_state;

    emit!(PoolInitialized {
        pool_config: pool_config_key,
        pool_id: config.pool_id,
        authority: config.authority,
        credit_authority: config.credit_authority,
        underlying_mint: config.underlying_mint,
        max_senior_junior_ratio: config.max_senior_junior_ratio,
        cover_count,
        timestamp: clock.unix_timestamp,
    });

    msg!("Tranche pool {} initialized", config.pool_id);
    msg!("Senior:junior ratio cap: {}", config.max_senior_junior_ratio);
    msg!("Pay period: {}", config.pay_period_duration.name());

    Ok(())
}

// =============================================================================
// DEPOSIT FIRST-LOSS COVER
// =============================================================================

#[derive(Accounts)]
pub struct DepositCover<'info> {
    #[account(
        seeds = [PoolConfig::SEED_PREFIX, &pool_config.pool_id.to_le_bytes()],
        bump = pool_config.bump,
    )]
    pub pool_config: Account<'info, PoolConfig>,

    #[account(
        mut,
        seeds = [PoolState::SEED_PREFIX, pool_config.key().as_ref()],
        bump = pool_state.bump,
        constraint = pool_state.status != PoolStatus::Closed @ PoolError::PoolClosed
    )]
    pub pool_state: Account<'info, PoolState>,

    #[account(
        constraint = underlying_mint.key() == pool_config.underlying_mint @ PoolError::InvalidTokenAccount
    )]
    pub underlying_mint: InterfaceAccount<'info, MintInterface>,

    #[account(
        mut,
        constraint = provider_token_account.mint == pool_config.underlying_mint @ PoolError::InvalidTokenAccount,
        constraint = provider_token_account.owner == provider.key() @ PoolError::Unauthorized
    )]
    pub provider_token_account: InterfaceAccount<'info, TokenAccountInterface>,

    #[account(
        mut,
        constraint = pool_vault.key() == pool_config.pool_vault @ PoolError::InvalidTokenAccount
    )]
    pub pool_vault: InterfaceAccount<'info, TokenAccountInterface>,

    pub provider: Signer<'info>,

    pub token_program: Interface<'info, TokenInterface>,
}

pub fn deposit_cover(ctx: Context<DepositCover>, cover_index: u8, amount: u64) -> Result<()> {
    let clock = Clock::get()?;

    require!(amount > 0, PoolError::ZeroAmount);

    let index = cover_index as usize;
    let cover = ctx
        .accounts
        .pool_state
        .covers
        .get(index)
        .ok_or(PoolError::InvalidCoverIndex)?;
    require_keys_eq!(
        cover.provider,
        ctx.accounts.provider.key(),
        PoolError::Unauthorized
    );
    require!(
        cover.total_assets.saturating_add(amount) <= cover.cover_cap_per_loss,
        PoolError::CoverCapExceeded
    );

    token_utils::transfer_checked(
        ctx.accounts.token_program.to_account_info(),
        ctx.accounts.provider_token_account.to_account_info(),
        ctx.accounts.underlying_mint.to_account_info(),
        ctx.accounts.pool_vault.to_account_info(),
        ctx.accounts.provider.to_account_info(),
        &[],
        amount,
        ctx.accounts.underlying_mint.decimals,
    )?;

    let state = &mut ctx.accounts.pool_state;
    let cover = &mut state.covers[index];
    cover.total_assets = cover.total_assets.saturating_add(amount);
    let cover_total_assets = cover.total_assets;

    emit!(CoverDeposited {
        pool_config: state.pool_config,
        cover_index,
        provider: ctx.accounts.provider.key(),
        amount,
        cover_total_assets,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

// =============================================================================
// ENABLE POOL
// =============================================================================

#[derive(Accounts)]
pub struct EnablePool<'info> {
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
    )]
    pub pool_state: Account<'info, PoolState>,

    pub authority: Signer<'info>,
}

pub fn enable_pool(ctx: Context<EnablePool>) -> Result<()> {
    let clock = Clock::get()?;
    let config = &ctx.accounts.pool_config;
    let state = &mut ctx.accounts.pool_state;

    match state.status {
        PoolStatus::Off => {}
        PoolStatus::On => return err!(PoolError::PoolAlreadyEnabled),
        PoolStatus::Closed => return err!(PoolError::PoolClosed),
    }

    require!(
        state.covers.iter().all(FirstLossCover::meets_min_liquidity),
        PoolError::InsufficientFirstLossCover
    );
    require!(
        state.tranche_total_assets(Tranche::Junior) >= config.min_junior_liquidity,
        PoolError::InsufficientLiquidity
    );

    state.status = PoolStatus::On;
    state.current_epoch = CurrentEpoch {
        id: 1,
        end_time: start_of_next_period(config.pay_period_duration, clock.unix_timestamp),
    };
    let senior_assets = state.tranche_total_assets(Tranche::Senior);
    state
        .senior_yield_tracker
        .refresh(&config.tranches_policy, senior_assets, clock.unix_timestamp);

    emit!(PoolEnabled {
        pool_config: state.pool_config,
        junior_total_assets: state.tranche_total_assets(Tranche::Junior),
        cover_total_assets: state.cover_total_assets(),
        first_epoch_end: state.current_epoch.end_time,
        timestamp: clock.unix_timestamp,
    });

    msg!(
        "Pool enabled; epoch 1 ends at {}",
        state.current_epoch.end_time
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_cover_params(kind: CoverKind, rate_bps: u16) -> CoverParams {
        CoverParams {
            kind,
            provider: Pubkey::new_unique(),
            cover_cap_per_loss: 1_000_000,
            cover_rate_per_loss_bps: rate_bps,
            risk_yield_multiplier_bps: 10000,
            min_liquidity: None,
        }
    }

    #[test]
    fn test_build_covers_keeps_priority_order() {
        let covers = build_covers(&[
            create_test_cover_params(CoverKind::Borrower, 10000),
            create_test_cover_params(CoverKind::Admin, 5000),
            create_test_cover_params(CoverKind::Admin, 5000),
            create_test_cover_params(CoverKind::Affiliate, 2500),
        ])
        .unwrap();

        assert_eq!(covers.len(), 4);
        assert_eq!(covers[0].kind, CoverKind::Borrower);
        assert_eq!(covers[3].kind, CoverKind::Affiliate);
        assert!(covers.iter().all(|cover| cover.total_assets == 0));
        assert!(covers.iter().all(|cover| cover.min_liquidity == 0));
    }

    #[test]
    fn test_build_covers_rejects_out_of_order() {
        let result = build_covers(&[
            create_test_cover_params(CoverKind::Admin, 10000),
            create_test_cover_params(CoverKind::Borrower, 10000),
        ]);
        assert_eq!(result.unwrap_err(), PoolError::InvalidCoverOrder.into());
    }

    #[test]
    fn test_build_covers_rejects_bad_rate() {
        let result = build_covers(&[create_test_cover_params(CoverKind::Borrower, 10001)]);
        assert_eq!(result.unwrap_err(), PoolError::InvalidBasisPoints.into());
    }

    #[test]
    fn test_build_covers_limit() {
        let params: Vec<CoverParams> = (0..=MAX_COVERS)
            .map(|_| create_test_cover_params(CoverKind::Admin, 10000))
            .collect();
        assert_eq!(
            build_covers(&params).unwrap_err(),
            PoolError::TooManyCovers.into()
        );
    }
}
