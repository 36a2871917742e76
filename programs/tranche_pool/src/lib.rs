// programs/tranche_pool/src/lib.rs
//
// Tranche Pool Program
// ====================
// A structured-credit lending pool with two tranches of lender capital:
// - Senior: paid first on redemption, last to absorb loss
// - Junior: takes loss after the first-loss covers, earns the risk premium
//
// Features:
// - First-loss covers (borrower, admin, affiliate) in fixed priority order
// - Risk-adjusted or fixed senior yield profit split
// - Profit, loss and recovery waterfall driven by the credit authority
// - Epoch-based redemptions with a senior:junior ratio guard
// - Lazy per-lender redemption bookkeeping against epoch summaries

use anchor_lang::prelude::*;

pub mod state;
pub mod errors;
pub mod events;
pub mod instructions;
pub mod first_loss;
pub mod policy;
pub mod waterfall;
pub mod epoch;
pub mod redemption;

#[cfg(test)]
mod tests;

use instructions::*;
use state::Tranche;

declare_id!("8TrpZ3RkSqx5dJxWnVbLxGm2N4eCcVQ7uJhMwP9aFyDt");

#[program]
pub mod tranche_pool {
    use super::*;

    // ==================== POOL SETUP ====================

    /// Create the pool config, pool state and vault
    pub fn initialize_pool(ctx: Context<InitializePool>, params: InitializePoolParams) -> Result<()> {
        instructions::initialize::handler(ctx, params)
    }

    /// Fund a first-loss cover
    pub fn deposit_cover(ctx: Context<DepositCover>, cover_index: u8, amount: u64) -> Result<()> {
        instructions::initialize::deposit_cover(ctx, cover_index, amount)
    }

    /// Open the pool and its first epoch
    pub fn enable_pool(ctx: Context<EnablePool>) -> Result<()> {
        instructions::initialize::enable_pool(ctx)
    }

    // ==================== LENDERS ====================

    pub fn register_lender(
        ctx: Context<RegisterLender>,
        tranche: Tranche,
        reinvest_yield: bool,
    ) -> Result<()> {
        instructions::lender::register_lender(ctx, tranche, reinvest_yield)
    }

    pub fn deposit(ctx: Context<Deposit>, amount: u64) -> Result<()> {
        instructions::lender::deposit(ctx, amount)
    }

    /// Queue shares for redemption at the next epoch close
    pub fn add_redemption_request<'info>(
        ctx: Context<'_, '_, 'info, 'info, UpdateRedemptionRequest<'info>>,
        shares: u64,
    ) -> Result<()> {
        instructions::lender::add_redemption_request(ctx, shares)
    }

    /// Withdraw shares from the open epoch's queue
    pub fn cancel_redemption_request<'info>(
        ctx: Context<'_, '_, 'info, 'info, UpdateRedemptionRequest<'info>>,
        shares: u64,
    ) -> Result<()> {
        instructions::lender::cancel_redemption_request(ctx, shares)
    }

    /// Reconcile a lender's record and return what it can disburse
    pub fn withdrawable_assets<'info>(
        ctx: Context<'_, '_, 'info, 'info, ReconcileLender<'info>>,
    ) -> Result<u64> {
        instructions::lender::withdrawable_assets(ctx)
    }

    /// Pay out processed redemptions
    pub fn disburse<'info>(ctx: Context<'_, '_, 'info, 'info, Disburse<'info>>) -> Result<()> {
        instructions::lender::disburse(ctx)
    }

    pub fn withdraw_after_pool_closure<'info>(
        ctx: Context<'_, '_, 'info, 'info, WithdrawAfterPoolClosure<'info>>,
    ) -> Result<()> {
        instructions::lender::withdraw_after_pool_closure(ctx)
    }

    /// Pay cash yield to every non-reinvesting lender of a tranche
    pub fn process_yield_for_lenders<'info>(
        ctx: Context<'_, '_, 'info, 'info, ProcessYieldForLenders<'info>>,
        tranche: Tranche,
    ) -> Result<()> {
        instructions::settlement::process_yield_for_lenders(ctx, tranche)
    }

    // ==================== CREDIT EVENTS ====================

    pub fn distribute_profit(ctx: Context<ReportCreditEvent>, profit: u64) -> Result<()> {
        instructions::credit::distribute_profit(ctx, profit)
    }

    pub fn distribute_loss(ctx: Context<ReportCreditEvent>, loss: u64) -> Result<()> {
        instructions::credit::distribute_loss(ctx, loss)
    }

    pub fn distribute_loss_recovery(ctx: Context<ReportCreditEvent>, recovery: u64) -> Result<()> {
        instructions::credit::distribute_loss_recovery(ctx, recovery)
    }

    // ==================== EPOCHS ====================

    /// Settle redemptions for an epoch whose end time has passed
    pub fn close_epoch(ctx: Context<CloseEpoch>) -> Result<()> {
        instructions::settlement::close_epoch(ctx)
    }

    /// Final settlement; the pool stops taking deposits and requests
    pub fn close_pool(ctx: Context<ClosePool>) -> Result<()> {
        instructions::settlement::close_pool(ctx)
    }
}

/// Public helpers for clients and CPI callers
pub mod pool_helpers {
    use super::*;
    use crate::state::{LenderState, PoolConfig, PoolState};

    pub fn pool_config_address(pool_id: u64) -> Pubkey {
        Pubkey::find_program_address(&[PoolConfig::SEED_PREFIX, &pool_id.to_le_bytes()], &ID).0
    }

    pub fn pool_state_address(pool_config: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[PoolState::SEED_PREFIX, pool_config.as_ref()], &ID).0
    }

    pub fn pool_vault_address(pool_config: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[PoolState::VAULT_SEED_PREFIX, pool_config.as_ref()], &ID).0
    }

    pub fn lender_state_address(pool_config: &Pubkey, tranche: Tranche, lender: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[
                LenderState::SEED_PREFIX,
                pool_config.as_ref(),
                &[tranche as u8],
                lender.as_ref(),
            ],
            &ID,
        )
        .0
    }

    /// Summary accounts a lender must pass, oldest first, to reconcile from
    /// `from_epoch_id` up to (not including) `current_epoch_id`
    pub fn epoch_summary_addresses(
        pool_config: &Pubkey,
        tranche: Tranche,
        from_epoch_id: u64,
        current_epoch_id: u64,
    ) -> Vec<Pubkey> {
        (from_epoch_id..current_epoch_id)
            .map(|epoch_id| {
                instructions::epoch_summary_address(&ID, pool_config, tranche, epoch_id)
            })
            .collect()
    }
}
