// programs/tranche_pool/src/events.rs

use anchor_lang::prelude::*;

// ==================== POOL LIFECYCLE ====================

/// Emitted when a pool is created
#[event]
pub struct PoolInitialized {
    pub pool_config: Pubkey,
    pub pool_id: u64,
    pub authority: Pubkey,
    pub credit_authority: Pubkey,
    pub underlying_mint: Pubkey,
    pub max_senior_junior_ratio: u8,
    pub cover_count: u8,
    pub timestamp: i64,
}

/// Emitted when the pool opens for deposits
#[event]
pub struct PoolEnabled {
    pub pool_config: Pubkey,
    pub junior_total_assets: u64,
    pub cover_total_assets: u64,
    pub first_epoch_end: i64,
    pub timestamp: i64,
}

/// Emitted when the pool is permanently closed
#[event]
pub struct PoolClosed {
    pub pool_config: Pubkey,
    pub final_epoch_id: u64,
    pub senior_amount_processed: u64,
    pub junior_amount_processed: u64,
    pub senior_total_assets: u64,
    pub junior_total_assets: u64,
    pub timestamp: i64,
}

/// Emitted when a cover provider adds assets to a first-loss cover
#[event]
pub struct CoverDeposited {
    pub pool_config: Pubkey,
    pub cover_index: u8,
    pub provider: Pubkey,
    pub amount: u64,
    pub cover_total_assets: u64,
    pub timestamp: i64,
}

// ==================== LENDERS ====================

#[event]
pub struct LenderRegistered {
    pub pool_config: Pubkey,
    pub lender: Pubkey,
    pub tranche: u8,
    pub reinvest_yield: bool,
    pub timestamp: i64,
}

#[event]
pub struct LiquidityDeposited {
    pub pool_config: Pubkey,
    pub lender: Pubkey,
    pub tranche: u8,
    pub amount: u64,
    pub shares: u64,
    pub tranche_assets_before: u64,
    pub tranche_assets_after: u64,
    pub timestamp: i64,
}

#[event]
pub struct RedemptionRequestAdded {
    pub pool_config: Pubkey,
    pub lender: Pubkey,
    pub tranche: u8,
    pub epoch_id: u64,
    pub shares: u64,
    pub principal: u64,
    pub epoch_shares_requested: u64,
    pub timestamp: i64,
}

#[event]
pub struct RedemptionRequestCancelled {
    pub pool_config: Pubkey,
    pub lender: Pubkey,
    pub tranche: u8,
    pub epoch_id: u64,
    pub shares: u64,
    pub principal_restored: u64,
    pub epoch_shares_requested: u64,
    pub timestamp: i64,
}

/// Emitted when a lender's record is replayed against closed epochs
#[event]
pub struct RedemptionRecordReconciled {
    pub lender: Pubkey,
    pub tranche: u8,
    pub from_epoch_id: u64,
    pub to_epoch_id: u64,
    pub shares_processed: u64,
    pub amount_processed: u64,
}

#[event]
pub struct LenderFundsDisbursed {
    pub pool_config: Pubkey,
    pub lender: Pubkey,
    pub tranche: u8,
    pub amount: u64,
    pub timestamp: i64,
}

#[event]
pub struct YieldPaidOut {
    pub pool_config: Pubkey,
    pub lender: Pubkey,
    pub tranche: u8,
    pub amount: u64,
    pub shares_burned: u64,
    pub timestamp: i64,
}

#[event]
pub struct LenderYieldProcessed {
    pub pool_config: Pubkey,
    pub tranche: u8,
    pub lenders_processed: u32,
    /// Counted lenders still waiting on the latest profit
    pub lenders_outstanding: u32,
    pub total_paid: u64,
    pub timestamp: i64,
}

#[event]
pub struct PoolClosureWithdrawal {
    pub pool_config: Pubkey,
    pub lender: Pubkey,
    pub tranche: u8,
    pub shares_redeemed: u64,
    pub amount: u64,
    pub timestamp: i64,
}

// ==================== WATERFALL ====================

#[event]
pub struct ProfitDistributed {
    pub pool_config: Pubkey,
    pub profit: u64,
    pub senior_profit: u64,
    pub junior_profit: u64,
    pub cover_profits: Vec<u64>,
    pub senior_assets_before: u64,
    pub junior_assets_before: u64,
    pub senior_assets_after: u64,
    pub junior_assets_after: u64,
    pub timestamp: i64,
}

#[event]
pub struct LossDistributed {
    pub pool_config: Pubkey,
    pub loss: u64,
    pub senior_loss: u64,
    pub junior_loss: u64,
    pub cover_losses: Vec<u64>,
    /// Loss beyond every cover and tranche
    pub uncovered_loss: u64,
    pub senior_assets_before: u64,
    pub junior_assets_before: u64,
    pub senior_assets_after: u64,
    pub junior_assets_after: u64,
    pub timestamp: i64,
}

#[event]
pub struct LossRecoveryDistributed {
    pub pool_config: Pubkey,
    pub recovery: u64,
    pub senior_recovery: u64,
    pub junior_recovery: u64,
    pub cover_recoveries: Vec<u64>,
    /// Recovery beyond every recorded loss, left unapplied
    pub unapplied: u64,
    pub senior_assets_before: u64,
    pub junior_assets_before: u64,
    pub senior_assets_after: u64,
    pub junior_assets_after: u64,
    pub timestamp: i64,
}

// ==================== EPOCHS ====================

#[event]
pub struct EpochProcessed {
    pub pool_config: Pubkey,
    pub epoch_id: u64,
    pub senior_shares_requested: u64,
    pub senior_shares_processed: u64,
    pub senior_amount_processed: u64,
    pub junior_shares_requested: u64,
    pub junior_shares_processed: u64,
    pub junior_amount_processed: u64,
    pub senior_assets_after: u64,
    pub junior_assets_after: u64,
    pub timestamp: i64,
}

#[event]
pub struct NewEpochStarted {
    pub pool_config: Pubkey,
    pub epoch_id: u64,
    pub end_time: i64,
}
