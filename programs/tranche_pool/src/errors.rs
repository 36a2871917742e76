// programs/tranche_pool/src/errors.rs

use anchor_lang::prelude::*;

#[error_code]
pub enum PoolError {
    #[msg("Unauthorized: caller lacks permission")]
    Unauthorized,

    #[msg("A first-loss cover is below its minimum liquidity")]
    InsufficientFirstLossCover,

    #[msg("Junior tranche liquidity is below the pool minimum")]
    InsufficientLiquidity,

    #[msg("Deposit would push senior assets beyond the senior:junior ratio")]
    RatioExceeded,

    #[msg("Profit has not been processed for non-reinvesting lenders")]
    UnprocessedProfitPending,

    #[msg("Cancellation exceeds the open epoch's unfulfilled shares")]
    InvalidCancellation,

    #[msg("Pool is not enabled")]
    PoolNotOn,

    #[msg("Pool is already enabled")]
    PoolAlreadyEnabled,

    #[msg("Pool is closed")]
    PoolClosed,

    #[msg("Pool is not closed")]
    PoolNotClosed,

    #[msg("Epoch not complete")]
    EpochNotComplete,

    #[msg("Amount must be greater than zero")]
    ZeroAmount,

    #[msg("Deposit amount is below the pool minimum")]
    DepositAmountTooLow,

    #[msg("Deposit would exceed the pool liquidity cap")]
    PoolLiquidityCapExceeded,

    #[msg("Insufficient shares for redemption request")]
    InsufficientSharesForRequest,

    #[msg("Withdrawal lockout period has not elapsed")]
    WithdrawalTooEarly,

    #[msg("Redemption record must be reconciled to the current epoch first")]
    RedemptionLedgerStale,

    #[msg("Redemption summary account does not match the expected epoch")]
    RedemptionSummaryMismatch,

    #[msg("Redemption summary account required for a tranche with demand")]
    MissingRedemptionSummary,

    #[msg("Every non-reinvesting lender must be passed, sorted by lender key")]
    LenderAccountsIncomplete,

    #[msg("Lender account does not belong to this pool tranche")]
    InvalidLenderAccount,

    #[msg("Invalid first-loss cover index")]
    InvalidCoverIndex,

    #[msg("Too many first-loss covers")]
    TooManyCovers,

    #[msg("Covers must be listed borrower first, then admin, then affiliate")]
    InvalidCoverOrder,

    #[msg("Deposit would exceed the cover's asset cap")]
    CoverCapExceeded,

    #[msg("Invalid basis points value (must be <= 10000)")]
    InvalidBasisPoints,

    #[msg("Invalid token account")]
    InvalidTokenAccount,

    #[msg("Unsupported token program")]
    UnsupportedTokenProgram,

    #[msg("Tranche has outstanding shares but no assets")]
    TrancheAssetsDepleted,

    #[msg("Insufficient pool liquidity for withdrawal")]
    InsufficientPoolLiquidity,

    #[msg("Nothing to withdraw")]
    NothingToWithdraw,
}
