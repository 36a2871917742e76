// programs/tranche_pool/src/instructions/mod.rs

pub mod initialize;
pub mod lender;
pub mod credit;
pub mod settlement;

pub use initialize::*;
pub use lender::*;
pub use credit::*;
pub use settlement::*;

use anchor_lang::prelude::*;
use credit_core::token_utils;

use crate::errors::PoolError;
use crate::events::RedemptionRecordReconciled;
use crate::redemption::{replay_epochs, EpochSlot, ReplayReport};
use crate::state::{EpochRedemptionSummary, LenderState, PoolState, Tranche};

// =============================================================================
// VAULT TRANSFERS
// =============================================================================

/// Pay out of the pool vault, signed by the pool state PDA
#[allow(clippy::too_many_arguments)]
pub(crate) fn transfer_from_vault<'info>(
    token_program: AccountInfo<'info>,
    pool_vault: AccountInfo<'info>,
    mint: AccountInfo<'info>,
    destination: AccountInfo<'info>,
    pool_state: AccountInfo<'info>,
    pool_config: &Pubkey,
    pool_state_bump: u8,
    amount: u64,
    decimals: u8,
) -> Result<()> {
    let bump = [pool_state_bump];
    let pool_seeds: &[&[u8]] = &[PoolState::SEED_PREFIX, pool_config.as_ref(), &bump];
    let signer_seeds = &[pool_seeds];

    token_utils::transfer_checked(
        token_program,
        pool_vault,
        mint,
        destination,
        pool_state,
        signer_seeds,
        amount,
        decimals,
    )
}

// =============================================================================
// REDEMPTION RECONCILIATION
// =============================================================================

pub(crate) fn epoch_summary_address(
    program_id: &Pubkey,
    pool_config: &Pubkey,
    tranche: Tranche,
    epoch_id: u64,
) -> Pubkey {
    let (address, _) = Pubkey::find_program_address(
        &[
            EpochRedemptionSummary::SEED_PREFIX,
            pool_config.as_ref(),
            &[tranche as u8],
            &epoch_id.to_le_bytes(),
        ],
        program_id,
    );
    address
}

/// Read one closed epoch's summary. The account must sit at the epoch's PDA;
/// an address nobody initialized proves the tranche had no demand that epoch.
pub(crate) fn load_epoch_slot<'info>(
    program_id: &Pubkey,
    pool_config: &Pubkey,
    tranche: Tranche,
    epoch_id: u64,
    info: &'info AccountInfo<'info>,
) -> Result<EpochSlot> {
    let expected = epoch_summary_address(program_id, pool_config, tranche, epoch_id);
    require_keys_eq!(info.key(), expected, PoolError::RedemptionSummaryMismatch);

    if info.owner != program_id || info.data_is_empty() {
        return Ok(EpochSlot {
            epoch_id,
            summary: None,
        });
    }

    let account: Account<'info, EpochRedemptionSummary> = Account::try_from(info)?;
    require_keys_eq!(account.pool_config, *pool_config, PoolError::RedemptionSummaryMismatch);
    require!(account.tranche == tranche, PoolError::RedemptionSummaryMismatch);

    Ok(EpochSlot {
        epoch_id,
        summary: Some(account.summary),
    })
}

/// Bring a lender's redemption record up to the current epoch using the
/// summary accounts passed in `remaining_accounts`, oldest epoch first.
/// Passing fewer accounts than needed leaves the record partly replayed.
pub(crate) fn reconcile_lender<'info>(
    program_id: &Pubkey,
    pool_state: &PoolState,
    lender_state: &mut LenderState,
    summary_accounts: &'info [AccountInfo<'info>],
) -> Result<ReplayReport> {
    let current_epoch_id = pool_state.current_epoch_id();
    let tranche = lender_state.tranche;
    let start = lender_state.redemption.last_updated_epoch_id;

    let mut slots = Vec::with_capacity(summary_accounts.len());
    for (offset, info) in summary_accounts.iter().enumerate() {
        let epoch_id = start + offset as u64;
        if epoch_id >= current_epoch_id {
            break;
        }
        slots.push(load_epoch_slot(
            program_id,
            &pool_state.pool_config,
            tranche,
            epoch_id,
            info,
        )?);
    }

    let report = replay_epochs(&mut lender_state.redemption, current_epoch_id, slots)?;

    if report.to_epoch_id != report.from_epoch_id {
        msg!(
            "Reconciled {} lender {} through epoch {}: {} shares, {} processed",
            tranche.name(),
            lender_state.lender,
            report.to_epoch_id,
            report.shares_processed,
            report.amount_processed
        );
        emit!(RedemptionRecordReconciled {
            lender: lender_state.lender,
            tranche: tranche as u8,
            from_epoch_id: report.from_epoch_id,
            to_epoch_id: report.to_epoch_id,
            shares_processed: report.shares_processed,
            amount_processed: report.amount_processed,
        });
    }

    Ok(report)
}
