// programs/credit_core/src/lib.rs
//
// Credit Core - Shared Constants, Calendar and Token-2022 Utilities
// =================================================================
//
// This crate provides:
// - Protocol-wide constants (basis points, day counts)
// - Fixed-point helpers used by the waterfall and settlement math
// - The 30/360 calendar used for yield accrual and epoch boundaries
// - Token-2022 aware transfer helpers for the pool vault

use anchor_lang::prelude::*;

// =============================================================================
// SUBMODULES
// =============================================================================

/// 30/360 day counts and pay-period boundaries
pub mod calendar;

pub use calendar::{CalendarDate, PayPeriodDuration};

// =============================================================================
// PROTOCOL CONSTANTS
// =============================================================================

pub mod constants {
    /// Basis point denominator (100% = 10000 bps)
    pub const BPS_DENOMINATOR: u64 = 10_000;

    /// Days in a year under the 30/360 convention
    pub const DAYS_IN_A_YEAR: u64 = 360;

    /// Days in a month under the 30/360 convention
    pub const DAYS_IN_A_MONTH: u64 = 30;

    pub const SECONDS_PER_DAY: i64 = 86_400;

    /// Upper bound on first-loss covers per pool
    pub const MAX_COVERS: usize = 4;
}

// =============================================================================
// FIXED-POINT MATH
// =============================================================================

/// Integer helpers shared by every engine. All division floors and every
/// intermediate product is carried in u128 so no input combination overflows.
pub mod math {
    use super::constants::BPS_DENOMINATOR;

    /// `a * b / c`, floored. Division by zero yields zero; results beyond
    /// u64 saturate.
    pub fn mul_div(a: u64, b: u64, c: u64) -> u64 {
        if c == 0 {
            return 0;
        }
        let value = (a as u128) * (b as u128) / (c as u128);
        u64::try_from(value).unwrap_or(u64::MAX)
    }

    /// `a * b / c`, rounded up.
    pub fn mul_div_ceil(a: u64, b: u64, c: u64) -> u64 {
        if c == 0 {
            return 0;
        }
        let product = (a as u128) * (b as u128);
        let value = product / (c as u128) + u128::from(product % (c as u128) != 0);
        u64::try_from(value).unwrap_or(u64::MAX)
    }

    /// `amount * bps / 10000`, floored
    pub fn apply_bps(amount: u64, bps: u16) -> u64 {
        mul_div(amount, bps as u64, BPS_DENOMINATOR)
    }

    /// Ceiling division
    pub fn div_ceil(a: u64, b: u64) -> u64 {
        mul_div_ceil(a, 1, b)
    }
}

// =============================================================================
// TOKEN-2022 UTILITIES
// =============================================================================

pub mod token_utils {
    use super::*;
    use anchor_spl::token_interface::{self, TransferChecked};

    /// Move tokens with `transfer_checked` so Token-2022 mints work unchanged.
    /// When `signer_seeds` is empty the authority must be a transaction signer.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer_checked<'info>(
        token_program: AccountInfo<'info>,
        from: AccountInfo<'info>,
        mint: AccountInfo<'info>,
        to: AccountInfo<'info>,
        authority: AccountInfo<'info>,
        signer_seeds: &[&[&[u8]]],
        amount: u64,
        decimals: u8,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }

        let accounts = TransferChecked {
            from,
            mint,
            to,
            authority,
        };
        let cpi_ctx = if signer_seeds.is_empty() {
            CpiContext::new(token_program, accounts)
        } else {
            CpiContext::new_with_signer(token_program, accounts, signer_seeds)
        };

        token_interface::transfer_checked(cpi_ctx, amount, decimals)
    }

    /// Check that a token program id is either SPL Token or Token-2022
    pub fn is_supported_token_program(program_id: &Pubkey) -> bool {
        *program_id == anchor_spl::token::ID || *program_id == anchor_spl::token_2022::ID
    }
}
