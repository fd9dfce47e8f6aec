//! Static size-model fee estimation.
//!
//! This is a heuristic, not a fee-market query. Callers that need
//! market-accurate fees should pass a different rate.

use crate::config::DEFAULT_FEE_RATE_SAT_PER_BYTE;

/// Version + locktime + input/output counts.
pub const TX_OVERHEAD_BYTES: u64 = 10;
/// Typical legacy P2PKH input.
pub const INPUT_BYTES: u64 = 148;
/// Typical P2PKH output.
pub const OUTPUT_BYTES: u64 = 34;

pub fn estimated_size(input_count: usize, output_count: usize) -> u64 {
    TX_OVERHEAD_BYTES
        .saturating_add(INPUT_BYTES.saturating_mul(input_count as u64))
        .saturating_add(OUTPUT_BYTES.saturating_mul(output_count as u64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimator {
    fee_rate_sat_per_byte: u64,
}

impl Default for FeeEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_FEE_RATE_SAT_PER_BYTE)
    }
}

impl FeeEstimator {
    pub fn new(fee_rate_sat_per_byte: u64) -> Self {
        Self {
            fee_rate_sat_per_byte,
        }
    }

    pub fn estimate_fee(&self, input_count: usize, output_count: usize) -> u64 {
        estimated_size(input_count, output_count).saturating_mul(self.fee_rate_sat_per_byte)
    }
}
