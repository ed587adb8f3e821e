//! Gas fee calculation utilities
//!
//! Effective gas price and total fee for legacy and EIP-1559 transactions.

use crate::types::{BlockRecord, Receipt, Transaction};
use alloy_primitives::U256;
use anyhow::{Context, Result};

/// Calculate the effective gas price for a transaction.
///
/// Priority order:
/// 1. `effective_gas_price` from the receipt (post-London)
/// 2. `gas_price` as reported by the node
/// 3. EIP-1559: `min(max_fee, base_fee + max_priority_fee)`
pub fn calculate_effective_gas_price(
    tx: &Transaction,
    receipt: &Receipt,
    block: &BlockRecord,
) -> Result<U256> {
    if let Some(egp) = receipt.effective_gas_price {
        return Ok(egp);
    }

    if let Some(gas_price) = tx.gas_price {
        return Ok(gas_price);
    }

    if tx.is_eip1559() {
        let base_fee = block
            .base_fee_per_gas
            .context("EIP-1559 transaction but block missing base_fee_per_gas")?;
        let max_fee = tx
            .max_fee_per_gas
            .context("EIP-1559 transaction missing max_fee_per_gas")?;
        let max_priority_fee = tx.max_priority_fee_per_gas.unwrap_or(U256::ZERO);

        return Ok(base_fee.saturating_add(max_priority_fee).min(max_fee));
    }

    anyhow::bail!("Transaction {:?} carries no gas price", tx.hash);
}

/// Fee = gas_used * effective_gas_price
pub fn calculate_fee(gas_used: U256, effective_gas_price: U256) -> U256 {
    gas_used.saturating_mul(effective_gas_price)
}
