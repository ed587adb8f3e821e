//! ERC20 / ERC721 transfer call decoder
//!
//! Recognizes `transfer(address,uint256)` and
//! `transferFrom(address,address,uint256)` in raw transaction input and
//! extracts the token amount plus any explicit sender/receiver.
//! Amounts are raw big-endian integers; decimal scaling happens at display time.

use alloy_primitives::{Address, U256};
use tracing::debug;

/// bytes4(keccak256("transfer(address,uint256)"))
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// bytes4(keccak256("transferFrom(address,address,uint256)"))
pub const TRANSFER_FROM_SELECTOR: [u8; 4] = [0x23, 0xb8, 0x72, 0xdd];

/// ABI word size
const WORD: usize = 32;

/// Which transfer method a payload invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMethod {
    Transfer,
    TransferFrom,
}

/// A decoded token transfer call.
///
/// `sender` and `receiver` are only set when the call names them explicitly
/// (`transferFrom`); otherwise the transaction's own from/to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    pub method: TransferMethod,
    pub amount: U256,
    pub sender: Option<Address>,
    pub receiver: Option<Address>,
}

/// Decode a transfer call from transaction input.
///
/// Returns `None` for anything that is not a well-formed transfer call,
/// including payloads that match a selector but are too short for its arguments.
pub fn decode_transfer(input: &[u8]) -> Option<TokenTransfer> {
    if input.len() <= 4 {
        return None;
    }

    let selector = &input[..4];
    if selector == TRANSFER_SELECTOR {
        let amount = word_at(input, 4 + WORD).map(U256::from_be_slice);
        match amount {
            Some(amount) => Some(TokenTransfer {
                method: TransferMethod::Transfer,
                amount,
                sender: None,
                receiver: None,
            }),
            None => {
                debug!(len = input.len(), "Truncated transfer() payload, ignoring");
                None
            }
        }
    } else if selector == TRANSFER_FROM_SELECTOR {
        let parsed = word_at(input, 4)
            .zip(word_at(input, 4 + WORD))
            .zip(word_at(input, 4 + 2 * WORD));
        match parsed {
            Some(((from, to), amount)) => Some(TokenTransfer {
                method: TransferMethod::TransferFrom,
                amount: U256::from_be_slice(amount),
                sender: Some(address_from_word(from)),
                receiver: Some(address_from_word(to)),
            }),
            None => {
                debug!(len = input.len(), "Truncated transferFrom() payload, ignoring");
                None
            }
        }
    } else {
        None
    }
}

/// The 32-byte ABI word starting at `offset`, if present.
fn word_at(input: &[u8], offset: usize) -> Option<&[u8]> {
    input.get(offset..offset + WORD)
}

/// An address is the low 20 bytes of its ABI word.
fn address_from_word(word: &[u8]) -> Address {
    Address::from_slice(&word[WORD - 20..])
}
