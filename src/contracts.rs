//! Contract Bindings
//!
//! ABI bindings for the contracts the relay encodes calls for. Only the
//! allowance approval is encoded here; business calldata (book, complete,
//! register event type) arrives pre-encoded from the view process.

use crate::CallDescriptor;
use ethers::abi::AbiEncode;
use ethers::contract::abigen;
use ethers::types::{Address, U256};

abigen!(
    Erc20,
    r#"[function approve(address spender, uint256 amount) external returns (bool)]"#
);

/// Build the ERC-20 `approve(spender, amount)` call on `token`
///
/// Carries an explicit zero value so wallets do not prompt for a native
/// transfer.
pub fn approve_call(token: Address, spender: Address, amount: U256) -> CallDescriptor {
    let data = ApproveCall { spender, amount }.encode();
    CallDescriptor::new(token, data.into()).with_value(U256::zero())
}
