//! Contract ABI support on top of `alloy-json-abi` and `alloy-dyn-abi`,
//! exposed through the [`ContractInterface`] capability used to decode
//! calls and logs.
//!
//! The rest of the crate works in `ethereum-types`; the conversions at
//! the bottom of this module are the only place the two meet.

pub mod interface;

use alloy_dyn_abi::{DynSolType, DynSolValue, JsonAbiExt};
use alloy_json_abi::Function;
use bytes::Bytes;
use ethereum_types::{Address, H256, U256};

use crate::error::AbiError;

pub use interface::{
    Abi, ContractInterface, Decoded, DecodedCall, DecodedEvent, MethodDescriptor, ParamDescriptor,
};

/// First four bytes of the keccak hash of a canonical signature.
pub fn selector(canonical: &str) -> [u8; 4] {
    let hash = alloy_primitives::keccak256(canonical.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic of an event with the given canonical signature.
pub fn event_topic(canonical: &str) -> H256 {
    H256(alloy_primitives::keccak256(canonical.as_bytes()).0)
}

/// Selector-prefixed calldata for `signature` (e.g. `"balanceOf(address)"`).
pub fn encode_call(signature: &str, args: &[DynSolValue]) -> Result<Bytes, AbiError> {
    let function = Function::parse(signature).map_err(|e| AbiError::InvalidSignature {
        signature: signature.to_string(),
        cause: e.to_string(),
    })?;
    let data = function
        .abi_encode_input(args)
        .map_err(|e| AbiError::Encode {
            signature: signature.to_string(),
            cause: e.to_string(),
        })?;
    Ok(Bytes::from(data))
}

/// Decode a single `uint256` return value.
pub fn decode_uint(output: &[u8]) -> Result<U256, AbiError> {
    match DynSolType::Uint(256).abi_decode(output) {
        Ok(DynSolValue::Uint(value, _)) => Ok(u256(value)),
        Ok(other) => Err(AbiError::Decode {
            what: "uint256 output".to_string(),
            cause: format!("got {other:?}"),
        }),
        Err(e) => Err(AbiError::Decode {
            what: "uint256 output".to_string(),
            cause: e.to_string(),
        }),
    }
}

pub fn u256(value: alloy_primitives::U256) -> U256 {
    U256::from_big_endian(&value.to_be_bytes::<32>())
}

pub fn sol_address(address: Address) -> DynSolValue {
    DynSolValue::Address(alloy_primitives::Address::from_slice(address.as_bytes()))
}

pub fn sol_uint(value: U256) -> DynSolValue {
    DynSolValue::Uint(
        alloy_primitives::U256::from_be_bytes(value.to_big_endian()),
        256,
    )
}
