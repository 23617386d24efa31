//! Wire-side data types exchanged with the RPC provider.

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};

/// An outgoing state-changing call as handed to `eth_sendTransaction`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
}

impl TransactionRequest {
    pub fn call(from: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from,
            to: Some(to),
            data: data.into(),
            value: U256::zero(),
        }
    }
}

/// A log emitted by a contract, as carried in a receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
}

/// Confirmation record of an included transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_hash: H256,
    pub block_number: u64,
    /// `true` when the transaction succeeded.
    pub status: bool,
    pub logs: Vec<Log>,
}

/// Block selector for historical calls.
///
/// Historical state is always addressed by hash so a reorg can never
/// silently swap the block underneath a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    Hash(H256),
    Latest,
}

/// An intercepted call that has been submitted but not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    pub tx_hash: H256,
    pub from: Address,
    pub to: Option<Address>,
    pub data: Bytes,
}

impl PendingCall {
    pub fn new(tx_hash: H256, request: &TransactionRequest) -> Self {
        Self {
            tx_hash,
            from: request.from,
            to: request.to,
            data: request.data.clone(),
        }
    }
}
