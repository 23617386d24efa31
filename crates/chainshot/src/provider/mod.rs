//! RPC provider seams: the shared submission entrypoint that scenarios
//! intercept, and the read-side queries the resolver needs.

pub mod rpc_client;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use ethereum_types::{Address, H256};

use crate::error::{RpcError, UsageError};
use crate::types::{BlockId, Receipt, TransactionRequest};

pub use rpc_client::{HttpProvider, RpcConfig};

/// Submission side of a provider: fire a state-changing call, get its hash.
#[async_trait]
pub trait Submit: Send + Sync {
    async fn send_transaction(&self, request: TransactionRequest) -> Result<H256, RpcError>;
}

/// Read side of a provider.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// `Ok(None)` when the node has no receipt for `hash` (yet, or ever).
    async fn get_transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, RpcError>;

    /// Read-only call against the state at `block`.
    async fn call(&self, to: Address, data: Bytes, block: BlockId) -> Result<Bytes, RpcError>;

    async fn latest_block_hash(&self) -> Result<H256, RpcError>;
}

/// The call-submission entrypoint shared by all test code.
///
/// Test code always sends through this value. A recording scenario swaps
/// the inner submitter for a decorator around it and puts the original
/// back when it ends.
pub struct SubmitEntrypoint {
    current: RwLock<Arc<dyn Submit>>,
}

/// Handle returned by [`SubmitEntrypoint::install`], needed to undo it.
pub struct Interception {
    scenario: String,
    original: Arc<dyn Submit>,
    installed: Arc<dyn Submit>,
}

impl Interception {
    pub fn scenario(&self) -> &str {
        &self.scenario
    }
}

impl SubmitEntrypoint {
    pub fn new(inner: Arc<dyn Submit>) -> Self {
        Self {
            current: RwLock::new(inner),
        }
    }

    /// The submitter calls are currently routed to.
    pub fn current(&self) -> Arc<dyn Submit> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the current submitter with `wrap(current)`.
    pub fn install(
        &self,
        scenario: &str,
        wrap: impl FnOnce(Arc<dyn Submit>) -> Arc<dyn Submit>,
    ) -> Interception {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let original = Arc::clone(&guard);
        let installed = wrap(Arc::clone(&original));
        *guard = Arc::clone(&installed);
        Interception {
            scenario: scenario.to_string(),
            original,
            installed,
        }
    }

    /// Put back the exact submitter that was current before `install`.
    ///
    /// Fails if another interception was stacked on top in the meantime;
    /// the entrypoint is left untouched in that case.
    pub fn restore(&self, interception: &Interception) -> Result<(), UsageError> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !same_submitter(&guard, &interception.installed) {
            return Err(UsageError::InterceptionOrder {
                scenario: interception.scenario.clone(),
            });
        }
        *guard = Arc::clone(&interception.original);
        Ok(())
    }
}

#[async_trait]
impl Submit for SubmitEntrypoint {
    async fn send_transaction(&self, request: TransactionRequest) -> Result<H256, RpcError> {
        let submitter = self.current();
        submitter.send_transaction(request).await
    }
}

/// Identity comparison on the data pointer only; vtable pointers for the
/// same object may differ between codegen units.
pub fn same_submitter(a: &Arc<dyn Submit>, b: &Arc<dyn Submit>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
