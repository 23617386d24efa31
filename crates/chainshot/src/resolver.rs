//! Turns an intercepted call into a log entry: decoded intent, balances
//! and events at the confirming block, and custom extractor output.

use std::sync::Arc;

use ethereum_types::{Address, U256};
use futures::future::try_join_all;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::abi::{self, Decoded, DecodedCall};
use crate::config::MissingReceiptPolicy;
use crate::error::{RecorderError, RpcError};
use crate::provider::ChainReader;
use crate::record::{Balances, EntryKind, EventRecord, LogEntry};
use crate::registry::AddressRegistry;
use crate::scenario::{ScenarioConfig, TrackedContract};
use crate::types::{BlockId, Log, PendingCall, Receipt};

const BALANCE_OF_SIGNATURE: &str = "balanceOf(address)";
const DECIMALS_SIGNATURE: &str = "decimals()";

type Effects = (Receipt, Balances, Option<IndexMap<String, serde_json::Value>>);

pub struct EffectResolver {
    reader: Arc<dyn ChainReader>,
    registry: Arc<AddressRegistry>,
    config: Arc<ScenarioConfig>,
    missing_receipt: MissingReceiptPolicy,
}

impl EffectResolver {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        registry: Arc<AddressRegistry>,
        config: Arc<ScenarioConfig>,
        missing_receipt: MissingReceiptPolicy,
    ) -> Self {
        Self {
            reader,
            registry,
            config,
            missing_receipt,
        }
    }

    /// Resolve one call. `Ok(None)` means the call was dropped because its
    /// effects could not be read from the node.
    ///
    /// Under [`MissingReceiptPolicy::Drop`] a missing receipt or a failed
    /// node read drops the call with a warning; under `Fail` both fail the
    /// scenario. Decode and extractor failures always do.
    pub async fn resolve(&self, call: PendingCall) -> Result<Option<LogEntry>, RecorderError> {
        let (contract, decoded) = self.decode_intent(&call)?;
        let caller = self.registry.resolve(&call.from);

        let (receipt, balances, custom_state) = match self.effects(&call).await {
            Ok(Some(effects)) => effects,
            Ok(None) => return self.unresolved(&call, &caller, &contract, &decoded, None),
            Err(RecorderError::Rpc(err)) => {
                return self.unresolved(&call, &caller, &contract, &decoded, Some(err));
            }
            Err(err) => return Err(err),
        };
        let events = self.decode_events(&receipt.logs);

        debug!(
            tx_hash = %format!("0x{:x}", call.tx_hash),
            block = receipt.block_number,
            success = receipt.status,
            events = events.len(),
            "{caller} -> {contract}.{}",
            decoded.method.name
        );

        Ok(Some(LogEntry {
            kind: EntryKind::MethodCall,
            method: Some(decoded.method),
            caller: Some(caller),
            contract: Some(contract),
            args: decoded
                .args
                .into_iter()
                .map(|arg| self.registry.resolve_deep(arg))
                .collect(),
            balances,
            events,
            custom_state,
        }))
    }

    /// Receipt, pinned balances and custom state of a call, or `None` when
    /// the node has no receipt for it.
    async fn effects(&self, call: &PendingCall) -> Result<Option<Effects>, RecorderError> {
        let Some(receipt) = self.reader.get_transaction_receipt(call.tx_hash).await? else {
            return Ok(None);
        };
        let block = BlockId::Hash(receipt.block_hash);
        let (balances, custom_state) =
            futures::join!(self.snapshot_balances(block), self.custom_state(&receipt));
        // Extractor failures take precedence over node failures.
        let custom_state = custom_state?;
        let balances = balances?;
        Ok(Some((receipt, balances, custom_state)))
    }

    fn unresolved(
        &self,
        call: &PendingCall,
        caller: &str,
        contract: &str,
        decoded: &DecodedCall,
        cause: Option<RpcError>,
    ) -> Result<Option<LogEntry>, RecorderError> {
        match (self.missing_receipt, cause) {
            (MissingReceiptPolicy::Drop, None) => {
                warn!(
                    tx_hash = %format!("0x{:x}", call.tx_hash),
                    %caller,
                    %contract,
                    method = %decoded.method.name,
                    "No receipt for intercepted call, dropping it from the scenario"
                );
                Ok(None)
            }
            (MissingReceiptPolicy::Drop, Some(err)) => {
                warn!(
                    tx_hash = %format!("0x{:x}", call.tx_hash),
                    %caller,
                    %contract,
                    method = %decoded.method.name,
                    error = %err,
                    "Node read failed for intercepted call, dropping it from the scenario"
                );
                Ok(None)
            }
            (MissingReceiptPolicy::Fail, None) => {
                Err(RecorderError::ReceiptUnavailable { hash: call.tx_hash })
            }
            (MissingReceiptPolicy::Fail, Some(err)) => Err(err.into()),
        }
    }

    /// Match the call target to a tracked contract and decode the payload.
    ///
    /// Returns the target's alias with the decoded call.
    pub fn decode_intent(&self, call: &PendingCall) -> Result<(String, DecodedCall), RecorderError> {
        let Some(to) = call.to else {
            return Err(RecorderError::Decode {
                target: "<contract creation>".to_string(),
                reason: "deployments are not tracked calls".to_string(),
            });
        };
        let Some((name, tracked)) = self.tracked(&to) else {
            return Err(RecorderError::Decode {
                target: self.registry.resolve(&to),
                reason: "call target is not a tracked contract or token".to_string(),
            });
        };
        match tracked.interface.try_decode_call(&call.data) {
            Decoded::Matched(decoded) => Ok((self.registry.resolve(&to), decoded)),
            Decoded::NoMatch => Err(RecorderError::Decode {
                target: name.to_string(),
                reason: match call.data.get(..4) {
                    Some(selector) => format!(
                        "no method matches selector 0x{} with the given arguments",
                        hex::encode(selector)
                    ),
                    None => "payload shorter than a selector".to_string(),
                },
            }),
        }
    }

    fn tracked(&self, address: &Address) -> Option<(&str, &TrackedContract)> {
        self.config
            .contracts
            .iter()
            .chain(&self.config.tokens)
            .find(|(_, tracked)| tracked.address == *address)
            .map(|(name, tracked)| (name.as_str(), tracked))
    }

    /// Distinct holder addresses: accounts, then contracts, then tokens.
    fn holders(&self) -> Vec<Address> {
        let mut seen = FxHashSet::default();
        self.config
            .accounts
            .values()
            .copied()
            .chain(self.config.contracts.values().map(|c| c.address))
            .chain(self.config.tokens.values().map(|t| t.address))
            .filter(|address| seen.insert(*address))
            .collect()
    }

    /// Every tracked token's balance for every holder, read at `block`.
    pub async fn snapshot_balances(&self, block: BlockId) -> Result<Balances, RecorderError> {
        let holders = self.holders();
        let per_token = try_join_all(self.config.tokens.values().map(|token| {
            try_join_all(
                holders
                    .iter()
                    .map(move |holder| self.balance_of(token.address, *holder, block)),
            )
        }))
        .await?;

        let mut balances = Balances::new();
        for (token_name, amounts) in self.config.tokens.keys().zip(per_token) {
            let row = holders
                .iter()
                .zip(amounts)
                .map(|(holder, amount)| (self.registry.resolve(holder), amount))
                .collect();
            balances.insert(token_name.clone(), row);
        }
        Ok(balances)
    }

    async fn balance_of(
        &self,
        token: Address,
        holder: Address,
        block: BlockId,
    ) -> Result<U256, RecorderError> {
        let data = abi::encode_call(BALANCE_OF_SIGNATURE, &[abi::sol_address(holder)])?;
        let output = self.reader.call(token, data, block).await?;
        Ok(abi::decode_uint(&output)?)
    }

    /// Decode receipt logs against the tracked interfaces.
    ///
    /// Contracts are tried before tokens, each in registration order, and
    /// the first interface that decodes a log claims it. Two tracked
    /// interfaces sharing an event signature will therefore attribute that
    /// event to whichever was registered first. Logs nobody decodes are
    /// left out.
    pub fn decode_events(&self, logs: &[Log]) -> Vec<EventRecord> {
        logs.iter()
            .filter_map(|log| {
                self.config
                    .contracts
                    .iter()
                    .chain(&self.config.tokens)
                    .find_map(|(name, tracked)| {
                        tracked
                            .interface
                            .try_decode_event(log)
                            .matched()
                            .map(|event| (name, event))
                    })
            })
            .map(|(name, event)| EventRecord {
                contract: name.clone(),
                name: event.name,
                args: event
                    .args
                    .into_iter()
                    .map(|arg| self.registry.resolve_deep(arg))
                    .collect(),
            })
            .collect()
    }

    /// Run every configured extractor concurrently on the same receipt.
    pub async fn custom_state(
        &self,
        receipt: &Receipt,
    ) -> Result<Option<IndexMap<String, serde_json::Value>>, RecorderError> {
        if self.config.extractors.is_empty() {
            return Ok(None);
        }
        let values = try_join_all(self.config.extractors.iter().map(|(name, extractor)| async move {
            extractor
                .extract(receipt)
                .await
                .map(|value| (name.clone(), value))
                .map_err(|e| RecorderError::Extractor {
                    name: name.clone(),
                    cause: e.to_string(),
                })
        }))
        .await?;
        Ok(Some(values.into_iter().collect()))
    }

    /// Baseline entry: balances at the current head.
    pub async fn initial_state(&self) -> Result<LogEntry, RecorderError> {
        let head = self.reader.latest_block_hash().await?;
        let balances = self.snapshot_balances(BlockId::Hash(head)).await?;
        Ok(LogEntry::initial_state(balances))
    }

    /// `decimals()` per token alias, through the registry cache.
    ///
    /// Tokens that do not answer are left out and render as raw integers.
    pub async fn token_decimals(&self) -> IndexMap<String, u8> {
        let lookups = self.config.tokens.iter().map(|(name, token)| async move {
            if let Some(cached) = self.registry.cached_decimals(&token.address) {
                return Some((name.clone(), cached));
            }
            match self.fetch_decimals(token.address).await {
                Ok(decimals) => Some((
                    name.clone(),
                    self.registry.remember_decimals(token.address, decimals),
                )),
                Err(err) => {
                    debug!(token = %name, error = %err, "decimals() unavailable");
                    None
                }
            }
        });
        futures::future::join_all(lookups)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn fetch_decimals(&self, token: Address) -> Result<u8, RecorderError> {
        let data = abi::encode_call(DECIMALS_SIGNATURE, &[])?;
        let output = self.reader.call(token, data, BlockId::Latest).await?;
        let value = abi::decode_uint(&output)?;
        if value > U256::from(u8::MAX) {
            return Err(RecorderError::Decode {
                target: format!("0x{token:x}"),
                reason: format!("decimals() returned {value}"),
            });
        }
        Ok(value.low_u32() as u8)
    }
}
