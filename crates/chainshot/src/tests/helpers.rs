//! Shared test helpers: an in-memory chain standing in for the RPC node.
//!
//! The chain automines one block per transaction and keeps a copy of the
//! token ledger for every block hash, so historical `balanceOf` reads
//! behave like `eth_call` pinned to a block.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use rustc_hash::FxHashMap;
use tokio::sync::Notify;

use crate::abi::{Abi, encode_call, event_topic, selector, sol_address, sol_uint};
use crate::config::RecorderConfig;
use crate::error::RpcError;
use crate::provider::{ChainReader, Submit, SubmitEntrypoint};
use crate::scenario::{Scenario, ScenarioConfig};
use crate::types::{BlockId, Log, Receipt, TransactionRequest};

pub const ALICE: u64 = 0xa11ce;
pub const BOB: u64 = 0xb0b;
pub const CAROL: u64 = 0xca201;
pub const TOKEN: u64 = 0x70c3;
pub const VAULT: u64 = 0x7a17;

/// Initial USDC balance of alice (1000 USDC at 6 decimals).
pub const ALICE_FUNDS: u64 = 1_000_000_000;

pub const TOKEN_DECIMALS: u8 = 6;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

/// Vault interface. JSON so the batch items keep their field names.
pub fn vault_abi() -> Abi {
    Abi::from_json(
        r#"[
            {"type": "function", "name": "deposit", "stateMutability": "nonpayable", "outputs": [],
             "inputs": [{"name": "amount", "type": "uint256"}]},
            {"type": "function", "name": "batch", "stateMutability": "nonpayable", "outputs": [],
             "inputs": [{"name": "items", "type": "tuple[]", "components": [
                {"name": "to", "type": "address"},
                {"name": "amount", "type": "uint256"}
             ]}]},
            {"type": "event", "name": "Deposit", "anonymous": false, "inputs": [
                {"name": "user", "type": "address", "indexed": true},
                {"name": "amount", "type": "uint256", "indexed": false}
            ]}
        ]"#,
    )
    .expect("vault abi")
}

/// alice and bob, the vault contract and the USDC token.
pub fn scenario_config() -> ScenarioConfig {
    ScenarioConfig::new()
        .account("alice", addr(ALICE))
        .account("bob", addr(BOB))
        .contract("vault", addr(VAULT), Arc::new(vault_abi()))
        .erc20("USDC", addr(TOKEN))
}

pub fn transfer_call(from: u64, to: u64, amount: u64) -> TransactionRequest {
    let data = encode_call(
        "transfer(address,uint256)",
        &[sol_address(addr(to)), sol_uint(U256::from(amount))],
    )
    .expect("static args");
    TransactionRequest::call(addr(from), addr(TOKEN), data)
}

pub fn deposit_call(from: u64, amount: u64) -> TransactionRequest {
    let data = encode_call("deposit(uint256)", &[sol_uint(U256::from(amount))]).expect("static args");
    TransactionRequest::call(addr(from), addr(VAULT), data)
}

/// `batch([(to, amount), ...])` on the vault; a no-op for the ledger.
pub fn batch_call(from: u64, items: &[(u64, u64)]) -> TransactionRequest {
    let mut data = selector("batch((address,uint256)[])").to_vec();
    data.extend_from_slice(&U256::from(32).to_big_endian());
    data.extend_from_slice(&U256::from(items.len()).to_big_endian());
    for (to, amount) in items {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(addr(*to).as_bytes());
        data.extend_from_slice(&word);
        data.extend_from_slice(&U256::from(*amount).to_big_endian());
    }
    TransactionRequest::call(addr(from), addr(VAULT), data)
}

pub fn balance(scenario_balances: &crate::record::Balances, holder: &str) -> U256 {
    scenario_balances["USDC"][holder]
}

#[derive(Default)]
struct ChainState {
    ledger: FxHashMap<Address, U256>,
    history: HashMap<H256, FxHashMap<Address, U256>>,
    head: H256,
    block_number: u64,
    tx_count: u64,
    receipts: HashMap<H256, Receipt>,
    dropped: HashSet<H256>,
    gates: HashMap<H256, Arc<Notify>>,
    drop_next: bool,
    hold_next: Option<Arc<Notify>>,
    fail_next_send: bool,
    fail_next_receipt_lookup: bool,
    fail_next_balance_query: bool,
    balance_queries: Vec<BlockId>,
}

impl ChainState {
    fn mine(&mut self) -> (H256, u64) {
        self.block_number += 1;
        let hash = H256::from_low_u64_be(0xb10c_0000 + self.block_number);
        self.history.insert(hash, self.ledger.clone());
        self.head = hash;
        (hash, self.block_number)
    }

    fn move_funds(&mut self, from: Address, to: Address, amount: U256) -> bool {
        let available = self.ledger.get(&from).copied().unwrap_or_default();
        if available < amount {
            return false;
        }
        self.ledger.insert(from, available - amount);
        *self.ledger.entry(to).or_default() += amount;
        true
    }
}

/// Automining chain with one ERC-20 token (USDC) and a deposit vault.
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        let chain = Self {
            state: Mutex::new(ChainState::default()),
        };
        chain.mint(addr(ALICE), ALICE_FUNDS);
        Arc::new(chain)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().expect("mock chain lock")
    }

    /// Credit `amount` and mine a block, like a faucet transaction.
    pub fn mint(&self, holder: Address, amount: u64) {
        let mut state = self.state();
        *state.ledger.entry(holder).or_default() += U256::from(amount);
        state.mine();
    }

    /// The next submitted call is mined but its receipt is never served.
    pub fn drop_next_receipt(&self) {
        self.state().drop_next = true;
    }

    /// The next submitted call's receipt is served only once the returned
    /// gate is notified.
    pub fn hold_next_receipt(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state().hold_next = Some(Arc::clone(&gate));
        gate
    }

    pub fn fail_next_send(&self) {
        self.state().fail_next_send = true;
    }

    /// The next receipt lookup fails as if the node were unreachable.
    pub fn fail_next_receipt_lookup(&self) {
        self.state().fail_next_receipt_lookup = true;
    }

    /// The next pinned `balanceOf` read answers HTTP 500.
    pub fn fail_next_balance_query(&self) {
        self.state().fail_next_balance_query = true;
    }

    pub fn balance_queries(&self) -> Vec<BlockId> {
        self.state().balance_queries.clone()
    }

    pub fn receipt(&self, hash: H256) -> Option<Receipt> {
        self.state().receipts.get(&hash).cloned()
    }

    fn execute(state: &mut ChainState, request: &TransactionRequest) -> (bool, Vec<Log>) {
        let Some(to) = request.to else {
            return (true, Vec::new());
        };
        let data = &request.data;
        if data.len() < 4 {
            return (true, Vec::new());
        }
        let (sel, args) = data.split_at(4);
        if to == addr(TOKEN) && sel == selector("transfer(address,uint256)") && args.len() >= 64 {
            let recipient = Address::from_slice(&args[12..32]);
            let amount = U256::from_big_endian(&args[32..64]);
            if !state.move_funds(request.from, recipient, amount) {
                return (false, Vec::new());
            }
            return (true, vec![transfer_log(request.from, recipient, amount)]);
        }
        if to == addr(VAULT) && sel == selector("deposit(uint256)") && args.len() >= 32 {
            let amount = U256::from_big_endian(&args[..32]);
            if !state.move_funds(request.from, addr(VAULT), amount) {
                return (false, Vec::new());
            }
            let deposit = Log {
                address: addr(VAULT),
                topics: vec![
                    event_topic("Deposit(address,uint256)"),
                    H256::from(request.from),
                ],
                data: Bytes::from(amount.to_big_endian().to_vec()),
            };
            return (
                true,
                vec![transfer_log(request.from, addr(VAULT), amount), deposit],
            );
        }
        (true, Vec::new())
    }
}

pub fn transfer_log(from: Address, to: Address, amount: U256) -> Log {
    Log {
        address: addr(TOKEN),
        topics: vec![
            event_topic("Transfer(address,address,uint256)"),
            H256::from(from),
            H256::from(to),
        ],
        data: Bytes::from(amount.to_big_endian().to_vec()),
    }
}

#[async_trait]
impl Submit for MockChain {
    async fn send_transaction(&self, request: TransactionRequest) -> Result<H256, RpcError> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_send) {
            return Err(RpcError::ConnectionFailed {
                url: "mock://chain".into(),
                cause: "connection reset".into(),
            });
        }
        state.tx_count += 1;
        let tx_hash = H256::from_low_u64_be(0x7000_0000 + state.tx_count);
        let (status, logs) = Self::execute(&mut state, &request);
        let (block_hash, block_number) = state.mine();
        state.receipts.insert(
            tx_hash,
            Receipt {
                transaction_hash: tx_hash,
                block_hash,
                block_number,
                status,
                logs,
            },
        );
        if std::mem::take(&mut state.drop_next) {
            state.dropped.insert(tx_hash);
        }
        if let Some(gate) = state.hold_next.take() {
            state.gates.insert(tx_hash, gate);
        }
        Ok(tx_hash)
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn get_transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, RpcError> {
        let gate = self.state().gates.get(&hash).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_receipt_lookup) {
            return Err(RpcError::ConnectionFailed {
                url: "mock://chain".into(),
                cause: "connection refused".into(),
            });
        }
        if state.dropped.contains(&hash) {
            return Ok(None);
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn call(&self, to: Address, data: Bytes, block: BlockId) -> Result<Bytes, RpcError> {
        let mut state = self.state();
        let reverted = || RpcError::JsonRpcError {
            method: "eth_call".into(),
            code: 3,
            message: "execution reverted".into(),
        };
        if to != addr(TOKEN) || data.len() < 4 {
            return Err(reverted());
        }
        if data[..4] == selector("decimals()") {
            return Ok(Bytes::from(U256::from(TOKEN_DECIMALS).to_big_endian().to_vec()));
        }
        if data[..4] != selector("balanceOf(address)") || data.len() < 36 {
            return Err(reverted());
        }
        let holder = Address::from_slice(&data[16..36]);
        state.balance_queries.push(block);
        if matches!(block, BlockId::Hash(_)) && std::mem::take(&mut state.fail_next_balance_query) {
            return Err(RpcError::HttpError {
                method: "eth_call".into(),
                status: 500,
                body: "internal error".into(),
            });
        }
        let ledger = match block {
            BlockId::Latest => &state.ledger,
            BlockId::Hash(hash) => state.history.get(&hash).ok_or(RpcError::JsonRpcError {
                method: "eth_call".into(),
                code: -32000,
                message: "header not found".into(),
            })?,
        };
        let amount = ledger.get(&holder).copied().unwrap_or_default();
        Ok(Bytes::from(amount.to_big_endian().to_vec()))
    }

    async fn latest_block_hash(&self) -> Result<H256, RpcError> {
        Ok(self.state().head)
    }
}

/// Entrypoint over `chain`, plus the chain as reader.
pub fn wire(chain: &Arc<MockChain>) -> (Arc<SubmitEntrypoint>, Arc<dyn ChainReader>) {
    let submit: Arc<dyn Submit> = chain.clone();
    let reader: Arc<dyn ChainReader> = chain.clone();
    (Arc::new(SubmitEntrypoint::new(submit)), reader)
}

pub fn scenario_with(
    chain: &Arc<MockChain>,
    config: ScenarioConfig,
    settings: RecorderConfig,
) -> (Scenario, Arc<SubmitEntrypoint>) {
    let (entrypoint, reader) = wire(chain);
    let scenario = Scenario::new("test scenario", config, settings, Arc::clone(&entrypoint), reader);
    (scenario, entrypoint)
}

/// Poll until `scenario` holds `count` entries.
pub async fn wait_for_entries(scenario: &Scenario, count: usize) {
    for _ in 0..500 {
        if scenario.entry_count() >= count {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    panic!("scenario never reached {count} entries");
}
