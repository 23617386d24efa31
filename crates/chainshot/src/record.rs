//! The scenario record: log entries and the argument values they carry.

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::Param;
use bytes::Bytes;
use ethereum_types::U256;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::abi::{MethodDescriptor, u256};

/// A recorded argument value.
///
/// Addresses are carried as their `0x`-prefixed text so alias resolution
/// can rewrite them in place. `Int` holds a two's-complement word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Text(String),
    Uint(U256),
    Int(U256),
    Bool(bool),
    Bytes(Bytes),
    List(Vec<Arg>),
    Struct(IndexMap<String, Arg>),
}

impl Arg {
    /// Convert a decoded ABI value. `components` are the parameter's tuple
    /// components and name struct fields; arrays pass them to each element.
    pub fn from_abi(value: DynSolValue, components: &[Param]) -> Self {
        match value {
            DynSolValue::Address(addr) => Arg::Text(format!("0x{}", hex::encode(addr.as_slice()))),
            DynSolValue::Uint(v, _) => Arg::Uint(u256(v)),
            DynSolValue::Int(v, _) => Arg::Int(u256(v.into_raw())),
            DynSolValue::Bool(b) => Arg::Bool(b),
            DynSolValue::FixedBytes(word, size) => {
                Arg::Bytes(Bytes::copy_from_slice(&word[..size.min(32)]))
            }
            DynSolValue::Function(f) => Arg::Bytes(Bytes::copy_from_slice(f.as_slice())),
            DynSolValue::Bytes(b) => Arg::Bytes(b.into()),
            DynSolValue::String(s) => Arg::Text(s),
            DynSolValue::Array(items) | DynSolValue::FixedArray(items) => Arg::List(
                items
                    .into_iter()
                    .map(|item| Arg::from_abi(item, components))
                    .collect(),
            ),
            DynSolValue::Tuple(items) if components.len() == items.len() => {
                if components.iter().all(|c| !c.name.is_empty()) {
                    Arg::Struct(
                        components
                            .iter()
                            .zip(items)
                            .map(|(c, item)| (c.name.clone(), Arg::from_abi(item, &c.components)))
                            .collect(),
                    )
                } else {
                    Arg::List(
                        components
                            .iter()
                            .zip(items)
                            .map(|(c, item)| Arg::from_abi(item, &c.components))
                            .collect(),
                    )
                }
            }
            DynSolValue::Tuple(items) => Arg::List(
                items
                    .into_iter()
                    .map(|item| Arg::from_abi(item, &[]))
                    .collect(),
            ),
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Arg::Text(s.into())
    }
}

/// Signed decimal rendering of a two's-complement word.
pub(crate) fn signed_decimal(word: &U256) -> String {
    if word.bit(255) {
        let magnitude = (!*word).overflowing_add(U256::one()).0;
        format!("-{magnitude}")
    } else {
        word.to_string()
    }
}

impl Serialize for Arg {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Arg::Text(s) => serializer.serialize_str(s),
            Arg::Uint(v) => serializer.serialize_str(&v.to_string()),
            Arg::Int(v) => serializer.serialize_str(&signed_decimal(v)),
            Arg::Bool(b) => serializer.serialize_bool(*b),
            Arg::Bytes(b) => serializer.serialize_str(&format!("0x{}", hex::encode(b))),
            Arg::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Arg::Struct(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    MethodCall,
    InitialState,
}

/// Token alias -> holder alias -> balance.
pub type Balances = IndexMap<String, IndexMap<String, U256>>;

/// A decoded event, attributed to the tracked contract that emitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub contract: String,
    pub name: String,
    pub args: Vec<Arg>,
}

/// One resolved call (or the initial snapshot) in a scenario log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<MethodDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    pub args: Vec<Arg>,
    #[serde(serialize_with = "serialize_balances")]
    pub balances: Balances,
    pub events: Vec<EventRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_state: Option<IndexMap<String, serde_json::Value>>,
}

impl LogEntry {
    pub fn initial_state(balances: Balances) -> Self {
        Self {
            kind: EntryKind::InitialState,
            method: None,
            caller: None,
            contract: None,
            args: Vec::new(),
            balances,
            events: Vec::new(),
            custom_state: None,
        }
    }

    pub fn method_name(&self) -> Option<&str> {
        self.method.as_ref().map(|m| m.name.as_str())
    }
}

fn serialize_balances<S: Serializer>(balances: &Balances, serializer: S) -> Result<S::Ok, S::Error> {
    let mut outer = serializer.serialize_map(Some(balances.len()))?;
    for (token, holders) in balances {
        let rendered: IndexMap<&str, String> = holders
            .iter()
            .map(|(holder, amount)| (holder.as_str(), amount.to_string()))
            .collect();
        outer.serialize_entry(token, &rendered)?;
    }
    outer.end()
}

/// A finalized scenario, read-only from here on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedScenario {
    pub name: String,
    pub entries: Vec<LogEntry>,
    /// Tracked token aliases in registration order.
    #[serde(skip)]
    pub tokens: Vec<String>,
    /// `decimals()` per token alias, where the token answered.
    #[serde(skip)]
    pub token_decimals: IndexMap<String, u8>,
}

impl RecordedScenario {
    /// The comparable value handed to snapshot assertions.
    pub fn snapshot(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.entries)
    }

    pub fn method_calls(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::MethodCall)
    }
}
