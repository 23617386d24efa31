//! Contract interfaces: the capability objects that turn raw call payloads
//! and receipt logs into named, typed records.

use alloy_dyn_abi::{EventExt, JsonAbiExt};
use alloy_json_abi::{Event, Function, JsonAbi};
use alloy_primitives::B256;
use serde::Serialize;

use crate::error::AbiError;
use crate::record::Arg;
use crate::types::Log;

/// Explicit outcome of a decode attempt against one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    Matched(T),
    NoMatch,
}

impl<T> Decoded<T> {
    pub fn matched(self) -> Option<T> {
        match self {
            Decoded::Matched(value) => Some(value),
            Decoded::NoMatch => None,
        }
    }
}

impl<T> From<Option<T>> for Decoded<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Decoded::NoMatch, Decoded::Matched)
    }
}

/// Name and typed parameter list of a called method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub inputs: Vec<ParamDescriptor>,
}

impl MethodDescriptor {
    pub fn of(function: &Function) -> Self {
        Self {
            name: function.name.clone(),
            inputs: function
                .inputs
                .iter()
                .map(|p| ParamDescriptor {
                    name: p.name.clone(),
                    kind: p.selector_type().into_owned(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall {
    pub method: MethodDescriptor,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub name: String,
    pub args: Vec<Arg>,
}

/// Decoding capability of one tracked contract.
pub trait ContractInterface: Send + Sync {
    fn try_decode_call(&self, data: &[u8]) -> Decoded<DecodedCall>;
    fn try_decode_event(&self, log: &Log) -> Decoded<DecodedEvent>;
}

const ERC20_FUNCTIONS: &[&str] = &[
    "name()",
    "symbol()",
    "decimals()",
    "totalSupply()",
    "balanceOf(address account)",
    "transfer(address to, uint256 value)",
    "allowance(address owner, address spender)",
    "approve(address spender, uint256 value)",
    "transferFrom(address from, address to, uint256 value)",
];

const ERC20_EVENTS: &[&str] = &[
    "event Transfer(address indexed from, address indexed to, uint256 value)",
    "event Approval(address indexed owner, address indexed spender, uint256 value)",
];

/// A contract interface described by its functions and events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Abi {
    functions: Vec<Function>,
    events: Vec<Event>,
}

impl Abi {
    pub fn new(functions: Vec<Function>, events: Vec<Event>) -> Self {
        Self { functions, events }
    }

    /// Build from human-readable signatures.
    ///
    /// Tuple parameters parsed this way have unnamed components and decode
    /// as lists; use [`Abi::from_json`] to get named struct fields.
    pub fn from_signatures(functions: &[&str], events: &[&str]) -> Result<Self, AbiError> {
        let invalid = |signature: &str, cause: String| AbiError::InvalidSignature {
            signature: signature.to_string(),
            cause,
        };
        Ok(Self {
            functions: functions
                .iter()
                .map(|s| Function::parse(s).map_err(|e| invalid(s, e.to_string())))
                .collect::<Result<_, _>>()?,
            events: events
                .iter()
                .map(|s| Event::parse(s).map_err(|e| invalid(s, e.to_string())))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Build from a Solidity JSON ABI (compiler or Foundry/Hardhat artifact `abi` array).
    ///
    /// Constructors, errors, fallback and receive entries are skipped.
    pub fn from_json(json: &str) -> Result<Self, AbiError> {
        let abi: JsonAbi =
            serde_json::from_str(json).map_err(|e| AbiError::InvalidJson(e.to_string()))?;
        Ok(Self {
            functions: abi.functions().cloned().collect(),
            events: abi.events().cloned().collect(),
        })
    }

    /// The standard ERC-20 token interface.
    pub fn erc20() -> Self {
        Self {
            functions: ERC20_FUNCTIONS
                .iter()
                .filter_map(|s| Function::parse(s).ok())
                .collect(),
            events: ERC20_EVENTS
                .iter()
                .filter_map(|s| Event::parse(s).ok())
                .collect(),
        }
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

fn decode_call(function: &Function, args: &[u8]) -> Option<DecodedCall> {
    let values = function.abi_decode_input(args).ok()?;
    Some(DecodedCall {
        method: MethodDescriptor::of(function),
        args: values
            .into_iter()
            .zip(&function.inputs)
            .map(|(value, param)| Arg::from_abi(value, &param.components))
            .collect(),
    })
}

/// Indexed dynamic or tuple inputs only carry their hash and decode as
/// 32 raw bytes.
fn decode_event(event: &Event, log: &Log) -> Option<DecodedEvent> {
    let indexed_count = event.inputs.iter().filter(|p| p.indexed).count();
    if log.topics.len() != indexed_count + 1 {
        return None;
    }
    let topics = log.topics.iter().map(|t| B256::from(t.0));
    let decoded = event.decode_log_parts(topics, &log.data).ok()?;

    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();
    let args = event
        .inputs
        .iter()
        .map(|param| {
            let value = if param.indexed {
                indexed.next()
            } else {
                body.next()
            }?;
            Some(Arg::from_abi(value, &param.components))
        })
        .collect::<Option<Vec<_>>>()?;
    Some(DecodedEvent {
        name: event.name.clone(),
        args,
    })
}

impl ContractInterface for Abi {
    fn try_decode_call(&self, data: &[u8]) -> Decoded<DecodedCall> {
        let Some((selector, args)) = data.split_first_chunk::<4>() else {
            return Decoded::NoMatch;
        };
        self.functions
            .iter()
            .filter(|f| f.selector().0 == *selector)
            .find_map(|f| decode_call(f, args))
            .into()
    }

    fn try_decode_event(&self, log: &Log) -> Decoded<DecodedEvent> {
        let Some(topic0) = log.topics.first() else {
            return Decoded::NoMatch;
        };
        self.events
            .iter()
            .filter(|e| !e.anonymous && e.selector().0 == topic0.0)
            .find_map(|e| decode_event(e, log))
            .into()
    }
}
