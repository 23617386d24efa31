//! Human-facing rendering of recorded values.

use ethereum_types::U256;
use serde_json::{Map, Value as Json};

use crate::abi::MethodDescriptor;
use crate::record::{Arg, signed_decimal};

pub const ZERO_ADDR: &str = "ZERO_ADDR";
pub const ZERO: &str = "ZERO";
pub const MAX_UINT256: &str = "MAX_UINT256";

const ZERO_ADDRESS_TEXT: &str = "0x0000000000000000000000000000000000000000";
const SHORTEN_OVER: usize = 20;
const KEEP: usize = 10;

/// `0x1234567890abcdef...` -> `0x12345678..90abcdef12`; short values untouched.
pub fn shorten(s: &str) -> String {
    if s.len() <= SHORTEN_OVER || !s.is_ascii() {
        return s.to_string();
    }
    format!("{}..{}", &s[..KEEP], &s[s.len() - KEEP..])
}

/// Compact one-line rendering of an argument.
pub fn stringify_arg(arg: &Arg) -> String {
    match arg {
        Arg::Text(s) if s.eq_ignore_ascii_case(ZERO_ADDRESS_TEXT) => ZERO_ADDR.to_string(),
        Arg::Text(s) => shorten(s),
        Arg::Uint(v) if *v == U256::MAX => MAX_UINT256.to_string(),
        Arg::Uint(v) => v.to_string(),
        Arg::Int(v) => signed_decimal(v),
        Arg::Bool(b) => b.to_string(),
        Arg::Bytes(b) if b.len() == 32 && b.iter().all(|x| *x == 0) => ZERO.to_string(),
        Arg::Bytes(b) if b.len() == 32 && b.iter().all(|x| *x == 0xff) => MAX_UINT256.to_string(),
        Arg::Bytes(b) => shorten(&format!("0x{}", hex::encode(b))),
        Arg::List(items) => format!(
            "[{}]",
            items.iter().map(stringify_arg).collect::<Vec<_>>().join(", ")
        ),
        Arg::Struct(fields) => format!(
            "{{{}}}",
            fields
                .iter()
                .map(|(k, v)| format!("{k}: {}", stringify_arg(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Arguments as a JSON object keyed by parameter name (`arg{i}` when unnamed).
pub fn verbose_args(method: &MethodDescriptor, args: &[Arg]) -> Json {
    let mut map = Map::new();
    for (i, arg) in args.iter().enumerate() {
        let key = match method.inputs.get(i) {
            Some(input) if !input.name.is_empty() => input.name.clone(),
            _ => format!("arg{i}"),
        };
        map.insert(key, verbose_value(arg));
    }
    Json::Object(map)
}

fn verbose_value(arg: &Arg) -> Json {
    match arg {
        Arg::List(items) => Json::Array(items.iter().map(verbose_value).collect()),
        Arg::Struct(fields) => Json::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), verbose_value(v)))
                .collect(),
        ),
        Arg::Bool(b) => Json::Bool(*b),
        scalar => Json::String(stringify_arg(scalar)),
    }
}

/// Fixed-point rendering of a token amount, trailing zeros trimmed.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let Some(unit) = U256::from(10u8).checked_pow(U256::from(decimals)) else {
        return amount.to_string();
    };
    let whole = amount / unit;
    let frac = amount % unit;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Signed difference `after - before` as text, `+` prefixed when positive.
pub fn format_delta(before: U256, after: U256, decimals: Option<u8>) -> String {
    let render = |v: U256| match decimals {
        Some(d) => format_amount(v, d),
        None => v.to_string(),
    };
    if after >= before {
        format!("+{}", render(after - before))
    } else {
        format!("-{}", render(before - after))
    }
}
