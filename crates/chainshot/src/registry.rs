//! Alias lookup for the addresses a scenario tracks.

use std::sync::RwLock;

use ethereum_types::Address;
use rustc_hash::FxHashMap;

use crate::record::Arg;

/// Canonical text form of an address: `0x` + 40 lowercase hex digits.
pub fn normalize_address(address: &Address) -> String {
    format!("0x{address:x}")
}

/// Parse an address-shaped string (`0x` + 40 hex digits, any case).
pub fn parse_address_str(s: &str) -> Option<Address> {
    let hex_digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if hex_digits.len() != 40 {
        return None;
    }
    let bytes = hex::decode(hex_digits).ok()?;
    Some(Address::from_slice(&bytes))
}

/// Address -> alias maps for accounts, contracts and tokens.
///
/// Built once when a scenario starts. The only state that changes
/// afterwards is the `decimals()` cache, which is insert-once per token.
#[derive(Debug, Default)]
pub struct AddressRegistry {
    accounts: FxHashMap<Address, String>,
    contracts: FxHashMap<Address, String>,
    tokens: FxHashMap<Address, String>,
    decimals: RwLock<FxHashMap<Address, u8>>,
}

impl AddressRegistry {
    pub fn new<'a>(
        accounts: impl IntoIterator<Item = (&'a str, Address)>,
        contracts: impl IntoIterator<Item = (&'a str, Address)>,
        tokens: impl IntoIterator<Item = (&'a str, Address)>,
    ) -> Self {
        Self {
            accounts: reverse_map(accounts),
            contracts: reverse_map(contracts),
            tokens: reverse_map(tokens),
            decimals: RwLock::default(),
        }
    }

    /// Alias for `address`, falling back to its normalized form.
    ///
    /// Accounts shadow contracts, which shadow tokens.
    pub fn resolve(&self, address: &Address) -> String {
        self.accounts
            .get(address)
            .or_else(|| self.contracts.get(address))
            .or_else(|| self.tokens.get(address))
            .cloned()
            .unwrap_or_else(|| normalize_address(address))
    }

    /// Resolve address-shaped text; anything else is returned unchanged.
    pub fn resolve_str(&self, s: &str) -> String {
        match parse_address_str(s) {
            Some(address) => self.resolve(&address),
            None => s.to_string(),
        }
    }

    /// Rewrite every address-shaped text leaf of `arg` with its alias.
    pub fn resolve_deep(&self, arg: Arg) -> Arg {
        match arg {
            Arg::Text(s) => Arg::Text(self.resolve_str(&s)),
            Arg::List(items) => Arg::List(items.into_iter().map(|a| self.resolve_deep(a)).collect()),
            Arg::Struct(fields) => Arg::Struct(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, self.resolve_deep(v)))
                    .collect(),
            ),
            scalar => scalar,
        }
    }

    pub fn is_token(&self, address: &Address) -> bool {
        self.tokens.contains_key(address)
    }

    pub fn cached_decimals(&self, token: &Address) -> Option<u8> {
        let cache = self.decimals.read().unwrap_or_else(|p| p.into_inner());
        cache.get(token).copied()
    }

    /// Store `decimals` for `token` unless already known; returns the cached value.
    pub fn remember_decimals(&self, token: Address, decimals: u8) -> u8 {
        let mut cache = self.decimals.write().unwrap_or_else(|p| p.into_inner());
        *cache.entry(token).or_insert(decimals)
    }
}

fn reverse_map<'a>(entries: impl IntoIterator<Item = (&'a str, Address)>) -> FxHashMap<Address, String> {
    let mut map = FxHashMap::default();
    for (name, address) in entries {
        map.entry(address).or_insert_with(|| name.to_string());
    }
    map
}
