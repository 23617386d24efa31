//! Sequence diagram synthesis from a finished scenario log.
//!
//! Output is plain mermaid `sequenceDiagram` body lines:
//!
//! ```text
//!   actor alice
//!   participant USDC
//!   participant bob
//!   rect rgb(230,255,230)
//!     alice->>USDC: alice calls USDC.transfer
//!     alice-->>bob: USDC.Transfer: alice -> bob (1.5)
//!   end
//! ```

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::format::{format_amount, stringify_arg};
use crate::record::{Arg, EntryKind, EventRecord, LogEntry, RecordedScenario};

const TRANSFER_EVENT: &str = "Transfer";
const BLOCK_COLOR: &str = "rgb(230,255,230)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDiagram {
    actors: Vec<String>,
    participants: Vec<String>,
    lines: Vec<String>,
}

impl SequenceDiagram {
    pub fn for_scenario(scenario: &RecordedScenario) -> Self {
        Self::synthesize(&scenario.entries, &scenario.tokens, &scenario.token_decimals)
    }

    /// Build the diagram for `entries` in log order.
    ///
    /// `tokens` are the tracked token aliases; only their `Transfer` events
    /// become value-flow arrows. Amounts use `decimals` where known.
    pub fn synthesize(
        entries: &[LogEntry],
        tokens: &[String],
        decimals: &IndexMap<String, u8>,
    ) -> Self {
        let calls: Vec<&LogEntry> = entries
            .iter()
            .filter(|e| e.kind == EntryKind::MethodCall)
            .collect();

        let actors: BTreeSet<String> = calls
            .iter()
            .filter_map(|e| e.caller.as_deref())
            .map(sanitize)
            .collect();
        let mut participants: BTreeSet<String> = BTreeSet::new();
        for entry in &calls {
            if let Some(contract) = entry.contract.as_deref() {
                participants.insert(sanitize(contract));
            }
            for event in &entry.events {
                if let Some((from, to, _)) = as_transfer(event, tokens) {
                    participants.insert(from);
                    participants.insert(to);
                }
            }
        }
        let participants: Vec<String> = participants
            .into_iter()
            .filter(|p| !actors.contains(p))
            .collect();
        let actors: Vec<String> = actors.into_iter().collect();

        let mut lines = Vec::new();
        lines.extend(actors.iter().map(|a| format!("  actor {a}")));
        lines.extend(participants.iter().map(|p| format!("  participant {p}")));

        for entry in calls {
            let caller = sanitize(entry.caller.as_deref().unwrap_or_default());
            let contract = sanitize(entry.contract.as_deref().unwrap_or_default());
            let method = sanitize(entry.method_name().unwrap_or_default());
            lines.push(format!("  rect {BLOCK_COLOR}"));
            lines.push(format!(
                "    {caller}->>{contract}: {caller} calls {contract}.{method}"
            ));
            for event in &entry.events {
                let emitter = sanitize(&event.contract);
                match as_transfer(event, tokens) {
                    Some((from, to, amount)) => {
                        let amount = match (amount, decimals.get(&event.contract)) {
                            (Arg::Uint(v), Some(d)) => format_amount(*v, *d),
                            (other, _) => stringify_arg(other),
                        };
                        lines.push(format!(
                            "    {from}-->>{to}: {emitter}.{TRANSFER_EVENT}: {from} -> {to} ({})",
                            sanitize(&amount)
                        ));
                    }
                    None => lines.push(format!(
                        "    Note over {emitter}: {emitter}.{}",
                        sanitize(&event.name)
                    )),
                }
            }
            lines.push("  end".to_string());
        }

        Self {
            actors,
            participants,
            lines,
        }
    }

    pub fn actors(&self) -> &[String] {
        &self.actors
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    /// Body lines, without the `sequenceDiagram` header.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("sequenceDiagram\n");
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// `(from, to, amount)` when `event` is a tracked token's transfer.
fn as_transfer<'a>(event: &'a EventRecord, tokens: &[String]) -> Option<(String, String, &'a Arg)> {
    if event.name != TRANSFER_EVENT || event.args.len() < 3 || !tokens.contains(&event.contract) {
        return None;
    }
    let party = |arg: &Arg| sanitize(&stringify_arg(arg));
    Some((party(&event.args[0]), party(&event.args[1]), &event.args[2]))
}

/// Mermaid treats double quotes and line breaks as syntax.
fn sanitize(s: &str) -> String {
    s.replace('"', "'").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use ethereum_types::U256;

    use super::*;
    use crate::abi::MethodDescriptor;
    use crate::record::Balances;

    fn call(caller: &str, contract: &str, method: &str, events: Vec<EventRecord>) -> LogEntry {
        LogEntry {
            kind: EntryKind::MethodCall,
            method: Some(MethodDescriptor {
                name: method.into(),
                inputs: vec![],
            }),
            caller: Some(caller.into()),
            contract: Some(contract.into()),
            args: vec![],
            balances: Balances::new(),
            events,
            custom_state: None,
        }
    }

    fn transfer(token: &str, from: &str, to: &str, amount: u64) -> EventRecord {
        EventRecord {
            contract: token.into(),
            name: "Transfer".into(),
            args: vec![Arg::text(from), Arg::text(to), Arg::Uint(U256::from(amount))],
        }
    }

    fn tokens() -> Vec<String> {
        vec!["USDC".to_string()]
    }

    #[test]
    fn test_transfer_renders_as_value_flow() {
        let entries = vec![
            LogEntry::initial_state(Balances::new()),
            call("alice", "USDC", "transfer", vec![transfer("USDC", "alice", "bob", 1_500_000)]),
        ];
        let mut decimals = IndexMap::new();
        decimals.insert("USDC".to_string(), 6);
        let diagram = SequenceDiagram::synthesize(&entries, &tokens(), &decimals);

        assert_eq!(
            diagram.lines(),
            &[
                "  actor alice",
                "  participant USDC",
                "  participant bob",
                "  rect rgb(230,255,230)",
                "    alice->>USDC: alice calls USDC.transfer",
                "    alice-->>bob: USDC.Transfer: alice -> bob (1.5)",
                "  end",
            ]
        );
    }

    #[test]
    fn test_actor_never_duplicated_as_participant() {
        let entries = vec![
            call("alice", "vault", "deposit", vec![transfer("USDC", "alice", "vault", 5)]),
            call("bob", "USDC", "transfer", vec![transfer("USDC", "bob", "alice", 1)]),
        ];
        let diagram = SequenceDiagram::synthesize(&entries, &tokens(), &IndexMap::new());
        assert_eq!(diagram.actors(), &["alice", "bob"]);
        assert_eq!(diagram.participants(), &["USDC", "vault"]);
        assert!(diagram.lines().contains(&"    bob-->>alice: USDC.Transfer: bob -> alice (1)".to_string()));
    }

    #[test]
    fn test_non_transfer_events_become_notes() {
        let deposit = EventRecord {
            contract: "vault".into(),
            name: "Deposit".into(),
            args: vec![Arg::text("alice"), Arg::Uint(U256::from(5))],
        };
        // wrong arity: never a transfer even when named Transfer
        let short_transfer = EventRecord {
            contract: "USDC".into(),
            name: "Transfer".into(),
            args: vec![Arg::text("alice"), Arg::text("bob")],
        };
        // untracked emitter
        let foreign = transfer("vault", "alice", "carol", 9);
        let entries = vec![call("alice", "vault", "deposit", vec![deposit, short_transfer, foreign])];

        let diagram = SequenceDiagram::synthesize(&entries, &tokens(), &IndexMap::new());
        let lines = diagram.lines();
        assert!(lines.contains(&"    Note over vault: vault.Deposit".to_string()));
        assert!(lines.contains(&"    Note over USDC: USDC.Transfer".to_string()));
        assert!(lines.contains(&"    Note over vault: vault.Transfer".to_string()));
        assert!(!diagram.participants().contains(&"carol".to_string()));
    }

    #[test]
    fn test_mint_and_unknown_parties_are_compact() {
        let zero = "0x0000000000000000000000000000000000000000";
        let stranger = "0x00000000000000000000000000000000000ca201";
        let entries = vec![call(
            "alice",
            "vault",
            "deposit",
            vec![transfer("USDC", zero, "alice", 5), transfer("USDC", "alice", stranger, 1)],
        )];
        let diagram = SequenceDiagram::synthesize(&entries, &tokens(), &IndexMap::new());
        let lines = diagram.lines();
        assert!(lines.contains(&"    ZERO_ADDR-->>alice: USDC.Transfer: ZERO_ADDR -> alice (5)".to_string()));
        assert!(lines.contains(
            &"    alice-->>0x00000000..00000ca201: USDC.Transfer: alice -> 0x00000000..00000ca201 (1)"
                .to_string()
        ));
        assert!(diagram.participants().contains(&"ZERO_ADDR".to_string()));
        assert!(!diagram.participants().iter().any(|p| p == zero));
    }

    #[test]
    fn test_render_is_deterministic() {
        let entries = vec![
            call("zed", "USDC", "transfer", vec![transfer("USDC", "zed", "amy", 2)]),
            call("amy", "USDC", "approve", vec![]),
        ];
        let a = SequenceDiagram::synthesize(&entries, &tokens(), &IndexMap::new()).to_mermaid();
        let b = SequenceDiagram::synthesize(&entries, &tokens(), &IndexMap::new()).to_mermaid();
        assert_eq!(a, b);
        assert!(a.starts_with("sequenceDiagram\n  actor amy\n  actor zed\n  participant USDC\n"));
    }

    #[test]
    fn test_quotes_are_replaced() {
        let entries = vec![call("al\"ice", "USDC", "transfer", vec![])];
        let diagram = SequenceDiagram::synthesize(&entries, &tokens(), &IndexMap::new());
        assert_eq!(diagram.actors(), &["al'ice"]);
    }
}
