//! Markdown narrative ("human snapshot") for the scenarios of one test file.

use std::path::{Path, PathBuf};

use ethereum_types::U256;

use crate::diagram::SequenceDiagram;
use crate::error::RecorderError;
use crate::format::{format_amount, format_delta, stringify_arg, verbose_args};
use crate::record::{Balances, EntryKind, LogEntry, RecordedScenario};

/// A finished scenario together with the title of the test that ran it.
#[derive(Debug, Clone)]
pub struct TestNarrative {
    pub test_title: String,
    pub scenario: RecordedScenario,
}

/// `<dir of test>/<snapshots_dir>/<file stem>.md`
pub fn human_snapshot_path(test_file: &Path, snapshots_dir: &str) -> PathBuf {
    let stem = test_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scenario".to_string());
    test_file
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(snapshots_dir)
        .join(format!("{stem}.md"))
}

pub fn write_human_snapshot(path: &Path, markdown: &str) -> Result<(), RecorderError> {
    let io_err = |e: std::io::Error| RecorderError::Io {
        path: path.display().to_string(),
        cause: e.to_string(),
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(io_err)?;
    }
    std::fs::write(path, markdown).map_err(io_err)
}

/// Render every narrative of one test file, in the order the tests finished.
pub fn render_markdown(file_title: &str, narratives: &[TestNarrative]) -> String {
    let mut md = String::new();
    md.push_str(&format!("# {file_title}\n\n"));
    for narrative in narratives {
        md.push_str(&render_scenario(&narrative.test_title, &narrative.scenario));
    }
    md
}

fn render_scenario(test_title: &str, scenario: &RecordedScenario) -> String {
    let mut md = String::new();
    md.push_str(&format!("## {}\n\n", scenario.name));
    if test_title != scenario.name {
        md.push_str(&format!("_Test_: {test_title}\n\n"));
    }

    md.push_str("```mermaid\n");
    md.push_str(&SequenceDiagram::for_scenario(scenario).to_mermaid());
    md.push_str("```\n\n");

    let mut previous: Option<&Balances> = None;
    let mut step = 0;
    for entry in &scenario.entries {
        match entry.kind {
            EntryKind::InitialState => {
                md.push_str("### Initial state\n\n");
                md.push_str(&balances_table(scenario, &entry.balances));
            }
            EntryKind::MethodCall => {
                step += 1;
                md.push_str(&render_call(step, scenario, entry, previous));
            }
        }
        previous = Some(&entry.balances);
    }
    md
}

fn render_call(
    step: usize,
    scenario: &RecordedScenario,
    entry: &LogEntry,
    previous: Option<&Balances>,
) -> String {
    let mut md = String::new();
    let caller = entry.caller.as_deref().unwrap_or_default();
    let contract = entry.contract.as_deref().unwrap_or_default();
    let method = entry.method_name().unwrap_or_default();
    md.push_str(&format!(
        "### {step}. {caller} calls {contract}.{method}\n\n"
    ));

    if let Some(descriptor) = &entry.method {
        if !entry.args.is_empty() {
            let args = verbose_args(descriptor, &entry.args);
            md.push_str("**Arguments**\n\n```json\n");
            md.push_str(&serde_json::to_string_pretty(&args).unwrap_or_default());
            md.push_str("\n```\n\n");
        }
    }

    if !entry.events.is_empty() {
        md.push_str("**Events**\n\n");
        for event in &entry.events {
            let args: Vec<String> = event.args.iter().map(stringify_arg).collect();
            md.push_str(&format!(
                "- {}.{}({})\n",
                event.contract,
                event.name,
                args.join(", ")
            ));
        }
        md.push('\n');
    }

    let changes = balance_changes(scenario, previous, &entry.balances);
    if changes.is_empty() {
        md.push_str("No balance changes.\n\n");
    } else {
        md.push_str("**Balance changes**\n\n");
        md.push_str("| Token | Holder | Before | After | Change |\n");
        md.push_str("|-------|--------|--------|-------|--------|\n");
        for row in changes {
            md.push_str(&row);
        }
        md.push('\n');
    }

    if let Some(state) = &entry.custom_state {
        md.push_str("**Custom state**\n\n```json\n");
        md.push_str(&serde_json::to_string_pretty(state).unwrap_or_default());
        md.push_str("\n```\n\n");
    }
    md
}

fn amount(scenario: &RecordedScenario, token: &str, value: U256) -> String {
    match scenario.token_decimals.get(token) {
        Some(d) => format_amount(value, *d),
        None => value.to_string(),
    }
}

fn balances_table(scenario: &RecordedScenario, balances: &Balances) -> String {
    let mut md = String::new();
    let rows: Vec<String> = balances
        .iter()
        .flat_map(|(token, holders)| {
            holders
                .iter()
                .filter(|(_, v)| !v.is_zero())
                .map(move |(holder, v)| {
                    format!("| {token} | {holder} | {} |\n", amount(scenario, token, *v))
                })
        })
        .collect();
    if rows.is_empty() {
        md.push_str("All tracked balances are zero.\n\n");
        return md;
    }
    md.push_str("| Token | Holder | Balance |\n");
    md.push_str("|-------|--------|---------|\n");
    for row in rows {
        md.push_str(&row);
    }
    md.push('\n');
    md
}

/// Table rows for holders whose balance differs from the previous snapshot.
///
/// Without a previous snapshot every non-zero balance counts as a change.
fn balance_changes(
    scenario: &RecordedScenario,
    previous: Option<&Balances>,
    current: &Balances,
) -> Vec<String> {
    let mut rows = Vec::new();
    for (token, holders) in current {
        for (holder, after) in holders {
            let before = previous
                .and_then(|p| p.get(token))
                .and_then(|h| h.get(holder))
                .copied()
                .unwrap_or_default();
            if before == *after {
                continue;
            }
            let decimals = scenario.token_decimals.get(token).copied();
            rows.push(format!(
                "| {token} | {holder} | {} | {} | {} |\n",
                amount(scenario, token, before),
                amount(scenario, token, *after),
                format_delta(before, *after, decimals)
            ));
        }
    }
    rows
}
