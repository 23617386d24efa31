//! Decoding, attribution and custom state tests.
//!
//! Tests:
//! - nested call arguments get their addresses replaced by aliases
//! - undecodable payloads and untracked targets fail the scenario at end
//! - events shared by two tracked interfaces go to the first registered
//! - custom extractors run per call and their failure fails the scenario

use std::sync::Arc;

use ethereum_types::U256;
use serde_json::json;

use super::helpers::*;
use crate::abi::Abi;
use crate::config::RecorderConfig;
use crate::error::RecorderError;
use crate::extractor::{ExtractorError, extractor_fn};
use crate::provider::Submit;
use crate::record::Arg;
use crate::registry::normalize_address;
use crate::types::{Receipt, TransactionRequest};

#[tokio::test]
async fn test_nested_arguments_are_aliased() {
    let chain = MockChain::new();
    let (mut scenario, entrypoint) =
        scenario_with(&chain, scenario_config(), RecorderConfig::default());

    scenario.start().await.unwrap();
    entrypoint
        .send_transaction(batch_call(ALICE, &[(BOB, 10), (CAROL, 20)]))
        .await
        .unwrap();
    let recorded = scenario.end().await.unwrap();

    let entry = &recorded.entries[1];
    assert_eq!(entry.method_name(), Some("batch"));
    let Arg::List(items) = &entry.args[0] else {
        panic!("expected a list, got {:?}", entry.args[0]);
    };
    let Arg::Struct(first) = &items[0] else {
        panic!("expected a struct, got {:?}", items[0]);
    };
    assert_eq!(first["to"], Arg::text("bob"));
    assert_eq!(first["amount"], Arg::Uint(U256::from(10)));
    let Arg::Struct(second) = &items[1] else {
        panic!("expected a struct, got {:?}", items[1]);
    };
    // carol is not registered, so she keeps her normalized address.
    assert_eq!(second["to"], Arg::Text(normalize_address(&addr(CAROL))));

    let snapshot = recorded.snapshot().unwrap();
    assert_eq!(snapshot[1]["args"][0][0], json!({ "to": "bob", "amount": "10" }));
}

#[tokio::test]
async fn test_unknown_selector_fails_at_end() {
    let chain = MockChain::new();
    let (mut scenario, entrypoint) =
        scenario_with(&chain, scenario_config(), RecorderConfig::default());

    scenario.start().await.unwrap();
    entrypoint
        .send_transaction(TransactionRequest::call(
            addr(ALICE),
            addr(TOKEN),
            vec![0xde, 0xad, 0xbe, 0xef],
        ))
        .await
        .unwrap();
    let err = scenario.end().await.unwrap_err();
    match err {
        RecorderError::Decode { target, reason } => {
            assert_eq!(target, "USDC");
            assert!(reason.contains("0xdeadbeef"), "reason: {reason}");
        }
        other => panic!("expected a decode error, got {other}"),
    }
}

#[tokio::test]
async fn test_untracked_target_fails_at_end() {
    let chain = MockChain::new();
    let (mut scenario, entrypoint) =
        scenario_with(&chain, scenario_config(), RecorderConfig::default());

    scenario.start().await.unwrap();
    // The send itself goes through; only the recording fails.
    entrypoint
        .send_transaction(TransactionRequest::call(
            addr(ALICE),
            addr(0x999),
            vec![0, 0, 0, 0],
        ))
        .await
        .unwrap();
    let err = scenario.end().await.unwrap_err();
    assert!(
        matches!(err, RecorderError::Decode { ref target, .. } if *target == normalize_address(&addr(0x999))),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_shared_event_goes_to_first_registered_interface() {
    let chain = MockChain::new();
    // A contract speaking ERC-20 is tried before the token itself.
    let config = scenario_config().contract("mirror", addr(0x3333), Arc::new(Abi::erc20()));
    let (mut scenario, entrypoint) = scenario_with(&chain, config, RecorderConfig::default());

    scenario.start().await.unwrap();
    entrypoint
        .send_transaction(transfer_call(ALICE, BOB, 9))
        .await
        .unwrap();
    let recorded = scenario.end().await.unwrap();

    let events = &recorded.entries[1].events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].contract, "mirror");
    assert_eq!(events[0].name, "Transfer");
}

#[tokio::test]
async fn test_custom_state_per_call() {
    let chain = MockChain::new();
    let config = scenario_config()
        .extractor(
            "block",
            extractor_fn(|receipt: Receipt| async move {
                Ok::<_, ExtractorError>(json!(receipt.block_number))
            }),
        )
        .extractor(
            "logCount",
            extractor_fn(|receipt: Receipt| async move {
                Ok::<_, ExtractorError>(json!(receipt.logs.len()))
            }),
        );
    let (mut scenario, entrypoint) = scenario_with(&chain, config, RecorderConfig::default());

    scenario.start().await.unwrap();
    let hash = entrypoint
        .send_transaction(deposit_call(ALICE, 1))
        .await
        .unwrap();
    let recorded = scenario.end().await.unwrap();

    let block_number = chain.receipt(hash).unwrap().block_number;
    let initial = &recorded.entries[0];
    assert!(initial.custom_state.is_none());

    let state = recorded.entries[1].custom_state.as_ref().unwrap();
    let keys: Vec<_> = state.keys().map(String::as_str).collect();
    assert_eq!(keys, ["block", "logCount"]);
    assert_eq!(state["block"], json!(block_number));
    assert_eq!(state["logCount"], json!(2));

    let snapshot = recorded.snapshot().unwrap();
    assert_eq!(snapshot[1]["customState"]["logCount"], json!(2));
}

#[tokio::test]
async fn test_failing_extractor_fails_scenario() {
    let chain = MockChain::new();
    let config = scenario_config().extractor(
        "oracle",
        extractor_fn(|_receipt: Receipt| async move {
            Err::<serde_json::Value, ExtractorError>("price feed offline".into())
        }),
    );
    let (mut scenario, entrypoint) = scenario_with(&chain, config, RecorderConfig::default());

    scenario.start().await.unwrap();
    entrypoint
        .send_transaction(transfer_call(ALICE, BOB, 1))
        .await
        .unwrap();
    let err = scenario.end().await.unwrap_err();
    match err {
        RecorderError::Extractor { name, cause } => {
            assert_eq!(name, "oracle");
            assert_eq!(cause, "price feed offline");
        }
        other => panic!("expected an extractor error, got {other}"),
    }
}

#[tokio::test]
async fn test_transfer_log_helper_matches_chain_output() {
    let chain = MockChain::new();
    let hash = chain
        .send_transaction(transfer_call(ALICE, BOB, 11))
        .await
        .unwrap();
    let receipt = chain.receipt(hash).unwrap();
    assert!(receipt.status);
    assert_eq!(
        receipt.logs,
        vec![transfer_log(addr(ALICE), addr(BOB), U256::from(11))]
    );
}
