// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::collections::HashSet;

use registrar::testing::{ScriptedBroadcast, TestHarness};
use registrar::workflow::{RegistrationOutcome, RegistrationRequest};
use serde_json::json;

fn request(index: usize) -> RegistrationRequest {
    RegistrationRequest {
        metadata: json!({ "name": format!("Record {index}") }),
        owner_wallet: Some(format!("like1owner{index}")),
        requester: "load-test".to_string(),
        claim: true,
        ..RegistrationRequest::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_use_distinct_sequences() {
    let harness = TestHarness::builder().build();
    let count = 16;

    let mut tasks = Vec::with_capacity(count);
    for index in 0..count {
        let registrar = harness.registrar.clone();
        tasks.push(tokio::spawn(
            async move { registrar.register(request(index)).await },
        ));
    }

    let mut hashes = HashSet::new();
    let mut transfers = Vec::new();
    for task in tasks {
        let outcome = task.await.expect("join").expect("register");
        let RegistrationOutcome::Registered(registration) = outcome else {
            panic!("expected registration");
        };
        assert!(registration.receipt.iscn_id.is_some());
        assert!(hashes.insert(registration.receipt.tx_hash.clone()));
        transfers.extend(registration.transfer);
    }
    for transfer in transfers {
        transfer.await.expect("transfer task");
    }

    // One record broadcast and one ownership transfer per request.
    let mut accepted = harness.ledger.accepted_sequences();
    accepted.sort_unstable();
    let first = TestHarness::INITIAL_SEQUENCE;
    assert_eq!(accepted, (first..first + 2 * count as u64).collect::<Vec<_>>());
    // Identity resolution plus the first sequence fetch, never per request.
    assert_eq!(harness.ledger.account_queries(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn external_sequence_drift_is_absorbed() {
    let harness = TestHarness::builder().build();
    // Another process spends sequences 10..=14 with the same key before our
    // first broadcast lands.
    harness.ledger.script(ScriptedBroadcast::SequenceMismatch {
        chain_sequence: Some(15),
    });

    let outcome = harness
        .registrar
        .register(RegistrationRequest {
            claim: false,
            ..request(0)
        })
        .await
        .expect("register after resync");

    let RegistrationOutcome::Registered(registration) = outcome else {
        panic!("expected registration");
    };
    assert_eq!(registration.receipt.tx_hash, harness.ledger_hash(15));
    assert_eq!(harness.ledger.attempted_sequences(), vec![10, 15]);
    assert_eq!(harness.registrar.sequencer().stats().snapshot().resyncs, 1);
}
