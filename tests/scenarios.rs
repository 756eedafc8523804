//! End-to-end scenarios over the scripted chain.

use alloy_primitives::U256;
use integration_tests::harness::{wait_for, TestNode};
use pisa_chain::test_utils::make_block;
use pisa_config::ResponderConfig;
use pisa_responder::test_utils::{make_appointment, response_transaction};

fn config(confirmations_required: u64, watcher_confirmations: u64) -> ResponderConfig {
    ResponderConfig::new(
        Some(5),
        Some(15),
        Some(confirmations_required),
        Some(50),
        Some(U256::from(1_000u64)),
        Some(watcher_confirmations),
    )
    .unwrap()
}

#[tokio::test]
async fn test_single_appointment_happy_path() {
    let node = TestNode::fresh(&config(5, 2)).await;
    let appointment = make_appointment(1);

    // Start responding: one item at nonce 0, exactly one broadcast.
    node.responder.start_response(appointment.clone()).await.unwrap();
    let queue = node.responder.queue_snapshot().await;
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.head().unwrap().nonce, 0);
    assert_eq!(node.chain.sent_transactions().len(), 1);

    // The response mines at height 101; the component dequeues it with no
    // further broadcast.
    let response = response_transaction(&appointment, node.responder.address(), 0);
    node.mine(make_block(101, 2, 1, vec![response])).await;

    let responder = node.responder.clone();
    wait_for(|| {
        let responder = responder.clone();
        async move { responder.queue_snapshot().await.is_empty() }
    })
    .await;
    assert_eq!(node.chain.sent_transactions().len(), 1);
    // Still tracked until the confirmation window passes.
    assert!(node.responder.tracked().contains(&appointment.id));

    // Confirmation depth 6 > 5 at height 107: the record is forgotten.
    for (offset, id) in (3u8..=8).enumerate() {
        node.mine(make_block(102 + offset as u64, id, id - 1, vec![])).await;
    }

    let responder = node.responder.clone();
    wait_for(|| {
        let responder = responder.clone();
        async move { responder.tracked().is_empty() }
    })
    .await;
    // The queue saw no further traffic.
    assert_eq!(node.chain.sent_transactions().len(), 1);
    assert_eq!(node.responder.queue_snapshot().await.empty_nonce(), 1);
}

#[tokio::test]
async fn test_reorg_evicts_and_reenqueues_response() {
    let node = TestNode::fresh(&config(10, 2)).await;
    let appointment = make_appointment(1);
    let identifier = appointment.response_data.identifier();

    node.responder.start_response(appointment.clone()).await.unwrap();

    // Mined at height 101 on the original branch.
    let response = response_transaction(&appointment, node.responder.address(), 0);
    node.mine(make_block(101, 2, 1, vec![response])).await;
    let responder = node.responder.clone();
    wait_for(|| {
        let responder = responder.clone();
        async move { responder.queue_snapshot().await.is_empty() }
    })
    .await;
    node.chain.clear_sent_transactions();

    // A competing branch without the response wins: 101' and 102'.
    node.chain.extend_canonical(make_block(101, 12, 1, vec![]));
    node.mine(make_block(102, 13, 12, vec![])).await;

    // The reducer re-derives Pending, the re-enqueue puts the response
    // back at its recorded nonce and rebroadcasts exactly once.
    let responder = node.responder.clone();
    let wanted = identifier.clone();
    wait_for(|| {
        let responder = responder.clone();
        let wanted = wanted.clone();
        async move { responder.queue_snapshot().await.contains(&wanted) }
    })
    .await;
    let queue = node.responder.queue_snapshot().await;
    assert_eq!(queue.head().unwrap().nonce, 0);
    assert_eq!(node.chain.sent_transactions().len(), 1);
}

#[tokio::test]
async fn test_crash_recovery_restores_queue_and_state() {
    let chain = std::sync::Arc::new(pisa_chain::test_utils::make_chain(100, 1));
    let db = sled::Config::new().temporary(true).open().unwrap();

    let mut node = TestNode::start(&config(5, 2), chain.clone(), db.clone()).await;

    // Build a queue whose insertion re-priced every slot.
    node.estimator.set_price(100);
    node.responder.start_response(make_appointment(1)).await.unwrap();
    node.estimator.set_price(90);
    node.responder.start_response(make_appointment(2)).await.unwrap();
    node.estimator.set_price(110);
    node.responder.start_response(make_appointment(3)).await.unwrap();

    let before = node.responder.queue_snapshot().await;
    let prices: Vec<u64> = before
        .items()
        .iter()
        .map(|item| item.nonce_gas_price.to::<u64>())
        .collect();
    assert_eq!(prices, vec![115, 115, 104]);

    // Crash before any of those broadcasts landed.
    node.shutdown();
    drop(node);

    let node = TestNode::start(&config(5, 2), chain, db).await;

    // Same queue, same prices, same nonces; the synthetic head re-derived
    // a consistent state and the re-enqueue action found nothing missing.
    let after = node.responder.queue_snapshot().await;
    assert_eq!(after, before);
    assert_eq!(node.responder.tracked().len(), 3);

    let nonces: Vec<u64> = after.items().iter().map(|item| item.nonce).collect();
    assert_eq!(nonces, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_watcher_triggers_response_after_confirmations() {
    let node = TestNode::fresh(&config(5, 2)).await;
    let appointment = make_appointment(1);
    let identifier = appointment.response_data.identifier();

    // Arm against a third-party transaction's fingerprint.
    let trigger = make_appointment(9).response_data.identifier();
    node.watcher.arm(appointment, trigger);

    // Trigger lands at 101; depth 0 and 1 are not enough.
    let trigger_tx = response_transaction(
        &make_appointment(9),
        alloy_primitives::Address::repeat_byte(0x77),
        3,
    );
    node.mine(make_block(101, 2, 1, vec![trigger_tx])).await;
    node.mine(make_block(102, 3, 2, vec![])).await;
    assert!(node.responder.queue_snapshot().await.is_empty());

    // Depth 2: the watcher hands the appointment to the responder.
    node.mine(make_block(103, 4, 3, vec![])).await;

    let responder = node.responder.clone();
    let wanted = identifier.clone();
    wait_for(|| {
        let responder = responder.clone();
        let wanted = wanted.clone();
        async move { responder.queue_snapshot().await.contains(&wanted) }
    })
    .await;
    assert_eq!(node.watcher.armed_count(), 0);
    assert_eq!(node.chain.sent_transactions().len(), 1);
}
