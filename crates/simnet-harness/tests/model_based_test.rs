//! Model-based property tests for the connection lifecycle.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!     ModelNetwork     SimWorld        Compare
//!     (reference)   (paused tokio)    Results
//! ```

use proptest::prelude::*;
use simnet_harness::{LifecycleError, ModelNetwork, NodeIndex, Operation, OperationResult, SimWorld};

/// Strategy for generating operations over `num_nodes` nodes.
fn operation_strategy(num_nodes: u8) -> impl Strategy<Value = Operation> {
    let node = 0..num_nodes;

    prop_oneof![
        3 => (node.clone(), node.clone()).prop_map(|(from, to)| Operation::Connect { from, to }),
        2 => (node.clone(), node).prop_map(|(from, to)| Operation::Disconnect { from, to }),
    ]
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime")
}

proptest! {
    /// Operation results, link sets, and journal counts match the model.
    #[test]
    fn prop_model_matches_sim(
        seed in any::<u64>(),
        num_nodes in 2..5usize,
        ops in prop::collection::vec(operation_strategy(5), 0..40)
    ) {
        let rt = paused_runtime();
        let mut model = ModelNetwork::new(num_nodes);

        rt.block_on(async {
            let real = SimWorld::new(num_nodes, seed);

            for (i, op) in ops.iter().enumerate() {
                let op = op.clamp(num_nodes);
                let model_result = model.apply(&op);
                let real_result = real.apply(&op).await;

                prop_assert_eq!(
                    model_result,
                    real_result,
                    "Divergence at operation {}: {:?}",
                    i, op
                );
                prop_assert_eq!(model.linked_pairs(), &real.linked_pairs());
            }

            prop_assert_eq!(model.expected_events(), real.events());
            Ok(())
        })?;
    }

    /// Connecting an already linked pair fails in either direction.
    #[test]
    fn prop_reconnect_rejected(from in 0..4u8, to in 0..4u8) {
        prop_assume!(from != to);
        let mut model = ModelNetwork::new(4);

        let connect = Operation::Connect { from, to };
        prop_assert!(model.apply(&connect).is_ok());
        prop_assert_eq!(
            model.apply(&Operation::Connect { from: to, to: from }),
            OperationResult::Error(LifecycleError::AlreadyConnected)
        );
    }
}

#[test]
fn disconnect_then_reconnect_matches_model() {
    let rt = paused_runtime();
    let ops: [(Operation, OperationResult); 5] = [
        (Operation::Connect { from: 0, to: 1 }, OperationResult::Ok),
        (Operation::Connect { from: 1, to: 1 }, OperationResult::Error(LifecycleError::SelfLink)),
        (Operation::Disconnect { from: 1, to: 0 }, OperationResult::Ok),
        (
            Operation::Disconnect { from: 0, to: 1 },
            OperationResult::Error(LifecycleError::AlreadyDisconnected),
        ),
        (Operation::Connect { from: 1, to: 0 }, OperationResult::Ok),
    ];

    rt.block_on(async {
        let real = SimWorld::new(2, 11);
        let mut model = ModelNetwork::new(2);
        for (op, expected) in ops {
            assert_eq!(model.apply(&op), expected, "model: {op:?}");
            assert_eq!(real.apply(&op).await, expected, "sim: {op:?}");
        }
        let linked: Vec<(NodeIndex, NodeIndex)> = real.linked_pairs().into_iter().collect();
        assert_eq!(linked, vec![(0, 1)]);
        assert_eq!(real.events(), (2, 2));
    });
}
