//! Fuzz target for the connection lifecycle.
//!
//! Applies arbitrary connect/disconnect sequences to a simulated network
//! and to the reference model, under a paused clock.
//!
//! # Invariants
//!
//! - Every operation result matches the model
//! - The set of linked pairs matches the model after every operation
//! - Journal counts match the model at the end

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use simnet_harness::{ModelNetwork, Operation, SimWorld};

#[derive(Debug, Arbitrary)]
struct Input {
    seed: u64,
    num_nodes: u8,
    ops: Vec<Operation>,
}

fuzz_target!(|input: Input| {
    let num_nodes = usize::from(input.num_nodes % 4) + 2;
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime");

    rt.block_on(async {
        let real = SimWorld::new(num_nodes, input.seed);
        let mut model = ModelNetwork::new(num_nodes);

        for op in input.ops.iter().take(64) {
            let op = op.clamp(num_nodes);
            assert_eq!(model.apply(&op), real.apply(&op).await, "divergence on {op:?}");
            assert_eq!(model.linked_pairs(), &real.linked_pairs());
        }
        assert_eq!(model.expected_events(), real.events());
    });
});
