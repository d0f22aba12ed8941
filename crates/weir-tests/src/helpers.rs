//! Shared test helpers for the integration suites.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use weir_core::kv::{KvBackend, MemoryKv};
use weir_core::synthetic::SyntheticChain;
use weir_verify::{SmallStepConfig, SmallStepOutcome, SmallStepSync};

/// Derive a deterministic chain.
pub fn chain(seed: u64, blocks: u64) -> Arc<SyntheticChain> {
    Arc::new(SyntheticChain::generate(seed, blocks).unwrap())
}

/// Run the small-step synchronizer over a backend.
pub fn run_small_step(
    chain: &Arc<SyntheticChain>,
    backend: Arc<dyn KvBackend>,
    config: SmallStepConfig,
) -> SmallStepOutcome {
    let cancel = Arc::new(AtomicBool::new(false));
    let mut sync = SmallStepSync::new(chain.clone(), config, cancel).unwrap();
    sync.run(backend).unwrap()
}

/// One uninterrupted forward pass to `stop` on a fresh in-memory
/// backend, the baseline every churn run must converge to.
pub fn single_pass(chain: &Arc<SyntheticChain>, stop: u64) -> Arc<MemoryKv> {
    let backend = Arc::new(MemoryKv::new());
    let config = SmallStepConfig {
        stop_block: stop,
        unwind_depth: 0,
        unwind_every: stop.max(1),
        ..SmallStepConfig::default()
    };
    run_small_step(chain, backend.clone(), config);
    backend
}
