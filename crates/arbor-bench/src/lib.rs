//! Benchmark profiles for the Arbor simulation kernel.
//!
//! - [`colony_profile`]: a population of growing, dividing agents
//! - [`wide_store`]: one branch with many accumulate leaves

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use arbor_core::{BranchUpdate, Composite, LeafSchema, Path, Schema, StoreError, Update, Value};
use arbor_engine::ExperimentConfig;
use arbor_store::Store;
use arbor_test_utils::agent_composite;

/// `agents` dividing agents under `agents/`, each starting at mass 1.0
/// and growing at `rate` per unit time until it divides at mass 4.0.
pub fn colony_profile(agents: usize, rate: f64, seed: u64) -> ExperimentConfig {
    let mut composite = Composite::new();
    for i in 0..agents {
        let id = format!("a{i}");
        let agent = agent_composite(&id, rate, 4.0)
            .with_initial_state([("mass", 1.0)].into_iter().collect::<Value>());
        composite.merge_at(&Path::from(["agents", id.as_str()]), agent);
    }
    let mut config = ExperimentConfig::new(composite);
    config.seed = seed;
    config.experiment_id = format!("colony-{agents}");
    config
}

/// A store with `leaves` float leaves under `cell/`.
pub fn wide_store(leaves: usize) -> Result<Store, StoreError> {
    let schema = (0..leaves).fold(Schema::branch(), |s, i| {
        s.with_leaf(format!("m{i}"), LeafSchema::new().with_default(0.0))
    });
    let mut store = Store::default();
    let root = store.root();
    let cell = store.establish_path(root, &Path::parse("cell"))?;
    store.apply_config(cell, &schema)?;
    Ok(store)
}

/// One write to every leaf of a [`wide_store`].
pub fn wide_update(leaves: usize) -> Update {
    (0..leaves)
        .fold(BranchUpdate::new(), |u, i| u.with_write(format!("m{i}"), 1.0))
        .into()
}
