//! No library surface — this crate only exists to host the integration
//! tests under `tests/`. See those for the cross-cutting boundary
//! scenarios (spec §8) and quantified invariants.
