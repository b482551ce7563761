//! Property-based soundness tests.
//!
//! Run with: `cargo test --test property`

mod budget_respect;
mod partition_plan;
mod window_invariance;
