//! Passes run by the mid-end pipelines, and the analyses they publish
//! through the pass context.

pub mod evaluator;
pub mod inlining;
pub mod move_declarations;
pub mod remove_returns;
pub mod resolve_references;
pub mod simplify_control_flow;
pub mod snapshot;
pub mod type_checker;
pub mod unique_names;
pub mod unused_declarations;
