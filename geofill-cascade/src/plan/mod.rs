//! Bias plans
//!
//! A plan maps photo index ranges to free-text place hints. Two file shapes
//! exist and are told apart by structure alone:
//!
//! - single: `[{"range": [1, 10], "hint": "Tokyo, Japan"}, ...]`
//! - multi:  `[{"name": "day1", "path": "", "tags": [{"range": [1, 10], "hint": "..."}]}, ...]`

pub mod model;
pub mod resolver;

pub use model::{load_plan, parse_plan, FolderPlan, LoadedPlan, Plan, PlanEntry, PlanError};
pub use resolver::{
    hint_for_index, split_global_hints, BiasContext, HintCache, HintOrigin, PlanResolver,
};
