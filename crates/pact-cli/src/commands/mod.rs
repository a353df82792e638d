pub mod backup;
pub mod common;
pub mod completions;
pub mod conflicts;
pub mod metrics;
pub mod permissions;
pub mod queue;
pub mod relationships;
pub mod sync;
