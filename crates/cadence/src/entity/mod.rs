//! Database entities.

pub mod job;
pub mod prelude;
pub mod rate_limit_state;
pub mod step;
pub mod workflow_run;
