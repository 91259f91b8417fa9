pub use super::job::Entity as Job;
pub use super::rate_limit_state::Entity as RateLimitState;
pub use super::step::Entity as Step;
pub use super::workflow_run::Entity as WorkflowRun;
