// =============================================================================
// Execution module — order intent, leg sequencing, idempotent submission
// =============================================================================

pub mod executor;

pub use executor::{Executor, ExecutionResult, OrderIntent};
