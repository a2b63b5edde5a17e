// Enforcement: the only part of the engine with external side effects.

pub mod coordinator;
pub mod dry_run;
pub mod traits;

pub use coordinator::{
    ActionKind, ActionOutcome, ActionRecord, EnforcementContext, EnforcementCoordinator,
    EnforcementResult,
};
pub use dry_run::{DryRunPlatform, PlatformCall, RecordedCall};
pub use traits::{Advisory, PlatformActions};
