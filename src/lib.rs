// Sentinel: multi-tenant chat moderation engine
//
// This is the library root. Each module corresponds to a major subsystem
// of the moderation pipeline: policy, detection, enforcement.

pub mod config;
pub mod db;
pub mod detect;
pub mod enforce;
pub mod engine;
pub mod events;
pub mod output;
pub mod policy;
pub mod status;
pub mod verdict;

pub use engine::{Engine, EngineSettings, Outcome};
