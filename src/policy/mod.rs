// Tenant policy: schema with defaults, and the store that serves it.

pub mod model;
pub mod store;

pub use model::{ContentRules, NukeLimits, Policy, Punishment, RateLimits};
pub use store::PolicyStore;
