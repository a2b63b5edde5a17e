// Detectors: pure functions of (policy, event, window state) -> Verdict.
//
// None of them perform side effects beyond mutating their own window store.

pub mod content;
pub mod privileged;
pub mod rate;
pub mod window;

pub use content::ContentScanner;
pub use privileged::{ActionWindow, PrivilegedActionDetector, WEBHOOK_BURST};
pub use rate::{MessageRateDetector, MessageWindow};
pub use window::{WindowKey, WindowStore};
