pub mod gate;
pub mod patterns;
pub mod sanitizer;

pub use gate::{SecurityGate, SecurityReport, SecurityViolation};
pub use patterns::{PatternCategory, PatternLibrary, PatternRule};
pub use sanitizer::{sanitize, SanitizedCommand};
