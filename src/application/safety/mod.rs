pub mod state;

pub use state::{SafetyLimits, SafetyState};
