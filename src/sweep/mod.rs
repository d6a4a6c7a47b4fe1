// Sweep direction rules
pub mod classifier;
pub mod outcome;

pub use classifier::classify;
pub use outcome::{evaluate, percent_change};
