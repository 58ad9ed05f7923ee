mod engine;
pub mod rules;

pub use engine::{evaluate, MatchDecision};
pub use rules::{FilterRule, Target};
