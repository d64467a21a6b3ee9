pub mod engine;

pub use engine::AlertRuleEngine;
