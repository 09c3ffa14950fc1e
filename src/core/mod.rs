//! Core logic: rule model, relation index, mutation engine, filtering.

pub mod engine;
pub mod filter;
pub mod relations;
pub mod rule;

pub use engine::{Enforcer, ReloadScope, RuleEngine};
pub use filter::{filter_rules, FilterResult, RuleFilter};
pub use relations::RelationIndex;
pub use rule::{Category, DiscoveredApp, Rule, RuleDefaults};
