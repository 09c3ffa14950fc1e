//! Per-application network access rules.
//!
//! For every installed application this crate tracks whether network
//! access is blocked on Wi-Fi and on other networks, whether those blocks
//! are suppressed while the screen is on, and whether roaming access is
//! allowed — and keeps applications that share an execution identity in
//! lock-step. Only deviations from the computed defaults are persisted,
//! so storage stays proportional to the number of user customizations.
//!
//! The crate computes rule state and emits reload signals; applying rules
//! to live traffic, discovering installed applications, and rendering are
//! the callers' concerns:
//!
//! - discovery supplies [`DiscoveredApp`] snapshots to [`RuleEngine::load`],
//! - user intent flows through [`RuleEngine::apply_change`],
//! - an [`Enforcer`] implementation receives one reload signal per change,
//! - [`RuleFilter`] derives the visible subset for a query without
//!   blocking the caller.

pub mod config;
pub mod core;
pub mod db;
pub mod error;

pub use crate::core::{
    filter_rules, Category, DiscoveredApp, Enforcer, FilterResult, ReloadScope, Rule,
    RuleDefaults, RuleEngine, RuleFilter,
};
pub use crate::db::Database;
pub use crate::error::RuleError;
