//! Rule mutation engine.
//!
//! `RuleEngine` is the sole mutation path for rule attributes. It enforces
//! the sparse-delta invariant against the override store, propagates
//! changes across shared-identity rules, and signals the enforcement
//! collaborator once per committed change.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::core::relations::RelationIndex;
use crate::core::rule::{Category, DiscoveredApp, Rule};
use crate::db::Database;
use crate::error::RuleError;

/// Which live rules the enforcement collaborator must re-derive after a
/// committed change. `All` is used for screen/roaming exemption changes,
/// which affect both network categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadScope {
    Wifi,
    Other,
    All,
}

impl Category {
    /// The reload scope a change to this category requires.
    pub fn reload_scope(&self) -> ReloadScope {
        match self {
            Category::WifiBlocked => ReloadScope::Wifi,
            Category::OtherBlocked => ReloadScope::Other,
            Category::ScreenWifi | Category::ScreenOther | Category::Roaming => ReloadScope::All,
        }
    }
}

/// Seam to the enforcement collaborator. Receives one reload signal per
/// committed change; re-reads current rule state and applies it to live
/// traffic. The engine has no visibility into when enforcement completes.
pub trait Enforcer: Send + Sync {
    fn reload(&self, scope: ReloadScope);
}

/// Owns the working rule set for one load cycle.
pub struct RuleEngine {
    rules: Vec<Rule>,
    by_package: HashMap<String, usize>,
    relations: RelationIndex,
    store: Arc<Database>,
    enforcer: Arc<dyn Enforcer>,
}

impl RuleEngine {
    /// Build the working rule set from a discovery snapshot plus stored
    /// deltas.
    ///
    /// Never fails: a namespace that cannot be read is treated as empty
    /// (those customizations revert to default), logged for diagnosis.
    /// Duplicate package names in the snapshot are logged and skipped.
    pub fn load(
        apps: &[DiscoveredApp],
        store: Arc<Database>,
        enforcer: Arc<dyn Enforcer>,
    ) -> Self {
        let mut stored: HashMap<Category, HashMap<String, bool>> = HashMap::new();
        for category in Category::ALL {
            match store.load_overrides(category) {
                Ok(map) => {
                    stored.insert(category, map);
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to load {} overrides, using defaults: {e:#}",
                        category.as_str()
                    );
                    stored.insert(category, HashMap::new());
                }
            }
        }

        let mut rules: Vec<Rule> = Vec::with_capacity(apps.len());
        let mut by_package: HashMap<String, usize> = HashMap::with_capacity(apps.len());
        for app in apps {
            if by_package.contains_key(&app.package_name) {
                tracing::warn!("Duplicate package {} in discovery snapshot, skipping", app.package_name);
                continue;
            }

            let mut rule = Rule::from_discovery(app);
            for category in Category::ALL {
                if let Some(&value) = stored[&category].get(&rule.package_name) {
                    rule.set_current(category, value);
                }
            }
            by_package.insert(rule.package_name.clone(), rules.len());
            rules.push(rule);
        }

        let relations =
            RelationIndex::build(rules.iter().map(|r| (r.package_name.as_str(), r.uid)));
        for rule in &mut rules {
            rule.related = relations.related_of(&rule.package_name).to_vec();
        }

        tracing::info!(
            "Loaded {} rules, {} in shared-identity groups",
            rules.len(),
            relations.len()
        );

        Self {
            rules,
            by_package,
            relations,
            store,
            enforcer,
        }
    }

    /// The full working rule set, in discovery order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Look up one rule by package name.
    pub fn get(&self, package: &str) -> Option<&Rule> {
        self.by_package.get(package).map(|&i| &self.rules[i])
    }

    /// Cheap immutable snapshot for handoff to the filter worker or the
    /// presentation layer.
    pub fn snapshot(&self) -> Arc<Vec<Rule>> {
        Arc::new(self.rules.clone())
    }

    /// Apply an attribute change to one rule and its shared-identity group.
    ///
    /// Sets the current value, persists the delta sparsely, mirrors the
    /// triggering value to every related rule (each persisted against its
    /// own default), and emits exactly one reload signal. When the changed
    /// category is a block kind, the triggering rule's screen and roaming
    /// exemptions are mirrored to related rules as well, keeping the whole
    /// identity group's attribute set in lock-step.
    ///
    /// A persistence failure for an individual key does not abort the
    /// change or its propagation; a related package absent from the
    /// working set is a no-op.
    pub fn apply_change(
        &mut self,
        package: &str,
        category: Category,
        value: bool,
    ) -> Result<(), RuleError> {
        let index = *self
            .by_package
            .get(package)
            .ok_or_else(|| RuleError::UnknownPackage(package.to_string()))?;

        self.update_one(index, category, value);

        let related = self.relations.related_of(package).to_vec();
        if !related.is_empty() {
            // Snapshot the triggering rule's exemptions before touching the
            // group; mirroring always uses the triggering rule's values.
            let trigger = &self.rules[index];
            let mirrored: Vec<(Category, bool)> = if category.is_block() {
                [Category::ScreenWifi, Category::ScreenOther, Category::Roaming]
                    .iter()
                    .map(|&c| (c, trigger.current(c)))
                    .collect()
            } else {
                Vec::new()
            };

            for related_package in related {
                let Some(&related_index) = self.by_package.get(&related_package) else {
                    tracing::debug!("Related package {related_package} not in current rule set");
                    continue;
                };
                self.update_one(related_index, category, value);
                for &(mirror_category, mirror_value) in &mirrored {
                    self.update_one(related_index, mirror_category, mirror_value);
                }
            }
        }

        self.enforcer.reload(category.reload_scope());
        Ok(())
    }

    /// Set one rule's current value and persist the delta. Persistence
    /// failures are logged per key; in-memory state is updated regardless,
    /// so enforcement keeps working until the next full reload.
    fn update_one(&mut self, index: usize, category: Category, value: bool) {
        let rule = &mut self.rules[index];
        rule.set_current(category, value);
        let default = rule.default_for(category);
        if let Err(e) = self.store.set_override(category, &rule.package_name, value, default) {
            tracing::warn!(
                "Failed to persist {} override for {}: {e:#}",
                category.as_str(),
                rule.package_name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::rule::RuleDefaults;

    /// Records every reload signal for assertion.
    struct RecordingEnforcer {
        signals: Mutex<Vec<ReloadScope>>,
    }

    impl RecordingEnforcer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                signals: Mutex::new(Vec::new()),
            })
        }

        fn signals(&self) -> Vec<ReloadScope> {
            self.signals.lock().unwrap().clone()
        }
    }

    impl Enforcer for RecordingEnforcer {
        fn reload(&self, scope: ReloadScope) {
            self.signals.lock().unwrap().push(scope);
        }
    }

    fn make_app(package: &str, uid: u32, defaults: RuleDefaults) -> DiscoveredApp {
        DiscoveredApp {
            package_name: package.to_string(),
            uid,
            display_name: Some(package.rsplit('.').next().unwrap().to_string()),
            is_system: false,
            has_internet: true,
            is_disabled: false,
            defaults,
        }
    }

    fn make_store() -> Arc<Database> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "netguard_rules=info".into()),
            )
            .with_test_writer()
            .try_init();
        Arc::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_apply_change_stores_delta_and_signals_wifi() {
        let store = make_store();
        let enforcer = RecordingEnforcer::new();
        let apps = [make_app("com.example.app", 1000, RuleDefaults::default())];
        let mut engine = RuleEngine::load(&apps, Arc::clone(&store), enforcer.clone());

        engine.apply_change("com.example.app", Category::WifiBlocked, true).unwrap();

        assert!(engine.get("com.example.app").unwrap().wifi_blocked);
        assert_eq!(
            store.get_override(Category::WifiBlocked, "com.example.app").unwrap(),
            Some(true)
        );
        assert_eq!(enforcer.signals(), vec![ReloadScope::Wifi]);

        // Back to default: row removed, second signal emitted.
        engine.apply_change("com.example.app", Category::WifiBlocked, false).unwrap();
        assert_eq!(
            store.get_override(Category::WifiBlocked, "com.example.app").unwrap(),
            None
        );
        assert_eq!(enforcer.signals(), vec![ReloadScope::Wifi, ReloadScope::Wifi]);
    }

    #[test]
    fn test_exemption_change_signals_all() {
        let store = make_store();
        let enforcer = RecordingEnforcer::new();
        let apps = [make_app("com.example.app", 1000, RuleDefaults::default())];
        let mut engine = RuleEngine::load(&apps, store, enforcer.clone());

        engine.apply_change("com.example.app", Category::ScreenWifi, true).unwrap();
        engine.apply_change("com.example.app", Category::Roaming, true).unwrap();

        assert_eq!(enforcer.signals(), vec![ReloadScope::All, ReloadScope::All]);
    }

    #[test]
    fn test_unknown_package_is_rejected() {
        let store = make_store();
        let enforcer = RecordingEnforcer::new();
        let mut engine = RuleEngine::load(&[], store, enforcer.clone());

        let err = engine
            .apply_change("com.missing", Category::WifiBlocked, true)
            .unwrap_err();
        assert_eq!(err.kind(), "UnknownPackage");
        assert!(enforcer.signals().is_empty());
    }

    #[test]
    fn test_propagation_mirrors_current_against_own_default() {
        let store = make_store();
        let enforcer = RecordingEnforcer::new();
        // pkgA defaults wifi unblocked, pkgB defaults wifi blocked; same uid.
        let apps = [
            make_app("com.pkg.a", 2000, RuleDefaults::default()),
            make_app(
                "com.pkg.b",
                2000,
                RuleDefaults {
                    wifi_blocked: true,
                    ..RuleDefaults::default()
                },
            ),
        ];
        let mut engine = RuleEngine::load(&apps, Arc::clone(&store), enforcer.clone());

        engine.apply_change("com.pkg.a", Category::WifiBlocked, true).unwrap();

        // Both currents mirror the triggering value.
        assert!(engine.get("com.pkg.a").unwrap().wifi_blocked);
        assert!(engine.get("com.pkg.b").unwrap().wifi_blocked);

        // pkgA deviates from its default: delta stored. pkgB matches its
        // own default: no delta.
        assert_eq!(store.get_override(Category::WifiBlocked, "com.pkg.a").unwrap(), Some(true));
        assert_eq!(store.get_override(Category::WifiBlocked, "com.pkg.b").unwrap(), None);

        // One signal for the whole group change.
        assert_eq!(enforcer.signals(), vec![ReloadScope::Wifi]);
    }

    #[test]
    fn test_block_change_mirrors_exemptions_to_related() {
        let store = make_store();
        let enforcer = RecordingEnforcer::new();
        let apps = [
            make_app("com.pkg.a", 2000, RuleDefaults::default()),
            make_app("com.pkg.b", 2000, RuleDefaults::default()),
        ];
        let mut engine = RuleEngine::load(&apps, Arc::clone(&store), enforcer.clone());

        // Give the triggering rule a screen-wifi exemption first.
        engine.apply_change("com.pkg.a", Category::ScreenWifi, true).unwrap();
        // pkgB mirrors it immediately (same category propagation).
        assert!(engine.get("com.pkg.b").unwrap().screen_wifi);

        // Diverge pkgB's roaming in place to simulate a stale group member,
        // then verify a block change re-syncs it.
        engine.rules[1].set_current(Category::Roaming, true);

        engine.apply_change("com.pkg.a", Category::OtherBlocked, true).unwrap();

        let b = engine.get("com.pkg.b").unwrap();
        assert!(b.other_blocked);
        assert!(b.screen_wifi);
        assert!(!b.roaming, "block change mirrors the trigger's roaming value");
        assert_eq!(
            enforcer.signals(),
            vec![ReloadScope::All, ReloadScope::Other]
        );
    }

    #[test]
    fn test_exemption_change_does_not_touch_block_flags() {
        let store = make_store();
        let enforcer = RecordingEnforcer::new();
        let apps = [
            make_app("com.pkg.a", 2000, RuleDefaults::default()),
            make_app("com.pkg.b", 2000, RuleDefaults::default()),
        ];
        let mut engine = RuleEngine::load(&apps, store, enforcer);

        engine.apply_change("com.pkg.a", Category::WifiBlocked, true).unwrap();
        engine.apply_change("com.pkg.a", Category::ScreenOther, true).unwrap();

        let b = engine.get("com.pkg.b").unwrap();
        assert!(b.wifi_blocked);
        assert!(b.screen_other);
        assert!(!b.other_blocked);
    }

    #[test]
    fn test_apply_change_is_idempotent() {
        let store = make_store();
        let enforcer = RecordingEnforcer::new();
        let apps = [
            make_app("com.pkg.a", 2000, RuleDefaults::default()),
            make_app("com.pkg.b", 2000, RuleDefaults::default()),
        ];
        let mut engine = RuleEngine::load(&apps, Arc::clone(&store), enforcer.clone());

        engine.apply_change("com.pkg.a", Category::WifiBlocked, true).unwrap();
        let first: Vec<Rule> = engine.rules().to_vec();

        engine.apply_change("com.pkg.a", Category::WifiBlocked, true).unwrap();

        for (a, b) in engine.rules().iter().zip(&first) {
            for category in Category::ALL {
                assert_eq!(a.current(category), b.current(category));
            }
        }
        assert_eq!(store.get_override(Category::WifiBlocked, "com.pkg.a").unwrap(), Some(true));
        assert_eq!(store.get_override(Category::WifiBlocked, "com.pkg.b").unwrap(), Some(true));
        // One signal per call, never per related rule.
        assert_eq!(enforcer.signals(), vec![ReloadScope::Wifi, ReloadScope::Wifi]);
    }

    #[test]
    fn test_missing_related_package_is_noop() {
        let store = make_store();
        let enforcer = RecordingEnforcer::new();
        let apps = [
            make_app("com.pkg.a", 2000, RuleDefaults::default()),
            make_app("com.pkg.b", 2000, RuleDefaults::default()),
        ];
        let mut engine = RuleEngine::load(&apps, store, enforcer.clone());

        // Simulate a momentarily inconsistent snapshot: the relation lists
        // a package the working set no longer contains.
        engine.by_package.remove("com.pkg.b");

        engine.apply_change("com.pkg.a", Category::WifiBlocked, true).unwrap();
        assert!(engine.get("com.pkg.a").unwrap().wifi_blocked);
        assert_eq!(enforcer.signals(), vec![ReloadScope::Wifi]);
    }

    #[test]
    fn test_load_applies_stored_deltas() {
        let store = make_store();
        store.set_override(Category::WifiBlocked, "com.pkg.a", true, false).unwrap();
        store.set_override(Category::Roaming, "com.pkg.a", true, false).unwrap();

        let apps = [make_app("com.pkg.a", 1000, RuleDefaults::default())];
        let engine = RuleEngine::load(&apps, store, RecordingEnforcer::new());

        let rule = engine.get("com.pkg.a").unwrap();
        assert!(rule.wifi_blocked);
        assert!(rule.roaming);
        assert!(!rule.other_blocked);
    }

    #[test]
    fn test_default_change_transparency() {
        let store = make_store();
        let apps_before = [make_app("com.pkg.a", 1000, RuleDefaults::default())];
        {
            let engine = RuleEngine::load(&apps_before, Arc::clone(&store), RecordingEnforcer::new());
            assert!(!engine.get("com.pkg.a").unwrap().wifi_blocked);
        }

        // Global policy flips the computed default; no delta was ever
        // stored, so the new default takes effect with zero writes.
        let apps_after = [make_app(
            "com.pkg.a",
            1000,
            RuleDefaults {
                wifi_blocked: true,
                ..RuleDefaults::default()
            },
        )];
        let engine = RuleEngine::load(&apps_after, Arc::clone(&store), RecordingEnforcer::new());
        assert!(engine.get("com.pkg.a").unwrap().wifi_blocked);
        assert_eq!(store.get_override(Category::WifiBlocked, "com.pkg.a").unwrap(), None);
    }

    #[test]
    fn test_load_skips_duplicate_packages() {
        let store = make_store();
        let apps = [
            make_app("com.pkg.a", 1000, RuleDefaults::default()),
            make_app("com.pkg.a", 1001, RuleDefaults::default()),
        ];
        let engine = RuleEngine::load(&apps, store, RecordingEnforcer::new());

        assert_eq!(engine.rules().len(), 1);
        assert_eq!(engine.get("com.pkg.a").unwrap().uid, 1000);
    }

    #[test]
    fn test_load_populates_related_on_rules() {
        let store = make_store();
        let apps = [
            make_app("com.pkg.a", 2000, RuleDefaults::default()),
            make_app("com.pkg.b", 2000, RuleDefaults::default()),
            make_app("com.pkg.c", 3000, RuleDefaults::default()),
        ];
        let engine = RuleEngine::load(&apps, store, RecordingEnforcer::new());

        assert_eq!(engine.get("com.pkg.a").unwrap().related, ["com.pkg.b"]);
        assert_eq!(engine.get("com.pkg.b").unwrap().related, ["com.pkg.a"]);
        assert!(engine.get("com.pkg.c").unwrap().related.is_empty());
    }
}
