//! Rule data model: override categories, computed defaults, and the
//! per-application rule state the engine mutates.

use serde::Serialize;

/// One of the five independent override kinds.
///
/// The two block kinds gate network access per network type; the three
/// exemption kinds refine an active block (allow while the screen is on,
/// allow while roaming).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    WifiBlocked,
    OtherBlocked,
    ScreenWifi,
    ScreenOther,
    Roaming,
}

impl Category {
    /// All categories, in persistence-namespace order.
    pub const ALL: [Category; 5] = [
        Category::WifiBlocked,
        Category::OtherBlocked,
        Category::ScreenWifi,
        Category::ScreenOther,
        Category::Roaming,
    ];

    /// The persisted namespace name for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::WifiBlocked => "wifi",
            Category::OtherBlocked => "other",
            Category::ScreenWifi => "screen_wifi",
            Category::ScreenOther => "screen_other",
            Category::Roaming => "roaming",
        }
    }

    /// Resolve a namespace name back to a category. Used by diagnostics only;
    /// engine code passes `Category` values directly.
    pub fn from_name(name: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.as_str() == name)
    }

    /// Whether this is one of the two network block kinds.
    pub fn is_block(&self) -> bool {
        matches!(self, Category::WifiBlocked | Category::OtherBlocked)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computed default value for each category, supplied by discovery at load
/// time. May change between loads (e.g. a global default-block policy flip).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuleDefaults {
    pub wifi_blocked: bool,
    pub other_blocked: bool,
    pub screen_wifi: bool,
    pub screen_other: bool,
    pub roaming: bool,
}

impl RuleDefaults {
    pub fn for_category(&self, category: Category) -> bool {
        match category {
            Category::WifiBlocked => self.wifi_blocked,
            Category::OtherBlocked => self.other_blocked,
            Category::ScreenWifi => self.screen_wifi,
            Category::ScreenOther => self.screen_other,
            Category::Roaming => self.roaming,
        }
    }
}

/// One installed application as reported by the discovery collaborator.
/// Treated as an opaque read-only snapshot per load cycle.
#[derive(Debug, Clone)]
pub struct DiscoveredApp {
    pub package_name: String,
    /// Numeric identity the application runs under; may be shared by
    /// several packages, which then form one relation group.
    pub uid: u32,
    pub display_name: Option<String>,
    pub is_system: bool,
    pub has_internet: bool,
    pub is_disabled: bool,
    pub defaults: RuleDefaults,
}

/// Per-application rule state.
///
/// Built from a `DiscoveredApp` plus any stored overrides at load time,
/// mutated in place by the engine for the process lifetime, discarded on
/// the next full reload.
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub package_name: String,
    pub uid: u32,
    pub display_name: Option<String>,
    pub is_system: bool,
    pub has_internet: bool,
    pub is_disabled: bool,
    pub wifi_blocked: bool,
    pub other_blocked: bool,
    pub screen_wifi: bool,
    pub screen_other: bool,
    pub roaming: bool,
    pub defaults: RuleDefaults,
    /// Other package names sharing this rule's uid. Empty if none.
    pub related: Vec<String>,
}

impl Rule {
    /// Build a rule whose current values all equal the computed defaults.
    /// Stored overrides are applied on top by the engine during load.
    pub fn from_discovery(app: &DiscoveredApp) -> Self {
        Self {
            package_name: app.package_name.clone(),
            uid: app.uid,
            display_name: app.display_name.clone(),
            is_system: app.is_system,
            has_internet: app.has_internet,
            is_disabled: app.is_disabled,
            wifi_blocked: app.defaults.wifi_blocked,
            other_blocked: app.defaults.other_blocked,
            screen_wifi: app.defaults.screen_wifi,
            screen_other: app.defaults.screen_other,
            roaming: app.defaults.roaming,
            defaults: app.defaults,
            related: Vec::new(),
        }
    }

    /// Current value for a category.
    pub fn current(&self, category: Category) -> bool {
        match category {
            Category::WifiBlocked => self.wifi_blocked,
            Category::OtherBlocked => self.other_blocked,
            Category::ScreenWifi => self.screen_wifi,
            Category::ScreenOther => self.screen_other,
            Category::Roaming => self.roaming,
        }
    }

    /// Computed default for a category.
    pub fn default_for(&self, category: Category) -> bool {
        self.defaults.for_category(category)
    }

    /// Whether the current value deviates from the computed default.
    /// True exactly when a delta is persisted for this (package, category).
    pub fn has_override(&self, category: Category) -> bool {
        self.current(category) != self.default_for(category)
    }

    pub(crate) fn set_current(&mut self, category: Category, value: bool) {
        match category {
            Category::WifiBlocked => self.wifi_blocked = value,
            Category::OtherBlocked => self.other_blocked = value,
            Category::ScreenWifi => self.screen_wifi = value,
            Category::ScreenOther => self.screen_other = value,
            Category::Roaming => self.roaming = value,
        }
    }
}
