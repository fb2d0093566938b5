use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::catalogs::{
    has_attribute_prefix, is_builtin_attribute, is_builtin_filter, is_builtin_macro,
    INVALID_ATTRIBUTE_SENTINELS,
};
use crate::types::LatteVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameKind {
    Macro,
    Filter,
    Attribute,
}

/// Names contributed by a framework or project on top of the built-in catalogs.
pub trait ExtensionNames: Send + Sync {
    fn contains(&self, kind: NameKind, name: &str) -> bool;
}

/// Built-in names for one Latte version, unioned with an optional extension
/// provider. Nothing is cached: every lookup consults the provider, so a
/// provider that changes between passes is always seen fresh.
#[derive(Clone, Default)]
pub struct ValidNames {
    version: LatteVersion,
    extensions: Option<Arc<dyn ExtensionNames>>,
}

impl ValidNames {
    pub fn new(version: LatteVersion) -> Self {
        Self {
            version,
            extensions: None,
        }
    }

    pub fn with_extensions(mut self, extensions: Arc<dyn ExtensionNames>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn version(&self) -> LatteVersion {
        self.version
    }

    fn extension_has(&self, kind: NameKind, name: &str) -> bool {
        self.extensions
            .as_ref()
            .is_some_and(|ext| ext.contains(kind, name))
    }

    /// Tag name without a leading `/`.
    pub fn is_valid_macro(&self, name: &str) -> bool {
        is_builtin_macro(name, self.version) || self.extension_has(NameKind::Macro, name)
    }

    pub fn is_valid_filter(&self, name: &str) -> bool {
        is_builtin_filter(name, self.version) || self.extension_has(NameKind::Filter, name)
    }

    /// Full attribute name including the `n:` prefix.
    pub fn is_valid_attribute(&self, name: &str) -> bool {
        if INVALID_ATTRIBUTE_SENTINELS.contains(&name) {
            return false;
        }
        is_builtin_attribute(name)
            || has_attribute_prefix(name)
            || self.extension_has(NameKind::Attribute, name)
    }
}

impl fmt::Debug for ValidNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidNames")
            .field("version", &self.version)
            .field("extensions", &self.extensions.is_some())
            .finish()
    }
}

/// A fixed set of extension names, typically loaded from project configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticExtensions {
    pub macros: HashSet<String>,
    pub filters: HashSet<String>,
    pub attributes: HashSet<String>,
}

impl StaticExtensions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty() && self.filters.is_empty() && self.attributes.is_empty()
    }
}

impl ExtensionNames for StaticExtensions {
    fn contains(&self, kind: NameKind, name: &str) -> bool {
        match kind {
            NameKind::Macro => self.macros.contains(name),
            NameKind::Filter => self.filters.contains(name),
            NameKind::Attribute => self.attributes.contains(name),
        }
    }
}

/// Extension names that can be swapped while lexers hold a reference,
/// e.g. after the project's framework configuration is re-read.
#[derive(Debug, Default)]
pub struct SharedExtensions {
    inner: RwLock<StaticExtensions>,
}

impl SharedExtensions {
    pub fn new(names: StaticExtensions) -> Self {
        Self {
            inner: RwLock::new(names),
        }
    }

    pub fn replace(&self, names: StaticExtensions) {
        *self.inner.write() = names;
        tracing::debug!("extension names replaced");
    }

    pub fn snapshot(&self) -> StaticExtensions {
        self.inner.read().clone()
    }
}

impl ExtensionNames for SharedExtensions {
    fn contains(&self, kind: NameKind, name: &str) -> bool {
        self.inner.read().contains(kind, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_names() -> StaticExtensions {
        let mut ext = StaticExtensions::default();
        ext.macros.insert("icon".into());
        ext.filters.insert("money".into());
        ext.attributes.insert("n:invalid".into());
        ext.attributes.insert("n:custom".into());
        ext
    }

    #[test]
    fn builtins_and_extensions_are_unioned() {
        let names = ValidNames::new(LatteVersion::V3).with_extensions(Arc::new(project_names()));
        assert!(names.is_valid_macro("foreach"));
        assert!(names.is_valid_macro("icon"));
        assert!(!names.is_valid_macro("widget"));
        assert!(names.is_valid_filter("upper"));
        assert!(names.is_valid_filter("money"));
        assert!(!names.is_valid_filter("nope"));
    }

    #[test]
    fn sentinel_attribute_beats_extensions() {
        let names = ValidNames::new(LatteVersion::V3).with_extensions(Arc::new(project_names()));
        assert!(!names.is_valid_attribute("n:invalid"));
        assert!(names.is_valid_attribute("n:custom"));
        assert!(names.is_valid_attribute("n:if"));
        assert!(names.is_valid_attribute("n:inner-foreach"));
        assert!(!names.is_valid_attribute("n:foo"));
    }

    #[test]
    fn shared_extensions_are_seen_after_replace() {
        let shared = Arc::new(SharedExtensions::default());
        let names = ValidNames::new(LatteVersion::V3).with_extensions(shared.clone());
        assert!(!names.is_valid_macro("icon"));
        shared.replace(project_names());
        assert!(names.is_valid_macro("icon"));
    }

    #[test]
    fn static_extensions_from_json() {
        let ext = StaticExtensions::from_json(r#"{"macros": ["icon"], "filters": ["money"]}"#)
            .unwrap();
        assert!(ext.contains(NameKind::Macro, "icon"));
        assert!(ext.contains(NameKind::Filter, "money"));
        assert!(ext.attributes.is_empty());
    }
}
