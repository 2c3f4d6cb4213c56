//! Upstream namespace selection by path prefix

/// Header carrying the resolved namespace
pub const NAMESPACE_HEADER: &str = "battlenet-namespace";

/// Namespace used when no registered prefix matches
pub const DEFAULT_NAMESPACE: &str = "profile-classic-us";

/// Maps path prefixes to namespace values.
///
/// Prefixes are checked in registration order and the first match wins,
/// so overlapping prefixes must be registered most-specific first.
#[derive(Debug, Clone)]
pub struct NamespaceResolver {
    prefixes: Vec<(String, String)>,
    default: String,
}

impl Default for NamespaceResolver {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl NamespaceResolver {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            prefixes: Vec::new(),
            default: default.into(),
        }
    }

    /// Resolver with the game-data prefixes the site uses
    pub fn with_builtin_prefixes() -> Self {
        Self::default()
            .with_prefix("/data/wow/item-appearance", "static-us")
            .with_prefix("/data/wow/item", "static-us")
            .with_prefix("/data/wow/achievement", "static-classic-us")
            .with_prefix("/data/wow/media", "static-classic-us")
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.register(prefix, namespace);
        self
    }

    pub fn register(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.prefixes.push((prefix.into(), namespace.into()));
    }

    pub fn resolve(&self, path: &str) -> &str {
        self.prefixes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, namespace)| namespace.as_str())
            .unwrap_or(self.default.as_str())
    }

    pub fn default_namespace(&self) -> &str {
        &self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_prefix_falls_back_to_default() {
        let resolver = NamespaceResolver::default()
            .with_prefix("/data/wow/item", "static-us")
            .with_prefix("/data/wow/item-appearance", "static-us");

        assert_eq!(
            resolver.resolve("/data/wow/guild/arugal/low-calibre/roster"),
            DEFAULT_NAMESPACE
        );
    }

    #[test]
    fn test_first_registered_prefix_wins() {
        let resolver = NamespaceResolver::default()
            .with_prefix("/data/wow/item-appearance", "appearance-ns")
            .with_prefix("/data/wow/item", "item-ns");

        assert_eq!(resolver.resolve("/data/wow/item-appearance/5"), "appearance-ns");
        assert_eq!(resolver.resolve("/data/wow/item/19019"), "item-ns");
    }

    #[test]
    fn test_builtin_prefixes() {
        let resolver = NamespaceResolver::with_builtin_prefixes();
        assert_eq!(resolver.resolve("/data/wow/item/19019"), "static-us");
        assert_eq!(resolver.resolve("/data/wow/media/item/1"), "static-classic-us");
        assert_eq!(resolver.resolve("/profile/wow/character/arugal/foo"), "profile-classic-us");
    }
}
