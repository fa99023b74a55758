//! Remediation registry
//!
//! Provides [`RemediationRegistry`], the map from issue type to the
//! remediation that handles it.

use super::strategies::{
    CredentialReset, FallbackToggle, ProxyRewrite, SelectorResilience, StorageReset, TimeoutBump,
};
use super::Remediation;
use crate::types::IssueType;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Issue type to remediation table
#[derive(Default, Clone)]
pub struct RemediationRegistry {
    remediations: BTreeMap<IssueType, Arc<dyn Remediation>>,
}

impl RemediationRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            remediations: BTreeMap::new(),
        }
    }

    /// Create registry with built-in remediations
    ///
    /// `Unknown` is deliberately left unmapped.
    #[must_use]
    pub fn with_defaults() -> Self {
        let credentials: Arc<dyn Remediation> = Arc::new(CredentialReset);
        let selectors: Arc<dyn Remediation> = Arc::new(SelectorResilience);
        let storage: Arc<dyn Remediation> = Arc::new(StorageReset);

        let mut registry = Self::new();
        registry.register(IssueType::Authentication, Arc::clone(&credentials));
        registry.register(IssueType::Permission, credentials);
        registry.register(IssueType::MissingElement, Arc::clone(&selectors));
        registry.register(IssueType::UiChange, selectors);
        registry.register(IssueType::NetworkError, Arc::new(FallbackToggle));
        registry.register(IssueType::Timeout, Arc::new(TimeoutBump));
        registry.register(IssueType::LocalStorage, Arc::clone(&storage));
        registry.register(IssueType::StateError, Arc::clone(&storage));
        registry.register(IssueType::DataFormat, storage);
        registry.register(IssueType::Cors, Arc::new(ProxyRewrite));
        registry
    }

    /// Register or replace the remediation for an issue type
    pub fn register(&mut self, issue_type: IssueType, remediation: Arc<dyn Remediation>) {
        self.remediations.insert(issue_type, remediation);
    }

    /// Remediation for an issue type
    #[inline]
    #[must_use]
    pub fn get(&self, issue_type: IssueType) -> Option<Arc<dyn Remediation>> {
        self.remediations.get(&issue_type).cloned()
    }

    /// Check if an issue type has a remediation
    #[inline]
    #[must_use]
    pub fn contains(&self, issue_type: IssueType) -> bool {
        self.remediations.contains_key(&issue_type)
    }

    /// Remove remediation
    #[inline]
    pub fn remove(&mut self, issue_type: IssueType) -> bool {
        self.remediations.remove(&issue_type).is_some()
    }

    /// Covered issue types
    #[must_use]
    pub fn issue_types(&self) -> Vec<IssueType> {
        self.remediations.keys().copied().collect()
    }

    /// Get number of mapped issue types
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.remediations.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remediations.is_empty()
    }
}

impl fmt::Debug for RemediationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.remediations.iter().map(|(k, v)| (k, v.name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_type_but_unknown() {
        let registry = RemediationRegistry::with_defaults();
        assert_eq!(registry.len(), IssueType::ALL.len() - 1);
        assert!(!registry.contains(IssueType::Unknown));
    }

    #[test]
    fn shared_remediations() {
        let registry = RemediationRegistry::with_defaults();
        let name = |t| registry.get(t).map(|r| r.name());
        assert_eq!(name(IssueType::Authentication), Some("credential-reset"));
        assert_eq!(name(IssueType::Permission), Some("credential-reset"));
        assert_eq!(name(IssueType::UiChange), Some("selector-resilience"));
        assert_eq!(name(IssueType::DataFormat), Some("storage-reset"));
        assert_eq!(name(IssueType::Cors), Some("proxy-rewrite"));
    }

    #[test]
    fn register_replaces() {
        let mut registry = RemediationRegistry::new();
        assert!(registry.is_empty());
        registry.register(IssueType::Timeout, Arc::new(StorageReset));
        registry.register(IssueType::Timeout, Arc::new(TimeoutBump));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(IssueType::Timeout).map(|r| r.name()),
            Some("timeout-bump")
        );
        assert!(registry.remove(IssueType::Timeout));
    }
}
