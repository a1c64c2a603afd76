//! Policy generations
//!
//! A [`PolicySet`] is immutable once built. [`PolicyStore`] swaps whole sets,
//! so a lookup always observes one complete generation.

use std::collections::HashSet;
use std::sync::Arc;

use crate::policy::PrivacyPolicy;

/// One generation of location privacy configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySet {
    global: PrivacyPolicy,
    exceptions: Vec<PrivacyPolicy>,
    suppressed: HashSet<String>,
}

impl PolicySet {
    pub fn new(global: PrivacyPolicy) -> Self {
        Self {
            global: PrivacyPolicy {
                scope: String::new(),
                ..global
            },
            exceptions: Vec::new(),
            suppressed: HashSet::new(),
        }
    }

    /// Add a per-origin exception. The first exception for an origin wins.
    pub fn with_exception(mut self, policy: PrivacyPolicy) -> Self {
        if policy.is_global() {
            tracing::warn!("Ignoring exception policy without an origin");
            return self;
        }

        if self.exceptions.iter().any(|p| p.scope == policy.scope) {
            tracing::warn!(origin = %policy.scope, "Duplicate exception policy ignored");
            return self;
        }

        self.exceptions.push(policy);
        self
    }

    pub fn with_suppressed<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suppressed
            .extend(origins.into_iter().map(Into::into).filter(|o: &String| !o.is_empty()));
        self
    }

    pub fn global(&self) -> &PrivacyPolicy {
        &self.global
    }

    pub fn exceptions(&self) -> &[PrivacyPolicy] {
        &self.exceptions
    }

    pub fn is_suppressed(&self, origin: &str) -> bool {
        self.suppressed.contains(origin)
    }

    /// Policy that applies to `origin`.
    ///
    /// The suppression list is consulted before anything else; an empty
    /// origin always gets the global policy.
    pub fn resolve(&self, origin: &str) -> PrivacyPolicy {
        if origin.is_empty() {
            return self.global.clone();
        }

        if self.suppressed.contains(origin) {
            return PrivacyPolicy {
                scope: origin.to_string(),
                ..PrivacyPolicy::suppressed()
            };
        }

        self.exceptions
            .iter()
            .find(|p| p.scope == origin)
            .unwrap_or(&self.global)
            .clone()
    }
}

/// Holder of the current [`PolicySet`] generation.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    current: Arc<PolicySet>,
    generation: u64,
}

impl PolicyStore {
    pub fn new(initial: PolicySet) -> Self {
        Self {
            current: Arc::new(initial),
            generation: 0,
        }
    }

    /// The current generation. Holding it keeps that generation alive even
    /// after a later [`PolicyStore::replace`].
    pub fn snapshot(&self) -> Arc<PolicySet> {
        Arc::clone(&self.current)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn replace(&mut self, next: PolicySet) {
        self.current = Arc::new(next);
        self.generation += 1;

        tracing::info!(
            generation = self.generation,
            global_mode = %self.current.global.mode,
            exceptions = self.current.exceptions.len(),
            suppressed = self.current.suppressed.len(),
            "Installed location privacy policies"
        );
    }

    /// Build the next generation from the current one and install it.
    pub fn update<F>(&mut self, f: F)
    where
        F: FnOnce(&PolicySet) -> PolicySet,
    {
        let next = f(&self.current);
        self.replace(next);
    }

    pub fn resolve(&self, origin: &str) -> PrivacyPolicy {
        self.current.resolve(origin)
    }
}
