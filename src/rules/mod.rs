//! Domain rules and hostname-to-profile resolution
//!
//! Resolution order for `a.b.example.com`:
//! `a.b.example.com`, `*.a.b.example.com`, `*.b.example.com`, `*.example.com`.
//! The first key present wins; the top-level label alone is never tried.
//! Exact rules therefore beat any wildcard, and narrower wildcards beat
//! broader ones.

pub mod hostname;
pub mod origin;

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::constants::hostname::WILDCARD_PREFIX;
use crate::error::{CoreError, CoreResult};
use crate::profile::ProfileId;

pub use hostname::{canonical_hostname, is_valid_hostname};
pub use origin::PageOrigin;

/// One domain rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub profile: ProfileId,
    pub domain: String,
    pub includes_subdomains: bool,
}

impl Rule {
    /// Parse `domain` or `*.domain` into a rule
    pub fn parse(profile: ProfileId, pattern: &str) -> CoreResult<Self> {
        let trimmed = pattern.trim();
        let (domain, includes_subdomains) = match trimmed.strip_prefix(WILDCARD_PREFIX) {
            Some(domain) => (domain, true),
            None => (trimmed, false),
        };

        let domain = canonical_hostname(domain)
            .ok_or_else(|| CoreError::InvalidDomain(pattern.trim().to_string()))?;

        Ok(Self {
            profile,
            domain,
            includes_subdomains,
        })
    }

    /// Persisted key: `domain` or `*.domain`
    pub fn key(&self) -> String {
        if self.includes_subdomains {
            format!("{WILDCARD_PREFIX}{}", self.domain)
        } else {
            self.domain.clone()
        }
    }
}

/// All rules plus the optional local-file profile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: BTreeMap<String, Rule>,
    local_file_profile: Option<ProfileId>,
}

impl RuleSet {
    /// Empty rule set with an optional local-file profile
    pub fn new(local_file_profile: Option<ProfileId>) -> Self {
        Self {
            rules: BTreeMap::new(),
            local_file_profile,
        }
    }

    /// Profile for `hostname`, falling back to `default_profile`
    ///
    /// A hostname that fails the grammar resolves to the default without
    /// consulting any rule.
    pub fn resolve(&self, hostname: &str, default_profile: ProfileId) -> ProfileId {
        self.matching_rule(hostname)
            .map(|rule| rule.profile)
            .unwrap_or(default_profile)
    }

    /// The rule that decides `hostname`, if any
    pub fn matching_rule(&self, hostname: &str) -> Option<&Rule> {
        let Some(host) = canonical_hostname(hostname) else {
            debug!(hostname = %hostname, "Invalid hostname, using general mode");
            return None;
        };

        let found = candidate_keys(&host)
            .into_iter()
            .find_map(|key| self.rules.get(&key));
        if let Some(rule) = found {
            debug!(hostname = %host, rule = %rule.key(), profile = %rule.profile, "Matched rule");
        }
        found
    }

    /// Profile for a classified page origin
    pub fn resolve_origin(&self, origin: &PageOrigin, default_profile: ProfileId) -> ProfileId {
        match origin {
            PageOrigin::Web(host) => self.resolve(host, default_profile),
            PageOrigin::LocalFile => self.local_file_profile.unwrap_or(default_profile),
            PageOrigin::General => default_profile,
        }
    }

    /// Add a rule; fails on an invalid pattern or an existing key
    pub fn add_rule(&mut self, profile: ProfileId, pattern: &str) -> CoreResult<&Rule> {
        let rule = Rule::parse(profile, pattern)?;
        let key = rule.key();
        if self.rules.contains_key(&key) {
            return Err(CoreError::DuplicateRule(key));
        }
        info!(rule = %key, profile = %profile, "Adding rule");
        Ok(self.rules.entry(key).or_insert(rule))
    }

    /// Insert a rule read back from storage, replacing any previous one
    pub fn insert(&mut self, rule: Rule) {
        self.rules.insert(rule.key(), rule);
    }

    /// Remove a rule; absent patterns are ignored
    pub fn remove_rule(&mut self, pattern: &str) -> Option<Rule> {
        let key = canonical_key(pattern);
        let removed = self.rules.remove(&key);
        if removed.is_some() {
            info!(rule = %key, "Removed rule");
        }
        removed
    }

    /// Point an existing rule at another profile
    pub fn change_rule_profile(&mut self, pattern: &str, profile: ProfileId) -> CoreResult<()> {
        let key = canonical_key(pattern);
        let rule = self
            .rules
            .get_mut(&key)
            .ok_or(CoreError::RuleNotFound(key.clone()))?;
        rule.profile = profile;
        info!(rule = %key, profile = %profile, "Changed rule profile");
        Ok(())
    }

    /// Set or clear the exact-host rule for `host`
    pub fn assign_host(&mut self, host: &str, profile: Option<ProfileId>) -> CoreResult<()> {
        let domain = canonical_hostname(host)
            .ok_or_else(|| CoreError::InvalidDomain(host.trim().to_string()))?;
        match profile {
            Some(profile) => {
                info!(rule = %domain, profile = %profile, "Assigning profile to host");
                self.insert(Rule {
                    profile,
                    domain,
                    includes_subdomains: false,
                });
            }
            None => {
                self.remove_rule(&domain);
            }
        }
        Ok(())
    }

    /// Rewrite every reference to `from`; `None` deletes those rules and
    /// clears the local-file pointer. Returns how many rules were touched.
    pub fn reassign(&mut self, from: ProfileId, to: Option<ProfileId>) -> usize {
        let before = self.rules.len();
        let mut touched = 0;

        match to {
            Some(to) => {
                for rule in self.rules.values_mut().filter(|r| r.profile == from) {
                    rule.profile = to;
                    touched += 1;
                }
            }
            None => {
                self.rules.retain(|_, rule| rule.profile != from);
                touched = before - self.rules.len();
            }
        }

        if self.local_file_profile == Some(from) {
            self.local_file_profile = to;
        }

        info!(from = %from, to = ?to, rules = touched, "Reassigned rules");
        touched
    }

    /// Whether any rule or the local-file pointer refers to `id`
    pub fn references(&self, id: ProfileId) -> bool {
        self.local_file_profile == Some(id) || self.rules.values().any(|r| r.profile == id)
    }

    /// Profile for `file:` pages, if one is set
    pub fn local_file_profile(&self) -> Option<ProfileId> {
        self.local_file_profile
    }

    /// Set or clear the profile for `file:` pages
    pub fn set_local_file_profile(&mut self, profile: Option<ProfileId>) {
        self.local_file_profile = profile;
    }

    /// Rule stored under `pattern`, matched case-insensitively
    pub fn get(&self, pattern: &str) -> Option<&Rule> {
        self.rules.get(&canonical_key(pattern))
    }

    /// Rules in key order
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Lookup keys for a valid hostname, most specific first
fn candidate_keys(host: &str) -> Vec<String> {
    let labels: Vec<&str> = host.split('.').collect();
    let mut keys = Vec::with_capacity(labels.len());
    keys.push(host.to_string());
    for start in 0..labels.len().saturating_sub(1) {
        keys.push(format!("{WILDCARD_PREFIX}{}", labels[start..].join(".")));
    }
    keys
}

fn canonical_key(pattern: &str) -> String {
    pattern.trim().to_ascii_lowercase()
}
