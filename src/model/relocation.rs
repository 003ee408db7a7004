//! Relocation rules
//!
//! A rule renames every symbol under a package prefix. Rules are ordered; the
//! first rule whose prefix matches a name wins. The ordered rule set hashes
//! to a stable key so relocated artifacts never share storage with their
//! source or with another rule set's output.

use crate::error::{PlugdepsError, PlugdepsResult};
use crate::model::coordinate::expand_placeholder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Cache-key component used for artifacts that were not relocated
pub const NO_RULES: &str = "none";

/// Rename `from` package prefix to `to`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelocationRule {
    /// Dotted package prefix to rename (e.g. `org.apache.commons`)
    pub from: String,
    /// Dotted replacement prefix (e.g. `my.plugin.libs.commons`)
    pub to: String,
    /// Dotted prefixes under `from` that keep their original name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

impl RelocationRule {
    /// Build a validated rule
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> PlugdepsResult<Self> {
        let rule = Self {
            from: normalize_package(&from.into()),
            to: normalize_package(&to.into()),
            excludes: Vec::new(),
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Keep names under `prefix` untouched
    pub fn exclude(mut self, prefix: impl Into<String>) -> PlugdepsResult<Self> {
        self.excludes.push(normalize_package(&prefix.into()));
        self.validate()?;
        Ok(self)
    }

    /// Apply placeholder expansion and check shape (used after deserialization)
    pub fn normalized(&self) -> PlugdepsResult<Self> {
        let rule = Self {
            from: normalize_package(&self.from),
            to: normalize_package(&self.to),
            excludes: self.excludes.iter().map(|e| normalize_package(e)).collect(),
        };
        rule.validate()?;
        Ok(rule)
    }

    fn validate(&self) -> PlugdepsResult<()> {
        let invalid = |reason: String| PlugdepsError::InvalidRelocation {
            from: self.from.clone(),
            to: self.to.clone(),
            reason,
        };

        for name in [&self.from, &self.to].into_iter().chain(self.excludes.iter()) {
            if !is_package_name(name) {
                return Err(invalid(format!("'{}' is not a package name", name)));
            }
        }
        if self.from == self.to {
            return Err(invalid("source and target are identical".to_string()));
        }
        for exclude in &self.excludes {
            if !exclude.starts_with(&self.from) {
                return Err(invalid(format!(
                    "exclusion '{}' is not under '{}'",
                    exclude, self.from
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for RelocationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Accept `{}` placeholders and slash-separated input
fn normalize_package(s: &str) -> String {
    expand_placeholder(s.trim()).replace('/', ".")
}

fn is_package_name(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '-')
        })
}

/// Ordered list of relocation rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelocationRuleSet {
    rules: Vec<RelocationRule>,
}

impl RelocationRuleSet {
    /// An empty rule set (pass-through)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from already validated rules
    pub fn new(rules: Vec<RelocationRule>) -> Self {
        Self { rules }
    }

    /// Append a rule
    pub fn push(&mut self, rule: RelocationRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[RelocationRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Normalize and validate every rule (used after deserialization)
    pub fn normalized(&self) -> PlugdepsResult<Self> {
        let rules = self
            .rules
            .iter()
            .map(RelocationRule::normalized)
            .collect::<PlugdepsResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Stable hash of the ordered rules (16 hex chars), or `none` when empty
    pub fn hash(&self) -> String {
        if self.rules.is_empty() {
            return NO_RULES.to_string();
        }

        let mut hasher = Sha256::new();
        for rule in &self.rules {
            hasher.update(rule.from.as_bytes());
            hasher.update([0u8]);
            hasher.update(rule.to.as_bytes());
            hasher.update([0u8]);
            for exclude in &rule.excludes {
                hasher.update(exclude.as_bytes());
                hasher.update([1u8]);
            }
            hasher.update([b'\n']);
        }
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }
}

impl FromIterator<RelocationRule> for RelocationRuleSet {
    fn from_iter<I: IntoIterator<Item = RelocationRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}
