//! Dependency coordinates
//!
//! A coordinate names one artifact in a Maven-layout repository. Coordinates
//! are immutable values; every field takes part in equality and hashing, so
//! a coordinate doubles as the first component of a cache key.

use crate::error::{PlugdepsError, PlugdepsResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Extension used when none is given
pub const DEFAULT_EXTENSION: &str = "jar";

/// Placeholder accepted in place of `.` in groups and relocation patterns.
///
/// Shading plugins rewrite string literals that look like package names;
/// writing `org{}apache{}commons` keeps them away from the literal.
pub const DOT_PLACEHOLDER: &str = "{}";

/// Replace every `{}` placeholder with a dot
pub fn expand_placeholder(s: &str) -> String {
    s.replace(DOT_PLACEHOLDER, ".")
}

/// Identifies a single artifact: `group:artifact:version[:classifier][@extension]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate {
    group: String,
    artifact: String,
    version: String,
    classifier: Option<String>,
    extension: String,
}

impl Coordinate {
    /// Build a validated coordinate with the default `jar` extension
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> PlugdepsResult<Self> {
        let coordinate = Self {
            group: expand_placeholder(&group.into()),
            artifact: expand_placeholder(&artifact.into()),
            version: version.into(),
            classifier: None,
            extension: DEFAULT_EXTENSION.to_string(),
        };
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Same coordinate with a classifier
    pub fn with_classifier(mut self, classifier: impl Into<String>) -> PlugdepsResult<Self> {
        let classifier = classifier.into();
        self.classifier = if classifier.is_empty() {
            None
        } else {
            Some(classifier)
        };
        self.validate()?;
        Ok(self)
    }

    /// Same coordinate with a different extension
    pub fn with_extension(mut self, extension: impl Into<String>) -> PlugdepsResult<Self> {
        self.extension = extension.into();
        self.validate()?;
        Ok(self)
    }

    /// The POM describing this coordinate's module
    pub fn pom(&self) -> Self {
        Self {
            group: self.group.clone(),
            artifact: self.artifact.clone(),
            version: self.version.clone(),
            classifier: None,
            extension: "pom".to_string(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `group:artifact`, the module identity used for version mediation
    pub fn module(&self) -> ModuleId {
        ModuleId {
            group: self.group.clone(),
            artifact: self.artifact.clone(),
        }
    }

    /// File name inside the version directory
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.artifact, self.version, classifier, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact, self.version, self.extension),
        }
    }

    /// Path segments relative to a repository root or cache root:
    /// `group/as/path`, `artifact`, `version`, `file name`
    pub fn path_segments(&self) -> Vec<String> {
        let mut segments: Vec<String> = self.group.split('.').map(str::to_string).collect();
        segments.push(self.artifact.clone());
        segments.push(self.version.clone());
        segments.push(self.file_name());
        segments
    }

    /// Slash-joined relative path, as used in repository URLs
    pub fn relative_path(&self) -> String {
        self.path_segments().join("/")
    }

    fn validate(&self) -> PlugdepsResult<()> {
        let input = self.to_string();
        let fail = |reason: String| PlugdepsError::InvalidCoordinate {
            input: input.clone(),
            reason,
        };

        for (field, value) in [
            ("group", self.group.as_str()),
            ("artifact", self.artifact.as_str()),
            ("version", self.version.as_str()),
            ("extension", self.extension.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(fail(format!("{} must not be empty", field)));
            }
            check_segment(field, value).map_err(&fail)?;
        }

        if self.group.split('.').any(str::is_empty) {
            return Err(fail("group contains an empty segment".to_string()));
        }

        if let Some(classifier) = &self.classifier {
            check_segment("classifier", classifier).map_err(&fail)?;
        }

        Ok(())
    }
}

/// Reject characters that would escape the repository or cache layout
fn check_segment(field: &str, value: &str) -> Result<(), String> {
    if value.contains('/') || value.contains('\\') || value.contains("..") || value.contains('\0')
    {
        return Err(format!(
            "{} '{}' must not contain path separators or '..'",
            field, value
        ));
    }
    if value.chars().any(|c| c.is_whitespace() || c == ':' || c == '@') {
        return Err(format!(
            "{} '{}' must not contain whitespace, ':' or '@'",
            field, value
        ));
    }
    Ok(())
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        if self.extension != DEFAULT_EXTENSION {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}

impl FromStr for Coordinate {
    type Err = PlugdepsError;

    fn from_str(s: &str) -> PlugdepsResult<Self> {
        let s = s.trim();
        let (body, extension) = match s.rsplit_once('@') {
            Some((body, ext)) => (body, Some(ext)),
            None => (s, None),
        };

        let parts: Vec<&str> = body.split(':').collect();
        let coordinate = match parts.as_slice() {
            [group, artifact, version] => Coordinate::new(*group, *artifact, *version)?,
            [group, artifact, version, classifier] => {
                Coordinate::new(*group, *artifact, *version)?.with_classifier(*classifier)?
            }
            _ => {
                return Err(PlugdepsError::InvalidCoordinate {
                    input: s.to_string(),
                    reason: "expected group:artifact:version[:classifier][@extension]"
                        .to_string(),
                })
            }
        };

        match extension {
            Some(ext) => coordinate.with_extension(ext),
            None => Ok(coordinate),
        }
    }
}

impl TryFrom<String> for Coordinate {
    type Error = PlugdepsError;

    fn try_from(s: String) -> PlugdepsResult<Self> {
        s.parse()
    }
}

impl From<Coordinate> for String {
    fn from(c: Coordinate) -> Self {
        c.to_string()
    }
}

/// `group:artifact` without a version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId {
    pub group: String,
    pub artifact: String,
}

impl ModuleId {
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: expand_placeholder(&group.into()),
            artifact: expand_placeholder(&artifact.into()),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)
    }
}

impl FromStr for ModuleId {
    type Err = PlugdepsError;

    fn from_str(s: &str) -> PlugdepsResult<Self> {
        match s.trim().split_once(':') {
            Some((group, artifact)) if !group.is_empty() && !artifact.is_empty() => {
                Ok(Self::new(group, artifact))
            }
            _ => Err(PlugdepsError::InvalidCoordinate {
                input: s.to_string(),
                reason: "expected group:artifact".to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ModuleId {
    type Error = PlugdepsError;

    fn try_from(s: String) -> PlugdepsResult<Self> {
        s.parse()
    }
}

impl From<ModuleId> for String {
    fn from(m: ModuleId) -> Self {
        m.to_string()
    }
}
