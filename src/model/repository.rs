//! Remote repositories
//!
//! A repository is a base URL serving the Maven directory layout. The order
//! of repositories in a request is the fallback order.

use crate::error::{PlugdepsError, PlugdepsResult};
use crate::model::Coordinate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known public repositories
pub mod known {
    /// Maven Central
    pub const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2/";
    /// Sonatype OSS releases
    pub const SONATYPE: &str = "https://oss.sonatype.org/content/groups/public/";
    /// JitPack
    pub const JITPACK: &str = "https://jitpack.io/";
    /// Google's Maven repository
    pub const GOOGLE_MAVEN: &str = "https://maven.google.com/";
}

/// Basic-auth credentials for a private repository
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A remote artifact repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RepositoryDef")]
pub struct Repository {
    /// Base URL, always stored with a trailing slash
    url: String,

    /// Optional basic-auth credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    credentials: Option<Credentials>,

    /// Only consulted for directly requested coordinates, never for transitives
    direct_only: bool,
}

impl Repository {
    /// Create a repository from a base URL
    pub fn new(url: impl Into<String>) -> PlugdepsResult<Self> {
        let url = normalize_url(&url.into())?;
        Ok(Self {
            url,
            credentials: None,
            direct_only: false,
        })
    }

    /// Maven Central
    pub fn maven_central() -> Self {
        Self {
            url: known::MAVEN_CENTRAL.to_string(),
            credentials: None,
            direct_only: false,
        }
    }

    /// Attach basic-auth credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Restrict to direct (non-transitive) lookups
    pub fn direct_only(mut self, direct_only: bool) -> Self {
        self.direct_only = direct_only;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_direct_only(&self) -> bool {
        self.direct_only
    }

    /// Full URL of an artifact in this repository
    pub fn artifact_url(&self, coordinate: &Coordinate) -> String {
        format!("{}{}", self.url, coordinate.relative_path())
    }

    /// Re-validate after deserialization
    pub fn validate(&self) -> PlugdepsResult<()> {
        normalize_url(&self.url).map(|_| ())
    }
}

/// Accepted TOML shapes: a bare URL string or a table
#[derive(Deserialize)]
#[serde(untagged)]
enum RepositoryDef {
    Url(String),
    Table {
        url: String,
        #[serde(default)]
        credentials: Option<Credentials>,
        #[serde(default)]
        direct_only: bool,
    },
}

impl TryFrom<RepositoryDef> for Repository {
    type Error = PlugdepsError;

    fn try_from(def: RepositoryDef) -> PlugdepsResult<Self> {
        match def {
            RepositoryDef::Url(url) => Repository::new(url),
            RepositoryDef::Table {
                url,
                credentials,
                direct_only,
            } => Ok(Self {
                url: normalize_url(&url)?,
                credentials,
                direct_only,
            }),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Validate the scheme and force a trailing slash
fn normalize_url(url: &str) -> PlugdepsResult<String> {
    let url = url.trim();
    let invalid = |reason: &str| PlugdepsError::InvalidRepository {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| invalid("only http:// and https:// repositories are supported"))?;

    if rest.is_empty() || rest.starts_with('/') {
        return Err(invalid("missing host"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }

    if url.ends_with('/') {
        Ok(url.to_string())
    } else {
        Ok(format!("{}/", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_added() {
        let repo = Repository::new("http://mirror1").unwrap();
        assert_eq!(repo.url(), "http://mirror1/");
    }

    #[test]
    fn artifact_url_composition() {
        let repo = Repository::new("http://mirror1/").unwrap();
        let c: Coordinate = "g:a:1.0.0".parse().unwrap();
        assert_eq!(repo.artifact_url(&c), "http://mirror1/g/a/1.0.0/a-1.0.0.jar");

        let classified: Coordinate = "com.example:lib:2:shaded".parse().unwrap();
        assert_eq!(
            repo.artifact_url(&classified),
            "http://mirror1/com/example/lib/2/lib-2-shaded.jar"
        );
    }

    #[test]
    fn rejects_bad_scheme() {
        assert!(Repository::new("ftp://mirror").is_err());
        assert!(Repository::new("mirror").is_err());
        assert!(Repository::new("https://").is_err());
        assert!(Repository::new("https://a b").is_err());
    }

    #[test]
    fn credentials_are_redacted_in_debug() {
        let repo = Repository::new("https://private")
            .unwrap()
            .with_credentials("deploy", "hunter2");
        let debug = format!("{:?}", repo);
        assert!(debug.contains("deploy"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn deserializes_from_string_or_table() {
        #[derive(Deserialize)]
        struct Doc {
            repositories: Vec<Repository>,
        }

        let doc: Doc = toml::from_str(
            r#"
repositories = [
    "https://repo1.maven.org/maven2",
    { url = "https://private.example/releases", direct_only = true, credentials = { username = "u", password = "p" } },
]
"#,
        )
        .unwrap();

        assert_eq!(doc.repositories[0].url(), known::MAVEN_CENTRAL);
        assert!(doc.repositories[1].is_direct_only());
        assert_eq!(doc.repositories[1].credentials().unwrap().username, "u");
    }

    #[test]
    fn maven_central_is_valid() {
        assert!(Repository::maven_central().validate().is_ok());
    }
}
