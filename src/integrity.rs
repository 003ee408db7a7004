//! Artifact integrity verification
//!
//! Downloaded bytes are checked against the digest the caller pinned. When
//! no digest is pinned the verifier falls back to the repository's checksum
//! sidecar (`.sha512`, `.sha256`, `.sha1`, strongest first). Artifacts with
//! neither are accepted, but every such acceptance lands in the audit log.

use crate::audit::{events, AuditLog};
use crate::download::Transport;
use crate::error::{PlugdepsError, PlugdepsResult};
use crate::model::{Coordinate, Repository};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Supported digest algorithms, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha512,
    Sha256,
    Sha1,
}

impl DigestAlgorithm {
    /// Sidecar lookup order
    pub const SIDECARS: [DigestAlgorithm; 3] = [Self::Sha512, Self::Sha256, Self::Sha1];

    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha512 => 64,
            Self::Sha256 => 32,
            Self::Sha1 => 20,
        }
    }

    /// Repository sidecar extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Sha512 => "sha512",
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
        }
    }

    /// Digest `bytes` with this algorithm
    pub fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha512 => Sha512::digest(bytes).to_vec(),
            Self::Sha256 => Sha256::digest(bytes).to_vec(),
            Self::Sha1 => Sha1::digest(bytes).to_vec(),
        }
    }

    fn from_len(len: usize) -> Option<Self> {
        Self::SIDECARS.into_iter().find(|a| a.digest_len() == len)
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sha512 => "SHA-512",
            Self::Sha256 => "SHA-256",
            Self::Sha1 => "SHA-1",
        };
        write!(f, "{}", name)
    }
}

/// A digest an artifact must match
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpectedDigest {
    algorithm: DigestAlgorithm,
    bytes: Vec<u8>,
}

impl ExpectedDigest {
    /// Parse a caller-supplied checksum.
    ///
    /// Hex strings pick the algorithm by length (128, 64 or 40 digits).
    /// Anything else is read as base64 and must decode to a SHA-256 digest.
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("checksum is empty".to_string());
        }

        if input.chars().all(|c| c.is_ascii_hexdigit()) && input.len() % 2 == 0 {
            if let Some(algorithm) = DigestAlgorithm::from_len(input.len() / 2) {
                let bytes = hex::decode(input).map_err(|e| e.to_string())?;
                return Ok(Self { algorithm, bytes });
            }
        }

        let bytes = STANDARD
            .decode(input)
            .or_else(|_| STANDARD_NO_PAD.decode(input))
            .map_err(|_| "neither hex nor base64".to_string())?;
        if bytes.len() != DigestAlgorithm::Sha256.digest_len() {
            return Err(format!(
                "base64 checksum decodes to {} bytes, expected a 32-byte SHA-256",
                bytes.len()
            ));
        }
        Ok(Self {
            algorithm: DigestAlgorithm::Sha256,
            bytes,
        })
    }

    /// Parse the body of a `.sha*` sidecar file.
    ///
    /// Sidecars hold the hex digest, sometimes followed by a file name.
    pub fn from_sidecar(algorithm: DigestAlgorithm, body: &str) -> Result<Self, String> {
        let token = body
            .split_whitespace()
            .next()
            .ok_or_else(|| "sidecar is empty".to_string())?;
        let bytes = hex::decode(token).map_err(|e| format!("sidecar is not hex: {}", e))?;
        if bytes.len() != algorithm.digest_len() {
            return Err(format!(
                "sidecar holds {} bytes, {} needs {}",
                bytes.len(),
                algorithm,
                algorithm.digest_len()
            ));
        }
        Ok(Self { algorithm, bytes })
    }

    /// Digest of `bytes` with the given algorithm
    pub fn compute(algorithm: DigestAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            bytes: algorithm.digest(bytes),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Whether `content` hashes to this digest
    pub fn matches(&self, content: &[u8]) -> bool {
        self.algorithm.digest(content) == self.bytes
    }
}

impl fmt::Display for ExpectedDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

/// How a set of bytes came to be trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Matched the digest pinned by the caller
    Pinned(DigestAlgorithm),
    /// Matched the repository's checksum sidecar
    Sidecar(DigestAlgorithm),
    /// No digest available; accepted and audited
    Unverified,
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        !matches!(self, Self::Unverified)
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pinned(a) => write!(f, "pinned {}", a),
            Self::Sidecar(a) => write!(f, "sidecar {}", a),
            Self::Unverified => write!(f, "unverified"),
        }
    }
}

/// Bytes that passed verification
#[derive(Debug, Clone)]
pub struct VerifiedBytes {
    pub bytes: Vec<u8>,
    pub verification: Verification,
}

/// Check `bytes` against `expected`
pub fn check(url: &str, bytes: &[u8], expected: &ExpectedDigest) -> PlugdepsResult<()> {
    if expected.matches(bytes) {
        return Ok(());
    }
    Err(PlugdepsError::ChecksumMismatch {
        url: url.to_string(),
        expected: expected.to_string(),
        actual: ExpectedDigest::compute(expected.algorithm(), bytes).to_string(),
    })
}

/// Verifies downloaded artifacts, fetching sidecars when nothing is pinned
#[derive(Clone)]
pub struct Verifier {
    transport: Arc<dyn Transport>,
    audit: AuditLog,
}

impl Verifier {
    pub fn new(transport: Arc<dyn Transport>, audit: AuditLog) -> Self {
        Self { transport, audit }
    }

    /// Verify bytes fetched for `coordinate` from `repository`.
    ///
    /// A mismatch is an error; the caller moves on to the next repository.
    pub async fn verify(
        &self,
        coordinate: &Coordinate,
        repository: &Repository,
        bytes: Vec<u8>,
        expected: Option<&ExpectedDigest>,
    ) -> PlugdepsResult<VerifiedBytes> {
        let url = repository.artifact_url(coordinate);

        if let Some(expected) = expected {
            if let Err(e) = check(&url, &bytes, expected) {
                self.audit_mismatch(coordinate, &url, &e).await;
                return Err(e);
            }
            return Ok(VerifiedBytes {
                bytes,
                verification: Verification::Pinned(expected.algorithm()),
            });
        }

        if let Some(sidecar) = self.fetch_sidecar(repository, &url).await {
            if let Err(e) = check(&url, &bytes, &sidecar) {
                self.audit_mismatch(coordinate, &url, &e).await;
                return Err(e);
            }
            debug!("{} matched {} sidecar", coordinate, sidecar.algorithm());
            return Ok(VerifiedBytes {
                bytes,
                verification: Verification::Sidecar(sidecar.algorithm()),
            });
        }

        warn!("{} has no checksum; accepting unverified", coordinate);
        self.audit
            .log(
                events::UNVERIFIED,
                &serde_json::json!({
                    "coordinate": coordinate.to_string(),
                    "repository": repository.url(),
                    "sha256": ExpectedDigest::compute(DigestAlgorithm::Sha256, &bytes).to_hex(),
                }),
            )
            .await;

        Ok(VerifiedBytes {
            bytes,
            verification: Verification::Unverified,
        })
    }

    /// First sidecar the repository serves, strongest algorithm first
    async fn fetch_sidecar(&self, repository: &Repository, url: &str) -> Option<ExpectedDigest> {
        for algorithm in DigestAlgorithm::SIDECARS {
            let sidecar_url = format!("{}.{}", url, algorithm.extension());
            match self
                .transport
                .get(&sidecar_url, repository.credentials())
                .await
            {
                Ok(body) => {
                    let body = String::from_utf8_lossy(&body);
                    match ExpectedDigest::from_sidecar(algorithm, &body) {
                        Ok(digest) => return Some(digest),
                        Err(reason) => warn!("Ignoring malformed {}: {}", sidecar_url, reason),
                    }
                }
                Err(e) => debug!("No sidecar at {}: {}", sidecar_url, e),
            }
        }
        None
    }

    async fn audit_mismatch(&self, coordinate: &Coordinate, url: &str, error: &PlugdepsError) {
        warn!("{}", error);
        self.audit
            .log(
                events::CHECKSUM_MISMATCH,
                &serde_json::json!({
                    "coordinate": coordinate.to_string(),
                    "url": url,
                    "error": error.to_string(),
                }),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::transport::testing::FakeTransport;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn parse_hex_by_length() {
        let d = ExpectedDigest::parse(HELLO_SHA256).unwrap();
        assert_eq!(d.algorithm(), DigestAlgorithm::Sha256);
        assert!(d.matches(b"hello"));

        let sha1 = ExpectedDigest::parse("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d").unwrap();
        assert_eq!(sha1.algorithm(), DigestAlgorithm::Sha1);
        assert!(sha1.matches(b"hello"));
    }

    #[test]
    fn parse_base64_sha256() {
        let b64 = STANDARD.encode(Sha256::digest(b"hello"));
        let d = ExpectedDigest::parse(&b64).unwrap();
        assert_eq!(d.algorithm(), DigestAlgorithm::Sha256);
        assert!(d.matches(b"hello"));

        let unpadded = b64.trim_end_matches('=');
        assert!(ExpectedDigest::parse(unpadded).unwrap().matches(b"hello"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(ExpectedDigest::parse("").is_err());
        assert!(ExpectedDigest::parse("xyz").is_err());
        assert!(ExpectedDigest::parse("abcd").is_err());
    }

    #[test]
    fn sidecar_with_file_name() {
        let body = format!("{}  a-1.0.jar\n", HELLO_SHA256);
        let d = ExpectedDigest::from_sidecar(DigestAlgorithm::Sha256, &body).unwrap();
        assert!(d.matches(b"hello"));
        assert!(ExpectedDigest::from_sidecar(DigestAlgorithm::Sha1, &body).is_err());
    }

    #[test]
    fn mismatch_reports_both_digests() {
        let expected = ExpectedDigest::parse(HELLO_SHA256).unwrap();
        let err = check("http://m/a.jar", b"tampered", &expected).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Integrity);
        assert!(err.to_string().contains(HELLO_SHA256));
    }

    fn fixture() -> (Coordinate, Repository) {
        (
            "g:a:1.0".parse().unwrap(),
            Repository::new("http://mirror").unwrap(),
        )
    }

    #[tokio::test]
    async fn pinned_digest_wins_over_sidecar() {
        let (coordinate, repo) = fixture();
        let transport = Arc::new(FakeTransport::new());
        let verifier = Verifier::new(transport.clone(), AuditLog::disabled());
        let expected = ExpectedDigest::parse(HELLO_SHA256).unwrap();

        let verified = verifier
            .verify(&coordinate, &repo, b"hello".to_vec(), Some(&expected))
            .await
            .unwrap();

        assert_eq!(
            verified.verification,
            Verification::Pinned(DigestAlgorithm::Sha256)
        );
        assert_eq!(transport.total_requests(), 0);
    }

    #[tokio::test]
    async fn sidecar_verifies_and_rejects() {
        let (coordinate, repo) = fixture();
        let url = repo.artifact_url(&coordinate);
        let transport = Arc::new(FakeTransport::new());
        transport.serve(format!("{}.sha256", url), HELLO_SHA256.as_bytes().to_vec());
        let verifier = Verifier::new(transport.clone(), AuditLog::disabled());

        let ok = verifier
            .verify(&coordinate, &repo, b"hello".to_vec(), None)
            .await
            .unwrap();
        assert_eq!(ok.verification, Verification::Sidecar(DigestAlgorithm::Sha256));

        let err = verifier
            .verify(&coordinate, &repo, b"evil".to_vec(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlugdepsError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn unverified_is_accepted_and_audited() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::at(dir.path().join("audit.log"));
        let (coordinate, repo) = fixture();
        let verifier = Verifier::new(Arc::new(FakeTransport::new()), audit.clone());

        let verified = verifier
            .verify(&coordinate, &repo, b"hello".to_vec(), None)
            .await
            .unwrap();
        assert!(!verified.verification.is_verified());

        let log = tokio::fs::read_to_string(audit.path()).await.unwrap();
        assert!(log.contains("artifact.unverified"));
        assert!(log.contains("g:a:1.0"));
    }
}
