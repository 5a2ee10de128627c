//! Sealed artifacts.
//!
//! Layout: `b"SQLG" | version | kind | nonce[12] | ciphertext+tag`. The first
//! six bytes are bound as associated data, so changing the kind byte or any
//! ciphertext bit fails authentication.

use crate::errors::IntegrityError;
use crate::model::{SealedReport, TestSuite};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

pub const MAGIC: &[u8; 4] = b"SQLG";
pub const VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + 2;
const KEY_CONTEXT: &[u8] = b"sqlgrade/v1/key";

/// Symmetric key derived from the build secret.
#[derive(Clone)]
pub struct Secret([u8; 32]);

impl Secret {
    pub fn from_bytes(secret: &[u8]) -> Self {
        let mut h = Sha256::new();
        h.update(KEY_CONTEXT);
        h.update(secret);
        Self(h.finalize().into())
    }

    /// `None` or an empty value means no secret was compiled in.
    pub fn from_build(value: Option<&str>) -> Option<Self> {
        value
            .filter(|v| !v.is_empty())
            .map(|v| Self::from_bytes(v.as_bytes()))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Suite,
    Report,
}

impl ArtifactKind {
    fn byte(self) -> u8 {
        match self {
            ArtifactKind::Suite => 1,
            ArtifactKind::Report => 2,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(ArtifactKind::Suite),
            2 => Some(ArtifactKind::Report),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ArtifactKind::Suite => "test suite",
            ArtifactKind::Report => "grading report",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub kind: ArtifactKind,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    fn header(kind: ArtifactKind) -> [u8; HEADER_LEN] {
        let mut h = [0u8; HEADER_LEN];
        h[..4].copy_from_slice(MAGIC);
        h[4] = VERSION;
        h[5] = kind.byte();
        h
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&Self::header(self.kind));
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IntegrityError> {
        if bytes.len() < HEADER_LEN + NONCE_LEN || &bytes[..4] != MAGIC {
            return Err(IntegrityError::Malformed);
        }
        if bytes[4] != VERSION {
            return Err(IntegrityError::UnsupportedVersion(bytes[4]));
        }
        // An unknown kind byte can only come from tampering.
        let kind = ArtifactKind::from_byte(bytes[5]).ok_or(IntegrityError::Tampered)?;
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[HEADER_LEN..HEADER_LEN + NONCE_LEN]);
        Ok(Self {
            kind,
            nonce,
            ciphertext: bytes[HEADER_LEN + NONCE_LEN..].to_vec(),
        })
    }
}

/// Seals and opens suites and reports with the injected secret.
#[derive(Debug, Clone)]
pub struct Codec {
    secret: Option<Secret>,
}

impl Codec {
    pub fn new(secret: Option<Secret>) -> Self {
        Self { secret }
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, IntegrityError> {
        let secret = self.secret.as_ref().ok_or(IntegrityError::MissingSecret)?;
        Ok(ChaCha20Poly1305::new(Key::from_slice(&secret.0)))
    }

    pub fn seal<T: Serialize>(&self, kind: ArtifactKind, value: &T) -> Result<Vec<u8>, IntegrityError> {
        let cipher = self.cipher()?;
        let plain = serde_json::to_vec(value).map_err(|e| IntegrityError::Payload(e.to_string()))?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let header = EncryptedPayload::header(kind);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: &plain,
                    aad: &header,
                },
            )
            .map_err(|_| IntegrityError::Payload("encryption failed".into()))?;

        let mut n = [0u8; NONCE_LEN];
        n.copy_from_slice(nonce.as_slice());
        Ok(EncryptedPayload {
            kind,
            nonce: n,
            ciphertext,
        }
        .to_bytes())
    }

    pub fn open<T: DeserializeOwned>(&self, kind: ArtifactKind, bytes: &[u8]) -> Result<T, IntegrityError> {
        let cipher = self.cipher()?;
        let payload = EncryptedPayload::from_bytes(bytes)?;
        let header = EncryptedPayload::header(payload.kind);
        let plain = cipher
            .decrypt(
                Nonce::from_slice(&payload.nonce),
                Payload {
                    msg: &payload.ciphertext,
                    aad: &header,
                },
            )
            .map_err(|_| IntegrityError::Tampered)?;
        if payload.kind != kind {
            return Err(IntegrityError::WrongKind {
                expected: kind.name(),
                found: payload.kind.name(),
            });
        }
        serde_json::from_slice(&plain).map_err(|e| IntegrityError::Payload(e.to_string()))
    }

    pub fn seal_suite(&self, suite: &TestSuite) -> Result<Vec<u8>, IntegrityError> {
        suite.validate().map_err(IntegrityError::Payload)?;
        self.seal(ArtifactKind::Suite, suite)
    }

    pub fn open_suite(&self, bytes: &[u8]) -> Result<TestSuite, IntegrityError> {
        let suite: TestSuite = self.open(ArtifactKind::Suite, bytes)?;
        suite.validate().map_err(IntegrityError::Payload)?;
        tracing::debug!(
            event = "sqlgrade.suite.decrypted",
            lab = %suite.lab,
            mode = %suite.mode,
            tests = suite.tests.len(),
        );
        Ok(suite)
    }

    pub fn seal_report(&self, report: &SealedReport) -> Result<Vec<u8>, IntegrityError> {
        self.seal(ArtifactKind::Report, report)
    }

    pub fn open_report(&self, bytes: &[u8]) -> Result<SealedReport, IntegrityError> {
        self.open(ArtifactKind::Report, bytes)
    }
}
