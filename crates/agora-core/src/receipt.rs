//! Delivery receipts and their verification.
//!
//! A receipt binds a request hash to a result hash and is signed by the
//! seller with an EIP-191 personal-message signature over the UTF-8 bytes of
//! `resultHash`. Anyone holding the seller's address can check it.

use chrono::{DateTime, Utc};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint as _;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::{AgoraError, Result};

const REQUIRED_FIELDS: [&str; 5] = ["requestHash", "resultHash", "provider", "timestamp", "signature"];

/// Seller-signed attestation over delivered work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub request_hash: String,
    pub result_hash: String,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    pub signature: String,
}

/// Outcome of checking a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptVerification {
    pub is_valid: bool,
    pub provider: String,
    /// Address the signature recovers to, when it recovers at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered: Option<String>,
}

impl Receipt {
    /// Parse a receipt from loose JSON, reporting the first missing field.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        for field in REQUIRED_FIELDS {
            let present = value
                .get(field)
                .map(|v| !v.is_null() && v.as_str().map_or(true, |s| !s.trim().is_empty()))
                .unwrap_or(false);
            if !present {
                return Err(AgoraError::MalformedReceipt {
                    field: field.to_string(),
                });
            }
        }
        serde_json::from_value(value).map_err(|e| AgoraError::MalformedReceipt {
            field: e.to_string(),
        })
    }

    /// Verify that `signature` over `result_hash` recovers to `provider`.
    ///
    /// A signature that does not match is a normal outcome (`is_valid: false`);
    /// only missing fields are an error.
    pub fn verify(&self) -> Result<ReceiptVerification> {
        let fields = [
            ("requestHash", &self.request_hash),
            ("resultHash", &self.result_hash),
            ("provider", &self.provider),
            ("signature", &self.signature),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(AgoraError::MalformedReceipt {
                    field: name.to_string(),
                });
            }
        }

        let recovered = recover_signer(self.result_hash.as_bytes(), &self.signature);
        let is_valid = match (&recovered, normalize_address(&self.provider)) {
            (Some(signer), Some(provider)) => *signer == provider,
            _ => false,
        };

        Ok(ReceiptVerification {
            is_valid,
            provider: self.provider.clone(),
            recovered,
        })
    }
}

/// Canonical lowercase `0x`-prefixed form of a 20-byte hex address.
pub fn normalize_address(address: &str) -> Option<String> {
    let trimmed = address.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", body.to_ascii_lowercase()))
}

/// Case-insensitive address comparison after normalization.
pub fn same_address(a: &str, b: &str) -> bool {
    match (normalize_address(a), normalize_address(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// `0x`-prefixed keccak256 of a result text, the value sellers put in `resultHash`.
pub fn result_digest(text: &str) -> String {
    format!("0x{}", hex::encode(Keccak256::digest(text.as_bytes())))
}

/// keccak256 of the EIP-191 personal-message envelope.
fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

fn address_of(key: &VerifyingKey) -> String {
    let encoded = key.to_encoded_point(false);
    // Skip the 0x04 prefix, hash x || y.
    let hash = Keccak256::digest(&encoded.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Recover the signer address of a 65-byte `r || s || v` hex signature.
///
/// Returns `None` for anything that does not decode or recover.
pub fn recover_signer(message: &[u8], signature_hex: &str) -> Option<String> {
    let raw = signature_hex.trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(raw).ok()?;
    if bytes.len() != 65 {
        return None;
    }

    let signature = Signature::from_slice(&bytes[..64]).ok()?;
    let v = match bytes[64] {
        27 | 28 => bytes[64] - 27,
        0 | 1 => bytes[64],
        _ => return None,
    };
    let recovery_id = RecoveryId::from_byte(v)?;

    let prehash = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&prehash, &signature, recovery_id).ok()?;
    Some(address_of(&key))
}

/// In-process secp256k1 signer: the "sign message" capability for sellers.
pub struct LocalSigner {
    key: SigningKey,
    address: String,
}

impl LocalSigner {
    /// Generate a fresh random key.
    pub fn random() -> Self {
        Self::from_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    /// Load a key from 32 raw bytes.
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(secret)
            .map_err(|e| AgoraError::internal(format!("invalid signing key: {}", e)))?;
        Ok(Self::from_key(key))
    }

    /// Load a key from hex, with or without `0x`.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let trimmed = secret.trim();
        let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|e| AgoraError::internal(format!("invalid signing key hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    fn from_key(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }

    /// Lowercase address of this signer.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// EIP-191 sign `message`, returning `0x`-prefixed `r || s || v` with v in {27, 28}.
    pub fn sign_message(&self, message: &[u8]) -> Result<String> {
        let prehash = personal_message_hash(message);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| AgoraError::internal(format!("signing failed: {}", e)))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(format!("0x{}", hex::encode(out)))
    }

    /// Build and sign a receipt for a delivered result.
    pub fn sign_receipt(&self, request_hash: impl Into<String>, result: &str) -> Result<Receipt> {
        let result_hash = result_digest(result);
        let signature = self.sign_message(result_hash.as_bytes())?;
        Ok(Receipt {
            request_hash: request_hash.into(),
            result_hash,
            provider: self.address.clone(),
            timestamp: Utc::now(),
            signature,
        })
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner").field("address", &self.address).finish()
    }
}
