//! Threshold sharing of wallet keys
//!
//! Private keys are split 2-of-3 with Shamir's scheme over GF(256). Each share
//! carries its x-coordinate as a one-byte prefix, so a share travels as one
//! opaque byte string:
//!
//! ```text
//! [x: 1 byte][y: 32 bytes]
//! ```
//!
//! x = 0 is the device share, 1 the server share, 2 the recovery share. Each
//! byte of the secret gets its own random line `f(t) = s + a*t`, and the share
//! with index `x` holds `f(x + 1)`. A single share is uniformly distributed
//! whatever the secret, so it carries no information about the key.
//!
//! Two shares from different split events still interpolate to *some* value.
//! Callers that know the wallet address use [`combine_for_address`], which
//! rejects a key that does not derive to it. A third share, when supplied, is
//! checked against the line through the first two.

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

/// Width of a secp256k1 private key
pub const SECRET_LEN: usize = 32;
/// Shares produced by one split
pub const TOTAL_SHARES: usize = 3;
/// Shares needed to reconstruct
pub const THRESHOLD: usize = 2;

pub const DEVICE_INDEX: u8 = 0;
pub const SERVER_INDEX: u8 = 1;
pub const RECOVERY_INDEX: u8 = 2;

const SHARE_LEN: usize = SECRET_LEN + 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShareError {
    #[error("Invalid secret length: expected {expected} bytes, got {actual}")]
    InvalidSecretLength { expected: usize, actual: usize },

    #[error("Invalid share: {0}")]
    InvalidShare(String),

    #[error("Insufficient shares: need {required}, got {provided}")]
    InsufficientShares { required: usize, provided: usize },

    #[error("Reconstruction mismatch: {0}")]
    ReconstructionMismatch(String),

    #[error("Split failed: {0}")]
    Split(String),
}

/// One threshold share, zeroed on drop
#[derive(Clone)]
pub struct Share(Zeroizing<Vec<u8>>);

impl Share {
    /// Wrap raw share bytes, validating length and x-coordinate
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ShareError> {
        let bytes = Zeroizing::new(bytes);
        if bytes.len() != SHARE_LEN {
            return Err(ShareError::InvalidShare(format!(
                "expected {} bytes, got {}",
                SHARE_LEN,
                bytes.len()
            )));
        }
        if bytes[0] as usize >= TOTAL_SHARES {
            return Err(ShareError::InvalidShare(format!(
                "unknown share index {}",
                bytes[0]
            )));
        }
        Ok(Self(bytes))
    }

    /// The share's x-coordinate
    pub fn index(&self) -> u8 {
        self.0[0]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn y(&self) -> &[u8] {
        &self.0[1..]
    }

    /// `0x`-prefixed lowercase hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.as_bytes()))
    }
}

impl FromStr for Share {
    type Err = ShareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(ShareError::InvalidShare("share is empty".to_string()));
        }
        let bytes = hex::decode(digits)
            .map_err(|e| ShareError::InvalidShare(format!("not valid hex: {}", e)))?;
        Self::from_bytes(bytes)
    }
}

impl PartialEq for Share {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Share {}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index())
            .finish_non_exhaustive()
    }
}

impl Serialize for Share {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Share {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = Zeroizing::new(String::deserialize(deserializer)?);
        encoded.parse().map_err(serde::de::Error::custom)
    }
}

/// The three shares of one split event
#[derive(Debug, Clone)]
pub struct ShareSet {
    pub device: Share,
    pub server: Share,
    pub recovery: Share,
}

/// Reconstructed private key
///
/// Lives only in memory for the duration of one signing operation. The buffer
/// is zeroed when the value is dropped, which covers early returns, panics and
/// cancelled futures alike.
pub struct SigningKey(Zeroizing<[u8; SECRET_LEN]>);

impl SigningKey {
    fn from_slice(bytes: &[u8]) -> Result<Self, ShareError> {
        let array: [u8; SECRET_LEN] =
            bytes
                .try_into()
                .map_err(|_| ShareError::InvalidSecretLength {
                    expected: SECRET_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(Zeroizing::new(array)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }

    /// Signer for submitting transactions with this key
    pub fn signer(&self) -> Result<PrivateKeySigner, ShareError> {
        PrivateKeySigner::from_slice(self.as_bytes()).map_err(|e| {
            ShareError::ReconstructionMismatch(format!("not a valid secp256k1 key: {}", e))
        })
    }

    /// EVM address of the key
    pub fn address(&self) -> Result<Address, ShareError> {
        Ok(self.signer()?.address())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Generate a fresh key pair
pub fn generate_key_pair() -> Result<(Address, SigningKey), ShareError> {
    let signer = PrivateKeySigner::random();
    let address = signer.address();

    let mut raw = signer.to_bytes();
    let key = SigningKey::from_slice(raw.as_slice());
    raw.0.zeroize();

    Ok((address, key?))
}

// ============================================================================
// GF(256) arithmetic (AES polynomial x^8 + x^4 + x^3 + x + 1)
// ============================================================================

fn gf_mul(a: u8, b: u8) -> u8 {
    let mut a = a;
    let mut b = b;
    let mut product = 0u8;
    for _ in 0..8 {
        product ^= a & 0u8.wrapping_sub(b & 1);
        let carry = 0u8.wrapping_sub(a >> 7);
        a = (a << 1) ^ (carry & 0x1b);
        b >>= 1;
    }
    product
}

/// a^254, the inverse of any non-zero element
fn gf_inv(a: u8) -> u8 {
    let mut result = 1u8;
    let mut base = a;
    let mut exp = 254u8;
    while exp > 0 {
        if exp & 1 == 1 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    result
}

/// Evaluation point of a share index; 0 is reserved for the secret
fn eval_point(index: u8) -> u8 {
    index + 1
}

/// Split a 32-byte secret into device, server and recovery shares
pub fn split(secret: &[u8]) -> Result<ShareSet, ShareError> {
    if secret.len() != SECRET_LEN {
        return Err(ShareError::InvalidSecretLength {
            expected: SECRET_LEN,
            actual: secret.len(),
        });
    }

    let mut slopes = Zeroizing::new([0u8; SECRET_LEN]);
    OsRng
        .try_fill_bytes(&mut slopes[..])
        .map_err(|e| ShareError::Split(format!("random source failed: {}", e)))?;

    let share_at = |index: u8| -> Result<Share, ShareError> {
        let x = eval_point(index);
        let mut bytes = Vec::with_capacity(SHARE_LEN);
        bytes.push(index);
        bytes.extend(
            secret
                .iter()
                .zip(slopes.iter())
                .map(|(s, a)| s ^ gf_mul(*a, x)),
        );
        Share::from_bytes(bytes)
    };

    Ok(ShareSet {
        device: share_at(DEVICE_INDEX)?,
        server: share_at(SERVER_INDEX)?,
        recovery: share_at(RECOVERY_INDEX)?,
    })
}

/// Reconstruct a key from at least `THRESHOLD` shares of the same split
///
/// Two shares always interpolate to a value; only extra shares can be
/// checked here. Use [`combine_for_address`] when the address is known.
pub fn combine(shares: &[Share]) -> Result<SigningKey, ShareError> {
    if shares.len() < THRESHOLD {
        return Err(ShareError::InsufficientShares {
            required: THRESHOLD,
            provided: shares.len(),
        });
    }

    let mut seen = Vec::with_capacity(shares.len());
    for share in shares {
        if seen.contains(&share.index()) {
            return Err(ShareError::InvalidShare(format!(
                "share index {} supplied twice",
                share.index()
            )));
        }
        seen.push(share.index());
    }

    let (first, second) = (&shares[0], &shares[1]);
    let x1 = eval_point(first.index());
    let x2 = eval_point(second.index());
    let denominator = gf_inv(x1 ^ x2);
    let x1_inv = gf_inv(x1);

    let mut secret = Zeroizing::new([0u8; SECRET_LEN]);
    let mut slopes = Zeroizing::new([0u8; SECRET_LEN]);
    for i in 0..SECRET_LEN {
        let (y1, y2) = (first.y()[i], second.y()[i]);
        secret[i] = gf_mul(gf_mul(y1, x2) ^ gf_mul(y2, x1), denominator);
        slopes[i] = gf_mul(y1 ^ secret[i], x1_inv);
    }

    let mut drift = 0u8;
    for extra in &shares[THRESHOLD..] {
        let x = eval_point(extra.index());
        for i in 0..SECRET_LEN {
            drift |= extra.y()[i] ^ secret[i] ^ gf_mul(slopes[i], x);
        }
    }
    if drift != 0 {
        return Err(ShareError::ReconstructionMismatch(
            "shares do not lie on one polynomial".to_string(),
        ));
    }

    let key = SigningKey::from_slice(&secret[..])?;

    // rejects zero and out-of-range scalars
    key.signer()?;

    Ok(key)
}

/// Reconstruct a key and check it belongs to `expected`
pub fn combine_for_address(shares: &[Share], expected: Address) -> Result<SigningKey, ShareError> {
    let key = combine(shares)?;
    let derived = key.address()?;
    if derived != expected {
        return Err(ShareError::ReconstructionMismatch(format!(
            "reconstructed key belongs to {}, expected {}",
            derived, expected
        )));
    }
    Ok(key)
}
