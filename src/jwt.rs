//! Claims codec: HS256 signing and verification of claim maps.
//!
//! Access and refresh tokens are signed with different secrets, so a token
//! minted under one secret never verifies under the other.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::issuer::access_id_of_refresh;

/// Claim key for the owning user id.
pub const CLAIM_USER_ID: &str = "user_id";
/// Claim key for the access token id.
pub const CLAIM_ACCESS_UUID: &str = "access_uuid";
/// Claim key for the refresh token id.
pub const CLAIM_REFRESH_UUID: &str = "refresh_uuid";
/// Claim key for the expiry (Unix seconds).
pub const CLAIM_EXPIRES: &str = "exp";
/// Claim key for the comma-joined role list.
pub const CLAIM_ROLE: &str = "role";

/// Keys owned by the codec. Callers cannot supply these as extras.
pub const RESERVED_CLAIMS: [&str; 5] = [
    CLAIM_USER_ID,
    CLAIM_ACCESS_UUID,
    CLAIM_REFRESH_UUID,
    CLAIM_EXPIRES,
    CLAIM_ROLE,
];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_CLAIMS.contains(&key)
}

/// A single claim value. Anything else found in a token is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ClaimValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClaimValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ClaimValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        ClaimValue::Str(value.to_string())
    }
}

impl From<String> for ClaimValue {
    fn from(value: String) -> Self {
        ClaimValue::Str(value)
    }
}

impl From<i64> for ClaimValue {
    fn from(value: i64) -> Self {
        ClaimValue::Int(value)
    }
}

impl From<f64> for ClaimValue {
    fn from(value: f64) -> Self {
        ClaimValue::Float(value)
    }
}

impl From<bool> for ClaimValue {
    fn from(value: bool) -> Self {
        ClaimValue::Bool(value)
    }
}

/// String-keyed claim set carried inside a signed token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(BTreeMap<String, ClaimValue>);

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ClaimValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ClaimValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ClaimValue::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<ClaimValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClaimValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of every non-reserved entry.
    pub fn extras(&self) -> Claims {
        Claims(
            self.0
                .iter()
                .filter(|(k, _)| !is_reserved(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Expiry claim as Unix seconds.
    pub fn expires_at(&self) -> Option<u64> {
        self.get(CLAIM_EXPIRES)
            .and_then(ClaimValue::as_i64)
            .and_then(|n| u64::try_from(n).ok())
    }

    fn required_str(&self, key: &str) -> Result<String> {
        match self.get_str(key) {
            Some(s) if !s.is_empty() => Ok(s.to_string()),
            _ => Err(AuthError::Malformed),
        }
    }
}

impl FromIterator<(String, ClaimValue)> for Claims {
    fn from_iter<I: IntoIterator<Item = (String, ClaimValue)>>(iter: I) -> Self {
        Claims(iter.into_iter().collect())
    }
}

/// Current time in Unix seconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Signs and verifies claim maps with a single symmetric secret.
#[derive(Clone)]
pub struct ClaimsCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl ClaimsCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn sign(&self, claims: &Claims) -> Result<String> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::SigningFailed(e.to_string()))
    }

    /// Verify signature and expiry, returning the full claim set.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        self.decode(token, true)
    }

    /// Verify the signature only. Used where an expired token still has to
    /// identify its session, such as logout.
    pub fn verify_ignoring_expiry(&self, token: &str) -> Result<Claims> {
        self.decode(token, false)
    }

    fn decode(&self, token: &str, validate_exp: bool) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        validation.validate_aud = false;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Malformed,
            })?;

        Ok(data.claims)
    }
}

/// The pair of codecs used by the service.
#[derive(Clone)]
pub struct JwtConfig {
    access: ClaimsCodec,
    refresh: ClaimsCodec,
}

impl JwtConfig {
    /// Both secrets must be non-empty and distinct.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Result<Self> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(AuthError::SigningFailed("empty signing secret".into()));
        }
        if access_secret == refresh_secret {
            return Err(AuthError::SigningFailed(
                "access and refresh secrets must differ".into(),
            ));
        }
        Ok(Self {
            access: ClaimsCodec::new(access_secret),
            refresh: ClaimsCodec::new(refresh_secret),
        })
    }

    pub fn access(&self) -> &ClaimsCodec {
        &self.access
    }

    pub fn refresh(&self) -> &ClaimsCodec {
        &self.refresh
    }
}

/// Claims reconstructed from a verified access token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessClaims {
    pub token_id: String,
    pub user_id: String,
    /// Comma-joined role list
    pub role: String,
    pub expires_at: u64,
    /// Passthrough claims supplied at issuance
    pub extra: Claims,
}

impl AccessClaims {
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.role.split(',').map(str::trim).filter(|r| !r.is_empty())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles().any(|r| r == role)
    }
}

impl TryFrom<Claims> for AccessClaims {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self> {
        let role = match claims.get(CLAIM_ROLE) {
            Some(ClaimValue::Str(role)) => role.clone(),
            _ => return Err(AuthError::Malformed),
        };
        Ok(Self {
            token_id: claims.required_str(CLAIM_ACCESS_UUID)?,
            user_id: claims.required_str(CLAIM_USER_ID)?,
            role,
            expires_at: claims.expires_at().ok_or(AuthError::Malformed)?,
            extra: claims.extras(),
        })
    }
}

/// Claims reconstructed from a verified refresh token.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshClaims {
    pub token_id: String,
    pub user_id: String,
    pub expires_at: u64,
    pub extra: Claims,
}

impl RefreshClaims {
    /// Id of the access token minted alongside this refresh token.
    pub fn access_token_id(&self) -> &str {
        access_id_of_refresh(&self.token_id, &self.user_id).unwrap_or_default()
    }
}

impl TryFrom<Claims> for RefreshClaims {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self> {
        let token_id = claims.required_str(CLAIM_REFRESH_UUID)?;
        let user_id = claims.required_str(CLAIM_USER_ID)?;
        if access_id_of_refresh(&token_id, &user_id).is_none() {
            return Err(AuthError::Malformed);
        }
        Ok(Self {
            token_id,
            user_id,
            expires_at: claims.expires_at().ok_or(AuthError::Malformed)?,
            extra: claims.extras(),
        })
    }
}
