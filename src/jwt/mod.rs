//! Identity token issuance and validation
//!
//! Tokens are compact HS256 JWTs carrying `sub`, `iss` (issued-at, Unix
//! seconds) and `exp`. Nothing is stored server side: a token is valid until
//! its `exp` second, and validation is a pure function of the token, the
//! secret and the current time.

use crate::config::JwtConfig;
use crate::error::{AuthError, SigningError};
use crate::telemetry::metrics::TOKENS_ISSUED;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData,
    Validation,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Token lifetime when none is configured (15 minutes)
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Longest token lifetime a configuration may ask for (one day)
pub const MAX_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Algorithms accepted on validation. Anything outside the HMAC family is
/// rejected before the signature is looked at.
pub const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Identity token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject (caller identifier)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iss: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl IdentityClaims {
    /// Claims valid from `issued_at` for `ttl`; `None` if the expiry is not a
    /// representable instant.
    pub fn new(
        subject: impl Into<String>,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Option<Self> {
        let expires_at = issued_at.checked_add_signed(ttl)?;
        Some(Self {
            sub: subject.into(),
            iss: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        })
    }
}

/// Loosely typed view of incoming claims, so a missing or non-string `sub`
/// can be told apart from claims that do not decode at all.
#[derive(Deserialize)]
struct IncomingClaims {
    #[serde(default)]
    sub: Option<Value>,
    exp: i64,
    #[allow(dead_code)]
    #[serde(default)]
    iss: Option<i64>,
}

/// Signing/verification primitive behind [`TokenService`]
#[cfg_attr(test, mockall::automock)]
pub trait TokenCodec: Send + Sync {
    fn sign(&self, header: &Header, claims: &IdentityClaims)
        -> jsonwebtoken::errors::Result<String>;

    fn verify(
        &self,
        token: &str,
        validation: &Validation,
    ) -> jsonwebtoken::errors::Result<TokenData<Value>>;
}

/// HMAC codec backed by a shared secret
#[derive(Clone)]
pub struct HmacCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl HmacCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }
}

impl TokenCodec for HmacCodec {
    fn sign(
        &self,
        header: &Header,
        claims: &IdentityClaims,
    ) -> jsonwebtoken::errors::Result<String> {
        encode(header, claims, &self.encoding_key)
    }

    fn verify(
        &self,
        token: &str,
        validation: &Validation,
    ) -> jsonwebtoken::errors::Result<TokenData<Value>> {
        decode::<Value>(token, &self.decoding_key, validation)
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant, for tests and tooling
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Issues and validates identity tokens
#[derive(Clone)]
pub struct TokenService {
    codec: Arc<dyn TokenCodec>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl TokenService {
    /// HMAC-SHA256 service on the wall clock.
    ///
    /// The TTL is clamped to `1..=MAX_TOKEN_TTL_SECS`; [`crate::Config`]
    /// already rejects values outside that range.
    pub fn new(config: &JwtConfig) -> Self {
        Self::with_ports(
            Arc::new(HmacCodec::new(config.secret.as_bytes())),
            Arc::new(SystemClock),
            Duration::seconds(config.token_ttl_secs.clamp(1, MAX_TOKEN_TTL_SECS)),
        )
    }

    pub fn with_ports(codec: Arc<dyn TokenCodec>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { codec, clock, ttl }
    }

    /// Replace the clock, keeping codec and TTL
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject`, valid from now for the configured TTL
    pub fn issue(&self, subject: &str) -> Result<String, SigningError> {
        let claims = IdentityClaims::new(subject, self.clock.now(), self.ttl)
            .ok_or(SigningError::ExpiryOutOfRange)?;
        let header = Header::new(Algorithm::HS256);

        let token = self.codec.sign(&header, &claims)?;
        counter!(TOKENS_ISSUED).increment(1);
        tracing::debug!(subject, expires_at = claims.exp, "issued identity token");
        Ok(token)
    }

    /// Validate `token` and return its subject
    pub fn validate(&self, token: &str) -> Result<String, AuthError> {
        let header = match decode_header(token) {
            Ok(header) => header,
            Err(e) => return Err(classify_header_error(token, e)),
        };
        if !HMAC_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::BadAlgorithm(format!("{:?}", header.alg)));
        }

        let data = self
            .codec
            .verify(token, &validation())
            .map_err(classify)?;

        let claims: IncomingClaims = serde_json::from_value(data.claims)
            .map_err(|e| AuthError::Invalid(e.to_string()))?;

        // exp is the first second at which the token is no longer accepted
        if self.clock.now().timestamp() >= claims.exp {
            return Err(AuthError::Invalid("token has expired".to_string()));
        }

        match claims.sub {
            Some(Value::String(subject)) => Ok(subject),
            _ => Err(AuthError::MissingSubject),
        }
    }
}

/// Signature and algorithm checks only; expiry is compared against the
/// injected clock in [`TokenService::validate`].
fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = HMAC_ALGORITHMS.to_vec();
    validation.leeway = 0;
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

fn classify(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::MissingAlgorithm => AuthError::BadAlgorithm(err.to_string()),
        ErrorKind::Json(_)
        | ErrorKind::ExpiredSignature
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_) => AuthError::Invalid(err.to_string()),
        _ => AuthError::Malformed(err.to_string()),
    }
}

/// `decode_header` rejects algorithms it has no variant for (`none`, for
/// instance). Those still count as an algorithm substitution, not garbage.
/// A header naming an accepted algorithm that fails for another reason is
/// malformed.
fn classify_header_error(token: &str, err: jsonwebtoken::errors::Error) -> AuthError {
    #[derive(Deserialize)]
    struct RawHeader {
        alg: String,
    }

    let alg = token
        .split('.')
        .next()
        .and_then(|segment| URL_SAFE_NO_PAD.decode(segment).ok())
        .and_then(|bytes| serde_json::from_slice::<RawHeader>(&bytes).ok())
        .map(|header| header.alg);

    match alg {
        Some(alg) if !is_hmac(&alg) => AuthError::BadAlgorithm(alg),
        _ => AuthError::Malformed(err.to_string()),
    }
}

fn is_hmac(alg: &str) -> bool {
    alg.parse::<Algorithm>()
        .map(|alg| HMAC_ALGORITHMS.contains(&alg))
        .unwrap_or(false)
}
