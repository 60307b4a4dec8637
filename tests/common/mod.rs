//! Common test utilities

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use grpc_guard::config::{JwtConfig, TlsConfig};
use grpc_guard::jwt::{FixedClock, TokenService, DEFAULT_TOKEN_TTL_SECS};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Tokens
// ============================================================================

pub const TEST_SECRET: &str = "test-secret-key-for-testing-purposes-only";

pub fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        secret: TEST_SECRET.to_string(),
        token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Token service whose clock reads `epoch() + offset`
pub fn token_service_at(offset: Duration) -> TokenService {
    TokenService::new(&test_jwt_config()).with_clock(Arc::new(FixedClock(epoch() + offset)))
}

// ============================================================================
// Certificates
// ============================================================================

/// PEM material for a CA plus one server and one client leaf it signed
pub struct TestPki {
    pub ca_cert: String,
    pub server_cert: String,
    pub server_key: String,
    pub client_cert: String,
    pub client_key: String,
}

impl TestPki {
    pub fn generate() -> Self {
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "grpc-guard test CA");
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_key = KeyPair::generate().unwrap();
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let leaf = |name: &str, usage: ExtendedKeyUsagePurpose| {
            let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
            params.distinguished_name.push(DnType::CommonName, name);
            params.extended_key_usages = vec![usage];
            let key = KeyPair::generate().unwrap();
            let cert = params.signed_by(&key, &ca, &ca_key).unwrap();
            (cert.pem(), key.serialize_pem())
        };
        let (server_cert, server_key) = leaf("localhost", ExtendedKeyUsagePurpose::ServerAuth);
        let (client_cert, client_key) = leaf("client", ExtendedKeyUsagePurpose::ClientAuth);

        Self {
            ca_cert: ca.pem(),
            server_cert,
            server_key,
            client_cert,
            client_key,
        }
    }

    /// Write the material under `<dir>/cert/` using the default file names
    pub fn write_to(&self, dir: &Path) {
        let cert_dir = dir.join("cert");
        fs::create_dir_all(&cert_dir).unwrap();
        fs::write(cert_dir.join("ca-cert.pem"), &self.ca_cert).unwrap();
        fs::write(cert_dir.join("server-cert.pem"), &self.server_cert).unwrap();
        fs::write(cert_dir.join("server-key.pem"), &self.server_key).unwrap();
        fs::write(cert_dir.join("client-cert.pem"), &self.client_cert).unwrap();
        fs::write(cert_dir.join("client-key.pem"), &self.client_key).unwrap();
    }
}

/// Default TLS layout rooted at `dir`
pub fn tls_config_in(dir: &Path) -> TlsConfig {
    let defaults = TlsConfig::default();
    TlsConfig {
        ca_cert_path: dir.join(defaults.ca_cert_path),
        cert_path: dir.join(defaults.cert_path),
        key_path: dir.join(defaults.key_path),
        client_cert_path: dir.join(defaults.client_cert_path),
        client_key_path: dir.join(defaults.client_key_path),
    }
}

/// Temp dir holding a freshly generated PKI
pub fn pki_dir() -> (TempDir, TestPki) {
    let dir = TempDir::new().unwrap();
    let pki = TestPki::generate();
    pki.write_to(dir.path());
    (dir, pki)
}
