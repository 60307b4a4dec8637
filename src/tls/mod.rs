//! Mutual-TLS credentials
//!
//! Certificate material is read and checked once at startup. A
//! [`CredentialBundle`] only exists if the trust pool holds at least one
//! authority certificate and the local key pair is well formed and
//! consistent, so a server built from it always demands and verifies a peer
//! certificate.

use crate::config::TlsConfig;
use crate::error::CredentialError;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use rustls::{InconsistentKeys, RootCertStore};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

/// Reads PEM material
#[cfg_attr(test, mockall::automock)]
pub trait PemSource: Send + Sync {
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

/// Reads PEM files from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPemSource;

impl PemSource for FsPemSource {
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Locations of the three PEM files making up a credential bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    /// Authority that signs peer certificates
    pub ca_cert: PathBuf,
    /// Local certificate (chain) presented to the peer
    pub cert: PathBuf,
    /// Local private key
    pub key: PathBuf,
}

impl CertificatePaths {
    /// Server side: verifies client certificates
    pub fn server(config: &TlsConfig) -> Self {
        Self {
            ca_cert: config.ca_cert_path.clone(),
            cert: config.cert_path.clone(),
            key: config.key_path.clone(),
        }
    }

    /// Client side: verifies the server certificate
    pub fn client(config: &TlsConfig) -> Self {
        Self {
            ca_cert: config.ca_cert_path.clone(),
            cert: config.client_cert_path.clone(),
            key: config.client_key_path.clone(),
        }
    }
}

impl Default for CertificatePaths {
    fn default() -> Self {
        Self::server(&TlsConfig::default())
    }
}

/// Validated certificate material, shared by every connection
#[derive(Clone)]
pub struct CredentialBundle {
    /// The exact bytes `roots` was built from; tonic re-parses these, so the
    /// pool it trusts is the one checked at load time.
    ca_pem: Arc<[u8]>,
    cert_pem: Arc<[u8]>,
    key_pem: Arc<[u8]>,
    chain: Arc<[CertificateDer<'static>]>,
    roots: Arc<RootCertStore>,
}

impl CredentialBundle {
    /// Trusted authorities used to verify the peer
    pub fn trusted_roots(&self) -> &RootCertStore {
        &self.roots
    }

    /// Local certificate chain, leaf first
    pub fn certificate_chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    fn identity(&self) -> Identity {
        Identity::from_pem(&self.cert_pem, &self.key_pem)
    }

    fn ca_certificate(&self) -> Certificate {
        Certificate::from_pem(&self.ca_pem)
    }

    /// Server config requiring every client to present a certificate signed
    /// by one of the trusted roots
    pub fn server_tls_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(self.identity())
            .client_ca_root(self.ca_certificate())
            .client_auth_optional(false)
    }

    /// Client config presenting the local identity and verifying the server
    /// against the trusted roots under `domain`
    pub fn client_tls_config(&self, domain: impl Into<String>) -> ClientTlsConfig {
        ClientTlsConfig::new()
            .ca_certificate(self.ca_certificate())
            .identity(self.identity())
            .domain_name(domain)
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("trusted_roots", &self.roots.len())
            .field("chain_len", &self.chain.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Builds a [`CredentialBundle`] from PEM files
pub struct CredentialProvider<S = FsPemSource> {
    paths: CertificatePaths,
    source: S,
}

impl CredentialProvider<FsPemSource> {
    pub fn new(paths: CertificatePaths) -> Self {
        Self::with_source(paths, FsPemSource)
    }
}

impl<S: PemSource> CredentialProvider<S> {
    pub fn with_source(paths: CertificatePaths, source: S) -> Self {
        Self { paths, source }
    }

    pub fn paths(&self) -> &CertificatePaths {
        &self.paths
    }

    /// Load and check the trust pool and the local identity
    pub fn load(&self) -> Result<CredentialBundle, CredentialError> {
        let (ca_pem, roots) = self.load_trust_pool()?;
        let (cert_pem, key_pem, chain) = self.load_identity()?;

        tracing::info!(
            ca_cert = %self.paths.ca_cert.display(),
            cert = %self.paths.cert.display(),
            trusted_roots = roots.len(),
            "loaded mutual TLS credentials"
        );

        Ok(CredentialBundle {
            ca_pem: ca_pem.into(),
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
            chain: chain.into(),
            roots: Arc::new(roots),
        })
    }

    fn load_trust_pool(&self) -> Result<(Vec<u8>, RootCertStore), CredentialError> {
        let path = &self.paths.ca_cert;
        let trust_err = |reason: String| CredentialError::TrustStore {
            path: path.clone(),
            reason,
        };

        let pem = self.source.read(path).map_err(|e| trust_err(e.to_string()))?;
        let certs = CertificateDer::pem_slice_iter(&pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| trust_err(format!("parsing PEM: {}", e)))?;
        if certs.is_empty() {
            return Err(trust_err("no certificate found".to_string()));
        }

        let mut roots = RootCertStore::empty();
        for cert in certs {
            roots
                .add(cert)
                .map_err(|e| trust_err(format!("failed to add CA's certificate: {}", e)))?;
        }

        Ok((pem, roots))
    }

    #[allow(clippy::type_complexity)]
    fn load_identity(
        &self,
    ) -> Result<(Vec<u8>, Vec<u8>, Vec<CertificateDer<'static>>), CredentialError> {
        let identity_err = |path: &Path, reason: String| CredentialError::IdentityLoad {
            path: path.to_path_buf(),
            reason,
        };
        let cert_path = &self.paths.cert;
        let key_path = &self.paths.key;

        let cert_pem = self
            .source
            .read(cert_path)
            .map_err(|e| identity_err(cert_path, e.to_string()))?;
        let key_pem = self
            .source
            .read(key_path)
            .map_err(|e| identity_err(key_path, e.to_string()))?;

        let chain = CertificateDer::pem_slice_iter(&cert_pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| identity_err(cert_path, format!("parsing certificate: {}", e)))?;
        if chain.is_empty() {
            return Err(identity_err(cert_path, "no certificate found".to_string()));
        }

        let key = PrivateKeyDer::from_pem_slice(&key_pem)
            .map_err(|e| identity_err(key_path, format!("parsing private key: {}", e)))?;
        let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
            .map_err(|e| identity_err(key_path, format!("unsupported private key: {}", e)))?;

        match CertifiedKey::new(chain.clone(), signing_key).keys_match() {
            Err(rustls::Error::InconsistentKeys(InconsistentKeys::KeyMismatch)) => {
                return Err(identity_err(
                    key_path,
                    "private key does not match certificate".to_string(),
                ));
            }
            // Key types that cannot report their public half are accepted
            // here and rechecked by the TLS stack.
            _ => {}
        }

        Ok((cert_pem, key_pem, chain))
    }
}
