//! Combined TLS configuration for a multi-host listener.
//!
//! One listener serves every HTTPS vhost bound to its address, so all of
//! their certificate/key pairs are loaded into a single SNI resolver, with
//! the first vhost's certificate as the fallback for clients that send no
//! (or an unknown) server name. Protocol bounds and cipher restriction come
//! from the first vhost; a client-CA pool is built when any vhost asks for
//! client auth.

use crate::config::schema::TlsSettings;
use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert, ResolvesServerCertUsingSni, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::RootCertStore;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {path}")]
    NoCertificates { path: PathBuf },

    #[error("no usable private key in {path}")]
    NoPrivateKey { path: PathBuf },

    #[error("bad TLS protocol bounds '{min}'..'{max}'")]
    BadProtocolRange { min: String, max: String },

    #[error("no configured cipher suite is supported")]
    NoCipherOverlap,

    #[error("client CA verifier: {0}")]
    ClientAuth(String),

    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// Build one rustls server config covering every (hostname, settings) pair
/// bound to a listener.
pub fn build_server_config(
    sites: &[(String, TlsSettings)],
) -> Result<rustls::ServerConfig, TlsError> {
    let first = &sites[0].1;

    let mut provider = ring::default_provider();
    if !first.ciphers.is_empty() {
        provider.cipher_suites.retain(|suite| {
            let name = format!("{:?}", suite.suite());
            first.ciphers.iter().any(|want| want.eq_ignore_ascii_case(&name))
        });
        if provider.cipher_suites.is_empty() {
            return Err(TlsError::NoCipherOverlap);
        }
    }
    let provider = Arc::new(provider);

    let versions = protocol_versions(first)?;
    let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&versions)?;

    let client_ca_paths: Vec<&PathBuf> =
        sites.iter().flat_map(|(_, s)| s.client_certs.iter()).collect();
    let builder = if client_ca_paths.is_empty() {
        builder.with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        for path in client_ca_paths {
            for cert in load_certs(path)? {
                roots.add(cert)?;
            }
        }
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|e| TlsError::ClientAuth(e.to_string()))?;
        builder.with_client_cert_verifier(verifier)
    };

    let mut by_name = ResolvesServerCertUsingSni::new();
    let mut fallback = None;
    for (host, settings) in sites {
        let chain = load_certs(&settings.certificate)?;
        let key = load_key(&settings.key)?;
        let signing = ring::sign::any_supported_type(&key)?;
        let certified = Arc::new(CertifiedKey::new(chain, signing));
        if fallback.is_none() {
            fallback = Some(certified.clone());
        }
        // IP-literal hosts are not valid SNI names; they are covered by the
        // fallback certificate.
        if let Err(error) = by_name.add(host, certified.as_ref().clone()) {
            tracing::debug!(host = %host, %error, "host not added to SNI map");
        }
    }
    let fallback = fallback.ok_or(TlsError::NoCertificates { path: PathBuf::new() })?;

    let mut config = builder.with_cert_resolver(Arc::new(CertResolver { by_name, fallback }));
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// SNI resolution with a fallback certificate for nameless clients.
struct CertResolver {
    by_name: ResolvesServerCertUsingSni,
    fallback: Arc<CertifiedKey>,
}

impl ResolvesServerCert for CertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.by_name.resolve(client_hello).or_else(|| Some(self.fallback.clone()))
    }
}

impl fmt::Debug for CertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertResolver").finish_non_exhaustive()
    }
}

fn protocol_versions(
    settings: &TlsSettings,
) -> Result<Vec<&'static rustls::SupportedProtocolVersion>, TlsError> {
    let ordered = [("tls1.2", &rustls::version::TLS12), ("tls1.3", &rustls::version::TLS13)];
    let bad = || TlsError::BadProtocolRange {
        min: settings.protocol_min.clone(),
        max: settings.protocol_max.clone(),
    };
    let min = ordered.iter().position(|(n, _)| *n == settings.protocol_min).ok_or_else(bad)?;
    let max = ordered.iter().position(|(n, _)| *n == settings.protocol_max).ok_or_else(bad)?;
    if min > max {
        return Err(bad());
    }
    Ok(ordered[min..=max].iter().map(|(_, v)| *v).collect())
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io { path: path.to_path_buf(), source })?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .map_err(|source| TlsError::Io { path: path.to_path_buf(), source })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates { path: path.to_path_buf() });
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io { path: path.to_path_buf(), source })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| TlsError::Io { path: path.to_path_buf(), source })?
        .ok_or_else(|| TlsError::NoPrivateKey { path: path.to_path_buf() })
}
