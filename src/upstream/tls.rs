//! Per-target TLS client configuration.
//!
//! # Responsibilities
//! - Assemble a rustls ClientConfig from a target's trust material
//! - Support system roots, custom CA bundles, and explicit skip-verify
//! - Attach client certificate material for BMCs that require mTLS
//!
//! # Design Decisions
//! - Skip-verify is honoured only when the target's configuration set it;
//!   there is no fallback to "skip" on verification errors
//! - PEM parsing failures are terminal for the target until its
//!   configuration changes

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::targets::{TlsMaterial, TlsMode};
use crate::upstream::pool::PoolError;

/// Build the rustls client configuration for one target.
pub fn client_config(target_id: &str, tls: &TlsMaterial) -> Result<ClientConfig, PoolError> {
    let identity = match &tls.client_identity {
        Some(identity) => {
            let certs = parse_certs(target_id, &identity.cert_pem, "client certificate")?;
            let key = parse_key(target_id, &identity.key_pem)?;
            Some((certs, key))
        }
        None => None,
    };

    let builder = match &tls.mode {
        TlsMode::SystemRoots => {
            ClientConfig::builder().with_root_certificates(system_roots(target_id)?)
        }
        TlsMode::CustomCa { bundle_pem } => {
            let mut roots = RootCertStore::empty();
            let certs = parse_certs(target_id, bundle_pem, "CA bundle")?;
            let (added, _ignored) = roots.add_parsable_certificates(certs);
            if added == 0 {
                return Err(PoolError::TlsMaterial {
                    id: target_id.to_string(),
                    reason: "CA bundle contains no usable certificates".to_string(),
                });
            }
            ClientConfig::builder().with_root_certificates(roots)
        }
        TlsMode::InsecureSkipVerify => {
            tracing::warn!(
                target_id = %target_id,
                "TLS certificate verification disabled for this target"
            );
            return finish(
                target_id,
                ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoVerification)),
                identity,
            );
        }
    };

    finish(target_id, builder, identity)
}

fn finish(
    target_id: &str,
    builder: rustls::ConfigBuilder<ClientConfig, rustls::client::WantsClientCert>,
    identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
) -> Result<ClientConfig, PoolError> {
    match identity {
        Some((certs, key)) => builder.with_client_auth_cert(certs, key).map_err(|e| {
            PoolError::TlsMaterial {
                id: target_id.to_string(),
                reason: format!("client certificate rejected: {}", e),
            }
        }),
        None => Ok(builder.with_no_client_auth()),
    }
}

fn system_roots(target_id: &str) -> Result<RootCertStore, PoolError> {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        tracing::warn!(target_id = %target_id, error = %error, "Skipping unreadable system root");
    }
    let (added, _ignored) = roots.add_parsable_certificates(native.certs);
    if added == 0 {
        return Err(PoolError::TlsMaterial {
            id: target_id.to_string(),
            reason: "no usable system root certificates".to_string(),
        });
    }
    Ok(roots)
}

fn parse_certs(
    target_id: &str,
    pem: &[u8],
    what: &'static str,
) -> Result<Vec<CertificateDer<'static>>, PoolError> {
    let certs: Result<Vec<_>, _> = rustls_pemfile::certs(&mut &pem[..]).collect();
    certs.map_err(|e| PoolError::TlsMaterial {
        id: target_id.to_string(),
        reason: format!("{} is not valid PEM: {}", what, e),
    })
}

fn parse_key(target_id: &str, pem: &[u8]) -> Result<PrivateKeyDer<'static>, PoolError> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| PoolError::TlsMaterial {
            id: target_id.to_string(),
            reason: format!("client key is not valid PEM: {}", e),
        })?
        .ok_or_else(|| PoolError::TlsMaterial {
            id: target_id.to_string(),
            reason: "client key file contains no private key".to_string(),
        })
}

/// Verifier that accepts any server certificate. Installed only for targets
/// explicitly configured with `insecure_skip_verify`.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
