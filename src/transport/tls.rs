//! Client-side TLS setup shared by the hyper connector and WebSocket
//! upgrades.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::ring;
use rustls::{ClientConfig, RootCertStore};

use crate::config::schema::TlsConfig;
use crate::config::ConfigError;

/// Build the rustls client config: bundled web roots plus `ca_file`, if set.
/// ALPN is left empty; the hyper connector adds its own.
pub fn client_config(tls: &TlsConfig) -> Result<Arc<ClientConfig>, ConfigError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    if let Some(path) = &tls.ca_file {
        let added = add_pem_roots(&mut roots, path)?;
        tracing::debug!(path = %path.display(), certificates = added, "Loaded CA bundle");
    }

    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| ConfigError::invalid("tls", e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

fn add_pem_roots(roots: &mut RootCertStore, path: &Path) -> Result<usize, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::invalid(
            "tls.ca_file",
            format!("CA file not found: {}", path.display()),
        ));
    }
    let mut reader = BufReader::new(File::open(path)?);
    let mut added = 0;
    for cert in rustls_pemfile::certs(&mut reader) {
        roots
            .add(cert?)
            .map_err(|e| ConfigError::invalid("tls.ca_file", e.to_string()))?;
        added += 1;
    }
    if added == 0 {
        return Err(ConfigError::invalid(
            "tls.ca_file",
            format!("no certificates in {}", path.display()),
        ));
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_trusts_web_roots_only() {
        let config = client_config(&TlsConfig::default()).unwrap();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn missing_ca_file_is_rejected() {
        let tls = TlsConfig {
            ca_file: Some("/nonexistent/cluster-ca.crt".into()),
        };
        let err = client_config(&tls).unwrap_err();
        assert!(err.to_string().contains("tls.ca_file"), "{}", err);
    }

    #[test]
    fn ca_file_without_certificates_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();
        let tls = TlsConfig {
            ca_file: Some(file.path().to_path_buf()),
        };
        let err = client_config(&tls).unwrap_err();
        assert!(err.to_string().contains("no certificates"), "{}", err);
    }
}
