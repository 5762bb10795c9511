use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore};

use crate::error::TransportError;

/// Client TLS configuration handed to the transport once at construction.
///
/// Only TLS 1.3 and TLS 1.2 are offered; rustls has no SSLv2/SSLv3/TLS 1.0
/// support to begin with, so nothing weaker can be negotiated.
pub fn hardened_client_config() -> Result<Arc<ClientConfig>, TransportError> {
    let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
    .map_err(|e| TransportError::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(Arc::new(config))
}
