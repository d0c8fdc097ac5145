use std::io;
use std::net::TcpStream;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{self, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore};
use rustls::{SignatureScheme, StreamOwned};

use crate::Error;

pub(crate) type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Client configs, built on first use.
#[derive(Default)]
pub(crate) struct Configs {
    verified: Option<Arc<ClientConfig>>,
    insecure: Option<Arc<ClientConfig>>,
}

impl Configs {
    fn get(&mut self, insecure: bool) -> Result<Arc<ClientConfig>, Error> {
        let slot = if insecure {
            &mut self.insecure
        } else {
            &mut self.verified
        };

        if let Some(config) = slot {
            return Ok(config.clone());
        }

        let config = build_config(insecure)?;
        *slot = Some(config.clone());
        Ok(config)
    }

    /// Wrap `tcp` in TLS for `host` and run the handshake.
    pub fn connect(
        &mut self,
        mut tcp: TcpStream,
        host: &str,
        insecure: bool,
    ) -> Result<TlsStream, Error> {
        let config = self.get(insecure)?;

        let name = ServerName::try_from(host.to_string())
            .map_err(|e| Error::Tls(format!("invalid server name {}: {}", host, e)))?;

        let mut conn =
            ClientConnection::new(config, name).map_err(|e| Error::Tls(e.to_string()))?;

        while conn.is_handshaking() {
            conn.complete_io(&mut tcp).map_err(handshake_error)?;
        }

        debug!(
            "TLS handshake with {} done: {:?}",
            host,
            conn.negotiated_cipher_suite().map(|s| s.suite())
        );

        Ok(StreamOwned::new(conn, tcp))
    }
}

fn build_config(insecure: bool) -> Result<Arc<ClientConfig>, Error> {
    let provider = Arc::new(crypto::ring::default_provider());

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?;

    let config = if insecure {
        warn!("Certificate verification is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(Arc::new(config))
}

// rustls reports its own failures as InvalidData, everything else is the socket.
fn handshake_error(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::InvalidData {
        Error::Tls(e.to_string())
    } else {
        Error::from_socket(e)
    }
}

/// Accepts any certificate for any name. Signatures are still checked.
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
