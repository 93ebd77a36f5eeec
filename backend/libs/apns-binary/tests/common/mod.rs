//! Shared fixtures: a throwaway PKI and protocol-compatible mock gateways

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use apns_binary::codec::{decode_frame, encode_feedback_record, frame_length, DecodedFrame};
use apns_binary::FeedbackRecord;
use bytes::BytesMut;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

pub const TOKEN_A: &str = "1111111111111111111111111111111111111111111111111111111111111111";
pub const TOKEN_B: &str = "0fdc8d3d1c2a8c8c3fa5e0c6d9b1c5f2e1e0f2d3c4b5a69788796a5b4c3d2e1f";
pub const TOKEN_C: &str = "3333333333333333333333333333333333333333333333333333333333333333";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// CA, gateway certificate and provider identity written to a temp dir
pub struct TestPki {
    pub dir: TempDir,
    pub ca_path: PathBuf,
    /// Provider certificate and private key in one PEM file
    pub identity_path: PathBuf,
    pub acceptor: TlsAcceptor,
}

pub fn setup_pki() -> TestPki {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "APNs test CA");
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let server_key = KeyPair::generate().unwrap();
    let server_cert = CertificateParams::new(vec!["localhost".to_string()])
        .unwrap()
        .signed_by(&server_key, &ca_cert, &ca_key)
        .unwrap();

    let client_key = KeyPair::generate().unwrap();
    let mut client_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    client_params
        .distinguished_name
        .push(DnType::CommonName, "Apple Push Services: com.example.app");
    let client_cert = client_params
        .signed_by(&client_key, &ca_cert, &ca_key)
        .unwrap();

    let dir = TempDir::new().unwrap();
    let ca_path = dir.path().join("ca.pem");
    let identity_path = dir.path().join("apns-identity.pem");
    fs::write(&ca_path, ca_cert.pem()).unwrap();
    fs::write(
        &identity_path,
        format!("{}{}", client_cert.pem(), client_key.serialize_pem()),
    )
    .unwrap();

    let mut roots = RootCertStore::empty();
    roots.add(ca_cert.der().clone()).unwrap();

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .unwrap();
    let server_config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_client_cert_verifier(verifier)
        .with_single_cert(
            vec![server_cert.der().clone()],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(server_key.serialize_der())),
        )
        .unwrap();

    TestPki {
        dir,
        ca_path,
        identity_path,
        acceptor: TlsAcceptor::from(Arc::new(server_config)),
    }
}

/// Read notification frames until `expected` have arrived, optionally answer
/// with an error response, then wait for the client to hang up.
pub async fn serve_push<S>(mut stream: S, expected: usize, reply: Option<[u8; 6]>) -> Vec<DecodedFrame>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    let mut frames = Vec::new();

    while frames.len() < expected {
        if stream.read_buf(&mut buf).await.unwrap_or(0) == 0 {
            break;
        }
        while let Some(len) = frame_length(&buf).filter(|len| buf.len() >= *len) {
            let frame = buf.split_to(len);
            frames.push(decode_frame(&frame).unwrap());
        }
    }

    if let Some(reply) = reply {
        stream.write_all(&reply).await.unwrap();
        stream.flush().await.unwrap();
    }

    // the client closes once its error check is done
    let mut rest = Vec::new();
    let _ = stream.read_to_end(&mut rest).await;
    frames
}

pub async fn serve_feedback<S>(mut stream: S, records: Vec<FeedbackRecord>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut wire = BytesMut::new();
    for record in &records {
        encode_feedback_record(record, &mut wire);
    }
    stream.write_all(&wire).await.unwrap();
    stream.shutdown().await.unwrap();
}

/// TLS push gateway on a loopback port, serving one connection.
pub async fn spawn_push_gateway(
    acceptor: TlsAcceptor,
    expected: usize,
    reply: Option<[u8; 6]>,
) -> (u16, JoinHandle<Vec<DecodedFrame>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let stream = acceptor.accept(tcp).await.unwrap();
        serve_push(stream, expected, reply).await
    });
    (port, handle)
}

/// TLS feedback gateway on a loopback port, serving one connection.
pub async fn spawn_feedback_gateway(
    acceptor: TlsAcceptor,
    records: Vec<FeedbackRecord>,
) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let stream = acceptor.accept(tcp).await.unwrap();
        serve_feedback(stream, records).await
    });
    (port, handle)
}

pub fn record(timestamp: u32, token: &str) -> FeedbackRecord {
    FeedbackRecord {
        timestamp,
        token: hex::decode(token).unwrap(),
    }
}
