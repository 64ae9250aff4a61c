//! Signed PutObject requests against an in-process HTTP stub
//!
//! Run with: cargo test -p sidekick-storage --test oci_client_test

use base64::Engine;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use sha2::Sha256;
use sidekick_core::stats::{ERROR, OK};
use sidekick_core::{FalcoPayload, OutputReporter, SensitiveString};
use sidekick_storage::oci::{
    parse_private_key, ObjectStorage, ObjectStorageConfig, OciError, OciObjectStorageClient,
    OciObjectStorageOutput, OciOutputConfig, PutObjectRequest, RequestSigner, DESTINATION,
};
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const PKCS1: &str = include_str!("fixtures/oci_api_key_pkcs1.pem");
const PKCS8: &str = include_str!("fixtures/oci_api_key_pkcs8.pem");
const ENCRYPTED: &str = include_str!("fixtures/oci_api_key_encrypted.pem");
const FINGERPRINT: &str = "d0:d6:e3:a7:37:2b:de:99:63:f9:df:44:08:e2:0d:36";
const TENANCY: &str = "ocid1.tenancy.oc1..aaaaaaaa";
const USER: &str = "ocid1.user.oc1..bbbbbbbb";

// ============================================================================
// HTTP stub
// ============================================================================

#[derive(Debug)]
struct CapturedRequest {
    method: String,
    target: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> &str {
        self.headers.get(name).map(String::as_str).unwrap_or_default()
    }

    fn auth_param(&self, name: &str) -> String {
        let authorization = self.header("authorization");
        let marker = format!("{}=\"", name);
        let start = authorization.find(&marker).unwrap() + marker.len();
        let len = authorization[start..].find('"').unwrap();
        authorization[start..start + len].to_string()
    }

    /// Rebuild the signing string from what arrived on the wire and verify it
    fn verify_signature(&self) {
        let names = self.auth_param("headers");
        let lines: Vec<String> = names
            .split(' ')
            .map(|name| match name {
                "(request-target)" => format!(
                    "(request-target): {} {}",
                    self.method.to_lowercase(),
                    self.target
                ),
                other => format!("{}: {}", other, self.header(other)),
            })
            .collect();
        let signature = base64::engine::general_purpose::STANDARD
            .decode(self.auth_param("signature"))
            .unwrap();

        let key = parse_private_key(PKCS8, None).unwrap();
        VerifyingKey::<Sha256>::new(key.to_public_key())
            .verify(
                lines.join("\n").as_bytes(),
                &Signature::try_from(signature.as_slice()).unwrap(),
            )
            .unwrap();
    }
}

/// Accept one connection, capture the request, answer with `response`
async fn serve_once(response: String) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
        let mut lines = head.split("\r\n");
        let mut request_line = lines.next().unwrap().split(' ');
        let method = request_line.next().unwrap().to_string();
        let target = request_line.next().unwrap().to_string();
        let headers: HashMap<String, String> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .collect();

        let length: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut body = buf[header_end..].to_vec();
        while body.len() < length {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before body");
            body.extend_from_slice(&chunk[..n]);
        }

        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();

        CapturedRequest {
            method,
            target,
            headers,
            body,
        }
    });

    (endpoint, handle)
}

fn ok_response() -> String {
    "HTTP/1.1 200 OK\r\n\
     etag: 6a1f2e54-1c8b-4f36-9d4f-0c2f6c0a1b2c\r\n\
     opc-request-id: iad-1:stub/200\r\n\
     content-length: 0\r\n\
     connection: close\r\n\r\n"
        .to_string()
}

fn error_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\n\
         content-type: application/json\r\n\
         opc-request-id: iad-1:stub/err\r\n\
         content-length: {}\r\n\
         connection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

fn config(endpoint: &str) -> OciOutputConfig {
    OciOutputConfig {
        tenancy: TENANCY.to_string(),
        user: USER.to_string(),
        region: "us-ashburn-1".to_string(),
        fingerprint: FINGERPRINT.to_string(),
        privatekey: SensitiveString::from(PKCS1),
        objectstorage: ObjectStorageConfig {
            namespace: "axaxnpcrorw5".to_string(),
            bucket: "falco".to_string(),
            objectnameprefix: "falco".to_string(),
        },
        endpoint: Some(endpoint.to_string()),
        request_timeout_secs: Some(10),
        ..Default::default()
    }
}

fn payload() -> FalcoPayload {
    FalcoPayload {
        output: "Warning Sensitive file opened for reading by non-trusted program".to_string(),
        rule: "Read sensitive file untrusted".to_string(),
        hostname: "worker-1".to_string(),
        ..Default::default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_put_object_is_signed_and_encoded() {
    let (endpoint, server) = serve_once(ok_response()).await;
    let signer = RequestSigner::from_pem(TENANCY, USER, FINGERPRINT, PKCS1, None).unwrap();
    let client = OciObjectStorageClient::with_signer(&endpoint, signer, None).unwrap();

    let response = client
        .put_object(PutObjectRequest {
            namespace: "axaxnpcrorw5".to_string(),
            bucket: "falco".to_string(),
            object_name: "falco/2024-10-15/2024-10-15T14:30:00.123Z.json".to_string(),
            content_type: "application/json".to_string(),
            body: br#"{"rule":"x"}"#.to_vec(),
        })
        .await
        .unwrap();

    assert_eq!(
        response.etag.as_deref(),
        Some("6a1f2e54-1c8b-4f36-9d4f-0c2f6c0a1b2c")
    );
    assert_eq!(response.opc_request_id.as_deref(), Some("iad-1:stub/200"));

    let request = server.await.unwrap();
    assert_eq!(request.method, "PUT");
    assert_eq!(
        request.target,
        "/n/axaxnpcrorw5/b/falco/o/falco%2F2024-10-15%2F2024-10-15T14:30:00.123Z.json"
    );
    assert_eq!(request.body, br#"{"rule":"x"}"#);
    assert_eq!(request.header("content-type"), "application/json");
    assert_eq!(request.header("content-length"), "12");
    assert!(request.header("opc-client-request-id").starts_with("sidekick-"));
    assert!(request.header("user-agent").starts_with("sidekick/"));
    assert!(request.header("date").ends_with(" GMT"));

    assert_eq!(
        request.auth_param("keyId"),
        format!("{}/{}/{}", TENANCY, USER, FINGERPRINT)
    );
    assert_eq!(request.auth_param("algorithm"), "rsa-sha256");
    assert_eq!(request.auth_param("headers"), "date (request-target) host");
    request.verify_signature();
}

#[tokio::test]
async fn test_service_error_is_typed() {
    let body = r#"{"code":"BucketNotFound","message":"Either the bucket named 'falco' does not exist in the namespace 'axaxnpcrorw5' or you are not authorized to access it"}"#;
    let (endpoint, server) = serve_once(error_response("404 Not Found", body)).await;
    let client = OciObjectStorageClient::new(&config(&endpoint), PKCS1).unwrap();

    let err = client
        .put_object(PutObjectRequest {
            namespace: "axaxnpcrorw5".to_string(),
            bucket: "falco".to_string(),
            object_name: "x.json".to_string(),
            content_type: "application/json".to_string(),
            body: b"{}".to_vec(),
        })
        .await
        .unwrap_err();
    server.await.unwrap();

    match err {
        OciError::Service {
            status,
            code,
            message,
            opc_request_id,
        } => {
            assert_eq!(status, 404);
            assert_eq!(code, "BucketNotFound");
            assert!(message.starts_with("Either the bucket named 'falco'"));
            assert_eq!(opc_request_id, "iad-1:stub/err");
        }
        other => panic!("expected service error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_service_error_without_json_body() {
    let (endpoint, server) = serve_once(error_response("502 Bad Gateway", "upstream down")).await;
    let client = OciObjectStorageClient::new(&config(&endpoint), PKCS1).unwrap();

    let err = client
        .put_object(PutObjectRequest {
            namespace: "ns".to_string(),
            bucket: "b".to_string(),
            object_name: "x.json".to_string(),
            content_type: "application/json".to_string(),
            body: b"{}".to_vec(),
        })
        .await
        .unwrap_err();
    server.await.unwrap();

    assert_eq!(err.status(), Some(502));
    let text = err.to_string();
    assert!(text.contains("Bad Gateway"));
    assert!(text.contains("upstream down"));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let output = OciObjectStorageOutput::new(config(&endpoint), OutputReporter::local(DESTINATION));
    let err = output.try_upload(&payload()).await.unwrap_err();
    assert!(matches!(err, OciError::Transport(_)));
}

#[tokio::test]
async fn test_output_uploads_through_real_client() {
    let (endpoint, server) = serve_once(ok_response()).await;
    let output = OciObjectStorageOutput::new(config(&endpoint), OutputReporter::local(DESTINATION));

    output.upload(&payload()).await;

    let request = server.await.unwrap();
    assert!(request.target.starts_with("/n/axaxnpcrorw5/b/falco/o/falco%2F"));
    assert!(request.target.ends_with("Z.json"));
    let decoded: FalcoPayload = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(decoded, payload());
    request.verify_signature();

    assert_eq!(output.reporter().stats().get(DESTINATION, OK), 1);
    assert_eq!(output.reporter().stats().get(DESTINATION, ERROR), 0);
}

#[tokio::test]
async fn test_padded_configuration_authenticates_identically() {
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("oci_api_key.pem");
    std::fs::write(&key_path, ENCRYPTED).unwrap();

    let (endpoint, server) = serve_once(ok_response()).await;
    let mut padded = config(&format!("  {}/  ", endpoint));
    padded.tenancy = format!("  {}\n", TENANCY);
    padded.user = format!("\t{} ", USER);
    padded.fingerprint = format!(" {} ", FINGERPRINT);
    padded.privatekey = format!("  {}\n", key_path.display()).into();
    padded.passphrase = SensitiveString::from(" sidekick-test\n");
    padded.objectstorage.namespace = " axaxnpcrorw5 ".to_string();
    padded.objectstorage.bucket = "falco ".to_string();

    let output = OciObjectStorageOutput::new(padded, OutputReporter::local(DESTINATION));
    let receipt = output.try_upload(&payload()).await.unwrap();
    assert_eq!(receipt.etag.as_deref(), Some("6a1f2e54-1c8b-4f36-9d4f-0c2f6c0a1b2c"));

    let request = server.await.unwrap();
    assert!(request.target.starts_with("/n/axaxnpcrorw5/b/falco/o/"));
    assert_eq!(
        request.auth_param("keyId"),
        format!("{}/{}/{}", TENANCY, USER, FINGERPRINT)
    );
    request.verify_signature();
}

#[tokio::test]
async fn test_client_is_built_once() {
    let (endpoint, server) = serve_once(ok_response()).await;
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("oci_api_key.pem");
    std::fs::write(&key_path, PKCS8).unwrap();

    let mut config = config(&endpoint);
    config.privatekey = key_path.to_string_lossy().into_owned().into();
    let output = OciObjectStorageOutput::new(config, OutputReporter::local(DESTINATION));

    output.try_upload(&payload()).await.unwrap();
    server.await.unwrap();

    // The cached client no longer needs the key file; the stub is gone,
    // so the second upload fails in transport rather than on the key read.
    std::fs::remove_file(&key_path).unwrap();
    let err = output.try_upload(&payload()).await.unwrap_err();
    assert!(matches!(err, OciError::Transport(_)));
}
