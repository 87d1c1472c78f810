//! Request Forwarding Integration Tests
//!
//! Runs verified requests through the proxy core against a wiremock backend
//! and checks what the backend received:
//! - Direct and streaming requests arrive header-signed for the backend host
//! - Presigned requests arrive re-signed in the query
//! - HEAD on listed extensions arrives as HEAD against a GET presigned URL
//! - Transport failures surface as forwarding failures

mod common;

use common::*;
use http_body_util::BodyExt;
use hyper::Method;
use sigv4_relay::auth::SignatureVerifier;
use sigv4_relay::forward::HeadPolicy;
use sigv4_relay::proxy::ErrorKind;
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_direct_get_is_resigned_for_backend() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bucket/readme.txt"))
        .and(ValidSignature)
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"etag-1\"")
                .set_body_string("file contents"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let proxy = proxy_for(&test_config(&mock_server.uri()));
    let request = header_signed(
        &secret(),
        Method::GET,
        &format!("{}/bucket/readme.txt", PROXY_BASE),
        &[],
        b"",
    );

    let response = proxy.handle(request).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.headers.get("etag").unwrap(), "\"etag-1\"");

    let body = response.body.collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"file contents");
}

#[tokio::test]
async fn test_direct_put_forwards_body_and_signed_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/bucket/data.json"))
        .and(header("content-type", "application/json"))
        .and(body_bytes(b"{\"k\":1}".to_vec()))
        .and(ValidSignature)
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let proxy = proxy_for(&test_config(&mock_server.uri()));
    let request = header_signed(
        &secret(),
        Method::PUT,
        &format!("{}/bucket/data.json", PROXY_BASE),
        &[("content-type", "application/json")],
        b"{\"k\":1}",
    );

    let response = proxy.handle(request).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
}

#[tokio::test]
async fn test_streaming_put_is_decoded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/bucket/upload.bin"))
        .and(header("x-amz-content-sha256", "UNSIGNED-PAYLOAD"))
        .and(header("content-length", "11"))
        .and(body_bytes(b"HELLO WORLD".to_vec()))
        .and(ValidSignature)
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let proxy = proxy_for(&test_config(&mock_server.uri()));
    let raw = aws_chunked(&[b"HELLO", b" WORLD"]);
    let request = header_signed(
        &secret(),
        Method::PUT,
        &format!("{}/bucket/upload.bin", PROXY_BASE),
        &[
            ("x-amz-content-sha256", "STREAMING-AWS4-HMAC-SHA256-PAYLOAD"),
            ("x-amz-decoded-content-length", "11"),
            ("content-encoding", "aws-chunked"),
        ],
        &raw,
    );

    let response = proxy.handle(request).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);

    let received = &mock_server.received_requests().await.unwrap()[0];
    assert!(received.headers.get("x-amz-decoded-content-length").is_none());
    assert!(received.headers.get("content-encoding").is_none());
}

#[tokio::test]
async fn test_streaming_put_strict_framing_rejects_bad_size() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = test_config(&mock_server.uri());
    config.proxy.strict_chunk_framing = true;
    let proxy = proxy_for(&config);

    let request = header_signed(
        &secret(),
        Method::PUT,
        &format!("{}/bucket/upload.bin", PROXY_BASE),
        &[("x-amz-content-sha256", "STREAMING-AWS4-HMAC-SHA256-PAYLOAD")],
        b"zz;chunk-signature=00\r\nHELLO\r\n0\r\n\r\n",
    );

    let err = proxy.handle(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChunkFraming);
}

#[tokio::test]
async fn test_presigned_get_is_resigned_in_query() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bucket/report.pdf"))
        .and(query_param("X-Amz-Algorithm", "AWS4-HMAC-SHA256"))
        .and(ValidSignature)
        .respond_with(ResponseTemplate::new(200).set_body_string("%PDF"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let proxy = proxy_for(&test_config(&mock_server.uri()));
    let request = presigned(
        &secret(),
        Method::GET,
        &format!("{}/bucket/report.pdf", PROXY_BASE),
        b"",
    );

    let response = proxy.handle(request).await.unwrap();
    let body = response.body.collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"%PDF");
}

#[tokio::test]
async fn test_presigned_get_forwards_range_and_conditionals() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bucket/video.mp4"))
        .and(header("range", "bytes=0-99"))
        .and(header("if-none-match", "\"v1\""))
        .and(ValidSignature)
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 0-99/5000")
                .set_body_bytes(vec![0u8; 100]),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let proxy = proxy_for(&test_config(&mock_server.uri()));
    let mut request = presigned(
        &secret(),
        Method::GET,
        &format!("{}/bucket/video.mp4", PROXY_BASE),
        b"",
    );
    request
        .headers
        .insert("range", hyper::header::HeaderValue::from_static("bytes=0-99"));
    request
        .headers
        .insert("if-none-match", hyper::header::HeaderValue::from_static("\"v1\""));

    let response = proxy.handle(request).await.unwrap();
    assert_eq!(response.status.as_u16(), 206);
    assert_eq!(response.headers.get("content-range").unwrap(), "bytes 0-99/5000");

    let received = &mock_server.received_requests().await.unwrap()[0];
    assert!(received.headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_presigned_put_keeps_method_and_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/bucket/new.txt"))
        .and(body_bytes(b"uploaded".to_vec()))
        .and(ValidSignature)
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let proxy = proxy_for(&test_config(&mock_server.uri()));
    let request = presigned(
        &secret(),
        Method::PUT,
        &format!("{}/bucket/new.txt", PROXY_BASE),
        b"uploaded",
    );

    let response = proxy.handle(request).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
}

#[tokio::test]
async fn test_head_on_listed_extension_uses_get_signature() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/bucket/photo.png"))
        .and(|request: &wiremock::Request| {
            // Signed for GET although sent as HEAD
            let mut as_get = received(request);
            as_get.method = Method::GET;
            SignatureVerifier::new("s3").verify(as_get, &secret()).is_ok()
        })
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .insert_header("x-amz-meta-origin", "camera"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let proxy = proxy_for(&test_config(&mock_server.uri()));
    let request = header_signed(
        &secret(),
        Method::HEAD,
        &format!("{}/bucket/photo.png", PROXY_BASE),
        &[],
        b"",
    );

    let response = proxy.handle(request).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.headers.get("content-type").unwrap(), "image/png");
    assert_eq!(response.headers.get("x-amz-meta-origin").unwrap(), "camera");

    let body = response.body.collect().await.unwrap().to_bytes();
    assert!(body.is_empty());

    let received = &mock_server.received_requests().await.unwrap()[0];
    assert!(received.url.query().unwrap().contains("X-Amz-Signature="));
}

#[tokio::test]
async fn test_head_on_other_extension_is_direct() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/bucket/notes.txt"))
        .and(ValidSignature)
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let forwarder = sigv4_relay::forward::RequestForwarder::from_config(&test_config(
        &mock_server.uri(),
    ))
    .unwrap()
    .with_head_policy(HeadPolicy::new(["png"]));
    let proxy = sigv4_relay::SigV4Proxy::new(std::sync::Arc::new(secret()), forwarder);

    let request = header_signed(
        &secret(),
        Method::HEAD,
        &format!("{}/bucket/notes.txt", PROXY_BASE),
        &[],
        b"",
    );

    let response = proxy.handle(request).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);

    let received = &mock_server.received_requests().await.unwrap()[0];
    assert!(received.headers.get("authorization").is_some());
}

#[tokio::test]
async fn test_backend_errors_pass_through() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("content-type", "application/xml")
                .set_body_string("<Error><Code>NoSuchKey</Code></Error>"),
        )
        .mount(&mock_server)
        .await;

    let proxy = proxy_for(&test_config(&mock_server.uri()));
    let request = header_signed(
        &secret(),
        Method::GET,
        &format!("{}/bucket/missing.txt", PROXY_BASE),
        &[],
        b"",
    );

    let response = proxy.handle(request).await.unwrap();
    assert_eq!(response.status.as_u16(), 404);
    let body = response.body.collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&body).contains("NoSuchKey"));
}

#[tokio::test]
async fn test_unreachable_backend_is_forwarding_failure() {
    // Bind and drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let proxy = proxy_for(&test_config(&format!("http://127.0.0.1:{}", port)));
    let request = header_signed(
        &secret(),
        Method::GET,
        &format!("{}/bucket/a.txt", PROXY_BASE),
        &[],
        b"",
    );

    let err = proxy.handle(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ForwardingFailure);
}

#[tokio::test]
async fn test_rejected_request_never_reaches_backend() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let proxy = proxy_for(&test_config(&mock_server.uri()));
    let attacker = sigv4_relay::signing::SigningSecret::new(ACCESS_KEY, "wrong");
    let request = header_signed(
        &attacker,
        Method::GET,
        &format!("{}/bucket/a.txt", PROXY_BASE),
        &[],
        b"",
    );

    let err = proxy.handle(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
}
