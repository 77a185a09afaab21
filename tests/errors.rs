//! Error kinds as seen by the client.

mod common;

use common::{gradient_jpeg, start, test_config, write_fixture};
use lipo::config::ByteSize;
use lipo::protocol::{Background, CreateSpec};
use lipo::{ClientConfig, Lipo, LipoError};
use std::time::Duration;
use tempfile::TempDir;

/// Only the fixture itself remains in `dir`.
fn no_leftovers(dir: &std::path::Path) -> bool {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .all(|e| e.file_name() == "in.jpg")
}

#[tokio::test]
async fn oversized_upload_is_rejected_and_leaves_no_file() {
    let mut config = test_config();
    config.limits.file_size = ByteSize(512);
    let (server, lipo) = start(config).await;
    let tmp = TempDir::new().unwrap();
    let input = write_fixture(tmp.path(), "in.jpg", &gradient_jpeg(100, 100));
    let out = tmp.path().join("out.jpg");

    let err = lipo.input(input).resize(10, 10).to_file(&out).await.unwrap_err();
    assert!(matches!(err, LipoError::PayloadTooLarge(_)), "{err:?}");
    assert!(!err.is_retryable());
    assert!(!out.exists());
    assert!(no_leftovers(tmp.path()));
    server.shutdown().await;
}

#[tokio::test]
async fn too_many_fields_is_payload_too_large() {
    let mut config = test_config();
    config.limits.fields = 1;
    let (server, _lipo) = start(config).await;

    // The client only ever sends one text part, so build the form by hand.
    let form = reqwest::multipart::Form::new()
        .text("options", "{}")
        .text("extra", "x");
    let response = reqwest::Client::new()
        .post(format!("{}/", server.base_uri()))
        .multipart(form)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    let body = response.bytes().await.unwrap();
    assert_eq!(status, 413);
    assert!(matches!(
        LipoError::from_response(status, &body),
        LipoError::PayloadTooLarge(_)
    ));
    server.shutdown().await;
}

#[tokio::test]
async fn zero_resize_is_validation() {
    let (server, lipo) = start(test_config()).await;
    let err = lipo
        .input(gradient_jpeg(10, 10))
        .resize(0, 10)
        .to_buffer()
        .await
        .unwrap_err();
    assert!(matches!(err, LipoError::Validation(_)), "{err:?}");
    server.shutdown().await;
}

#[tokio::test]
async fn metadata_still_validates_operations() {
    let (server, lipo) = start(test_config()).await;
    let err = lipo
        .input(gradient_jpeg(10, 10))
        .resize(0, 0)
        .metadata()
        .await
        .unwrap_err();
    assert!(matches!(err, LipoError::Validation(_)), "{err:?}");
    server.shutdown().await;
}

#[tokio::test]
async fn out_of_bounds_extract_is_validation() {
    let (server, lipo) = start(test_config()).await;
    let err = lipo
        .input(gradient_jpeg(10, 10))
        .extract(5, 5, 10, 10)
        .to_buffer()
        .await
        .unwrap_err();
    assert!(matches!(err, LipoError::Validation(_)), "{err:?}");
    server.shutdown().await;
}

#[tokio::test]
async fn unknown_output_format_is_unsupported() {
    let (server, lipo) = start(test_config()).await;
    let err = lipo
        .input(gradient_jpeg(10, 10))
        .to_format("bmp")
        .to_buffer()
        .await
        .unwrap_err();
    assert!(matches!(err, LipoError::UnsupportedFormat(_)), "{err:?}");
    server.shutdown().await;
}

#[tokio::test]
async fn unrecognised_input_is_unsupported() {
    let (server, lipo) = start(test_config()).await;
    let err = lipo
        .input(b"plain text, not pixels".to_vec())
        .to_buffer()
        .await
        .unwrap_err();
    assert!(matches!(err, LipoError::UnsupportedFormat(_)), "{err:?}");
    server.shutdown().await;
}

#[tokio::test]
async fn corrupt_image_is_remote_processing() {
    let (server, lipo) = start(test_config()).await;
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[0u8; 64]);

    let err = lipo.input(bytes).resize(5, 5).to_buffer().await.unwrap_err();
    assert!(matches!(err, LipoError::RemoteProcessing(_)), "{err:?}");
    assert!(err.is_retryable());
    server.shutdown().await;
}

#[tokio::test]
async fn bad_create_spec_is_validation() {
    let (server, lipo) = start(test_config()).await;
    let spec = CreateSpec::new(10, 10, 2, Background::default());
    let err = lipo.input(spec).to_buffer().await.unwrap_err();
    assert!(matches!(err, LipoError::Validation(_)), "{err:?}");
    server.shutdown().await;
}

#[tokio::test]
async fn oversized_canvas_and_resize_target_are_validation() {
    let (server, lipo) = start(test_config()).await;
    let spec = CreateSpec::new(16_384, 16_384, 4, Background::default());
    let err = lipo.input(spec).to_buffer().await.unwrap_err();
    assert!(matches!(err, LipoError::Validation(_)), "{err:?}");

    let err = lipo
        .input(gradient_jpeg(8, 8))
        .resize(16_384, 16_384)
        .to_buffer()
        .await
        .unwrap_err();
    assert!(matches!(err, LipoError::Validation(_)), "{err:?}");
    assert!(!err.is_retryable());
    server.shutdown().await;
}

#[tokio::test]
async fn missing_source_file_is_io() {
    let (server, lipo) = start(test_config()).await;
    let tmp = TempDir::new().unwrap();
    let err = lipo
        .input(tmp.path().join("absent.jpg"))
        .metadata()
        .await
        .unwrap_err();
    assert!(matches!(err, LipoError::Io(_)), "{err:?}");
    server.shutdown().await;
}

#[tokio::test]
async fn closed_port_is_retryable_network_error() {
    // Bind then drop to get a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let lipo = Lipo::new(ClientConfig::new(format!("http://127.0.0.1:{port}"))).unwrap();
    let err = lipo.input(gradient_jpeg(4, 4)).to_buffer().await.unwrap_err();
    assert!(matches!(err, LipoError::Network(_)), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn silent_server_times_out_without_writing() {
    // Accepts connections but never answers.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let lipo = Lipo::new(
        ClientConfig::new(format!("http://{addr}")).timeout(Duration::from_millis(300)),
    )
    .unwrap();
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out.png");

    let err = lipo.input(gradient_jpeg(4, 4)).to_file(&out).await.unwrap_err();
    assert!(matches!(err, LipoError::Network(_)), "{err:?}");
    assert!(!out.exists());
    drop(listener);
}

#[tokio::test]
async fn unwritable_destination_is_io() {
    let (server, lipo) = start(test_config()).await;
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("missing-dir").join("out.png");

    let err = lipo.input(gradient_jpeg(8, 8)).to_file(&out).await.unwrap_err();
    assert!(matches!(err, LipoError::Io(_)), "{err:?}");
    assert!(!out.exists());
    server.shutdown().await;
}

#[tokio::test]
async fn invalid_base_uri_is_config_error() {
    let result = Lipo::new(ClientConfig::new("::not a uri::"));
    assert!(matches!(result, Err(LipoError::InvalidConfig(_))));
}

#[tokio::test]
async fn health_endpoint_answers() {
    let (server, _lipo) = start(test_config()).await;
    let body: lipo::protocol::HealthResponse =
        reqwest::get(format!("{}/health", server.base_uri()))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert_eq!(body.status, "ok");
    server.shutdown().await;
}
