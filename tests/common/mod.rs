//! Shared setup for the integration suites: synthetic fixtures and servers
//! on ephemeral ports.

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lipo::config::ServerConfig;
use lipo::server::{self, RunningServer};
use lipo::{ClientConfig, Lipo};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

pub fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 64])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig {
        bind: "127.0.0.1:0".to_string(),
        ..ServerConfig::default()
    };
    config.processing.max_processes = Some(2);
    config
}

pub fn client_for(server: &RunningServer) -> Lipo {
    Lipo::new(ClientConfig::new(server.base_uri())).unwrap()
}

/// Start a server on the calling test's runtime.
pub async fn start(config: ServerConfig) -> (RunningServer, Lipo) {
    let server = server::spawn(config).await.unwrap();
    let client = client_for(&server);
    (server, client)
}

/// A server with its own runtime, for tests that drive the blocking and
/// callback conventions from a plain thread.
pub struct BlockingServer {
    pub client: Lipo,
    server: Option<RunningServer>,
    runtime: Runtime,
}

impl BlockingServer {
    pub fn start(config: ServerConfig) -> Self {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(server::spawn(config)).unwrap();
        Self {
            client: client_for(&server),
            server: Some(server),
            runtime,
        }
    }
}

impl Drop for BlockingServer {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            self.runtime.block_on(server.shutdown());
        }
    }
}
