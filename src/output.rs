//! CLI output formatting.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.
//!
//! ```text
//! photo.jpg
//!     Format: jpeg
//!     Size: 100x100, 3 channels
//!     Bytes: 1.4 KB
//!
//! photo.jpg → thumb.webp
//!     Format: webp
//!     Size: 300x300, 3 channels
//!     Bytes: 8.2 KB
//! ```

use crate::config::ServerConfig;
use crate::protocol::{ImageMetadata, OutputInfo};
use std::net::SocketAddr;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

fn channels_label(channels: u8, alpha: bool) -> String {
    if alpha {
        format!("{channels} channels, alpha")
    } else {
        format!("{channels} channels")
    }
}

/// Source metadata as reported by `lipo metadata`.
pub fn format_metadata(label: &str, metadata: &ImageMetadata) -> Vec<String> {
    let mut lines = vec![
        label.to_string(),
        format!("{}Format: {}", indent(1), metadata.format),
        format!(
            "{}Size: {}x{}, {}",
            indent(1),
            metadata.width,
            metadata.height,
            channels_label(metadata.channels, metadata.has_alpha)
        ),
    ];
    if let Some(size) = metadata.size {
        lines.push(format!("{}Bytes: {}", indent(1), format_bytes(size)));
    }
    lines
}

/// Result of `lipo convert`.
pub fn format_output_info(input: &str, output: &str, info: &OutputInfo) -> Vec<String> {
    let mut lines = vec![
        format!("{input} → {output}"),
        format!("{}Format: {}", indent(1), info.format),
        format!(
            "{}Size: {}x{}, {}",
            indent(1),
            info.width,
            info.height,
            channels_label(info.channels, info.channels == 4)
        ),
        format!("{}Bytes: {}", indent(1), format_bytes(info.size)),
    ];
    if info.premultiplied {
        lines.push(format!("{}Premultiplied alpha", indent(1)));
    }
    lines
}

/// Startup banner for `lipo serve`.
pub fn format_listening(addr: SocketAddr, config: &ServerConfig) -> Vec<String> {
    let cache = if config.cache.is_enabled() {
        format!("{} entries, {}", config.cache.entries, config.cache.size)
    } else {
        "disabled".to_string()
    };
    vec![
        format!("Listening on http://{addr}"),
        format!(
            "{}Limits: file {}, field {}, {} field(s), {} file(s)",
            indent(1),
            config.limits.file_size,
            config.limits.field_size,
            config.limits.fields,
            config.limits.files
        ),
        format!(
            "{}Engine: {} thread(s), max dimension {}, max {} pixels",
            indent(1),
            crate::config::effective_threads(&config.processing),
            config.processing.max_dimension,
            config.processing.max_pixels
        ),
        format!("{}Cache: {cache}", indent(1)),
    ]
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

pub fn print_metadata(label: &str, metadata: &ImageMetadata) {
    print_lines(format_metadata(label, metadata));
}

pub fn print_output_info(input: &str, output: &str, info: &OutputInfo) {
    print_lines(format_output_info(input, output, info));
}

pub fn print_listening(addr: SocketAddr, config: &ServerConfig) {
    print_lines(format_listening(addr, config));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_pick_a_unit() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn metadata_lines() {
        let metadata = ImageMetadata {
            format: "jpeg".to_string(),
            size: Some(2048),
            width: 100,
            height: 50,
            channels: 3,
            has_alpha: false,
        };
        assert_eq!(
            format_metadata("in.jpg", &metadata),
            vec![
                "in.jpg",
                "    Format: jpeg",
                "    Size: 100x50, 3 channels",
                "    Bytes: 2.0 KB",
            ]
        );
    }

    #[test]
    fn metadata_of_canvas_has_no_byte_line() {
        let metadata = ImageMetadata {
            format: "raw".to_string(),
            size: None,
            width: 8,
            height: 8,
            channels: 4,
            has_alpha: true,
        };
        let lines = format_metadata("canvas", &metadata);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "    Size: 8x8, 4 channels, alpha");
    }

    #[test]
    fn output_info_lines() {
        let info = OutputInfo {
            format: "png".to_string(),
            size: 100,
            width: 20,
            height: 10,
            channels: 4,
            premultiplied: false,
        };
        let lines = format_output_info("a.jpg", "b.png", &info);
        assert_eq!(lines[0], "a.jpg → b.png");
        assert_eq!(lines[2], "    Size: 20x10, 4 channels, alpha");
        assert_eq!(lines[3], "    Bytes: 100 B");
    }

    #[test]
    fn listening_banner_reports_disabled_cache() {
        let mut config = ServerConfig::default();
        config.cache.entries = 0;
        let addr: SocketAddr = "127.0.0.1:3000".parse().unwrap();
        let lines = format_listening(addr, &config);
        assert_eq!(lines[0], "Listening on http://127.0.0.1:3000");
        assert_eq!(lines.last().unwrap(), "    Cache: disabled");
    }

    #[test]
    fn listening_banner_reports_cache_bounds() {
        let config = ServerConfig::default();
        let addr: SocketAddr = "127.0.0.1:3000".parse().unwrap();
        let lines = format_listening(addr, &config);
        assert_eq!(lines.last().unwrap(), "    Cache: 32 entries, 64mb");
    }
}
