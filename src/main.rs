use clap::{Parser, Subcommand, ValueEnum};
use lipo::client::{ClientConfig, Lipo, Pipeline};
use lipo::config::{self, ServerConfig};
use lipo::output;
use lipo::protocol::{Fit, FormatOptions, OutputFormat, ResizeOptions};
use lipo::server::{self, RunningServer};
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "lipo")]
#[command(about = "Chainable image processing over HTTP")]
#[command(long_about = "\
Chainable image processing over HTTP

A pipeline (resize, extract, format) is built locally and sent to a lipo
server as one multipart request. The server decodes, transforms and encodes
the image and returns the result.

  lipo serve --bind 0.0.0.0:3000
  lipo convert photo.jpg thumb.webp --resize 300x300 --server http://host:3000
  lipo metadata photo.jpg

Without --server, metadata and convert start a private server on a free
local port for the duration of the command.

Run 'lipo gen-config' to generate a documented lipo.toml.")]
#[command(version)]
struct Cli {
    /// Server config file
    #[arg(long, default_value = config::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

/// Where client commands send their request.
#[derive(clap::Args, Clone)]
struct RemoteArgs {
    /// Base URI of a running lipo server
    #[arg(long)]
    server: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Run the processing endpoint
    Serve {
        /// Listen address, overrides `bind` from the config file
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print format, dimensions and channels of an image
    Metadata {
        input: PathBuf,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Resize and re-encode an image
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Target box as WIDTHxHEIGHT; either side may be empty (300x, x200)
        #[arg(long, value_parser = parse_size)]
        resize: Option<(Option<u32>, Option<u32>)>,
        /// How the image fits the target box
        #[arg(long, default_value = "cover")]
        fit: Fit,
        /// Output format; defaults to the output file's extension
        #[arg(long)]
        format: Option<String>,
        /// Lossy quality, 1-100
        #[arg(long)]
        quality: Option<u8>,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Print a stock lipo.toml with all options documented
    GenConfig,
}

fn parse_size(s: &str) -> Result<(Option<u32>, Option<u32>), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let side = |v: &str| -> Result<Option<u32>, String> {
        if v.is_empty() {
            Ok(None)
        } else {
            v.parse().map(Some).map_err(|e| format!("'{v}': {e}"))
        }
    };
    let size = (side(w)?, side(h)?);
    if size == (None, None) {
        return Err("at least one of width or height is required".to_string());
    }
    Ok(size)
}

fn setup_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}

/// A private server kept alive for one client command.
struct LocalServer {
    server: Option<RunningServer>,
    runtime: Runtime,
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            self.runtime.block_on(server.shutdown());
        }
    }
}

/// Client plus, when no `--server` was given, the server it talks to.
/// Field order matters: the client is dropped before its server.
struct Endpoint {
    client: Lipo,
    _local: Option<LocalServer>,
}

fn connect(
    remote: &RemoteArgs,
    config_path: &std::path::Path,
) -> Result<Endpoint, Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(remote.timeout);
    match &remote.server {
        Some(base_uri) => Ok(Endpoint {
            client: Lipo::new(ClientConfig::new(base_uri.clone()).timeout(timeout))?,
            _local: None,
        }),
        None => {
            let config = ServerConfig {
                bind: "127.0.0.1:0".to_string(),
                ..config::load_config(config_path)?
            };
            let runtime = Runtime::new()?;
            let running = runtime.block_on(server::spawn(config))?;
            let client = Lipo::new(ClientConfig::new(running.base_uri()).timeout(timeout))?;
            Ok(Endpoint {
                client,
                _local: Some(LocalServer {
                    server: Some(running),
                    runtime,
                }),
            })
        }
    }
}

fn convert_pipeline(
    mut pipeline: Pipeline,
    output: &std::path::Path,
    resize: Option<(Option<u32>, Option<u32>)>,
    fit: Fit,
    format: Option<String>,
    quality: Option<u8>,
) -> Result<Pipeline, String> {
    if let Some((width, height)) = resize {
        let options = ResizeOptions {
            width,
            height,
            ..ResizeOptions::default()
        };
        pipeline = pipeline.resize_with(options.fit(fit));
    }
    let format =
        format.or_else(|| OutputFormat::from_path(output).map(|f| f.as_str().to_string()));
    match (format, quality) {
        (Some(format), Some(q)) => {
            Ok(pipeline.to_format_with(format, FormatOptions::default().quality(q)))
        }
        (Some(format), None) => Ok(pipeline.to_format(format)),
        (None, Some(_)) => Err("--quality needs --format or a known output extension".to_string()),
        (None, None) => Ok(pipeline),
    }
}

async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let running = server::spawn(config.clone()).await?;
    output::print_listening(running.addr(), &config);
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    let stats = running.cache_stats();
    running.shutdown().await;
    println!("Cache: {stats}");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level, cli.log_format);

    match cli.command {
        Command::Serve { bind } => {
            let mut config = config::load_config(&cli.config)?;
            if let Some(bind) = bind {
                config.bind = bind;
                config.validate()?;
            }
            Runtime::new()?.block_on(serve(config))?;
        }
        Command::Metadata { input, remote } => {
            let endpoint = connect(&remote, &cli.config)?;
            let metadata = endpoint.client.input(input.clone()).metadata_sync()?;
            output::print_metadata(&input.display().to_string(), &metadata);
        }
        Command::Convert {
            input,
            output: out,
            resize,
            fit,
            format,
            quality,
            remote,
        } => {
            let endpoint = connect(&remote, &cli.config)?;
            let pipeline = convert_pipeline(
                endpoint.client.input(input.clone()),
                &out,
                resize,
                fit,
                format,
                quality,
            )?;
            let info = pipeline.to_file_sync(&out)?;
            output::print_output_info(
                &input.display().to_string(),
                &out.display().to_string(),
                &info,
            );
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}
