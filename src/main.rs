//! kube-transport command line
//!
//! A thin driver over the library for poking at an API server:
//!
//! ```text
//! kube-transport [--config client.toml] get   <url>
//! kube-transport [--config client.toml] watch <url>          (streams lines)
//! kube-transport [--config client.toml] ws    <url> [-p proto] (stdin → socket)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;

use kube_transport::config::{load_config, ClientConfig};
use kube_transport::observability::logging;
use kube_transport::websocket::NORMAL_CLOSURE;
use kube_transport::{AsyncBody, HttpClient, HttpClientBuilder, WebSocket, WebSocketListener};

#[derive(Parser)]
#[command(name = "kube-transport")]
#[command(about = "HTTP and WebSocket client for Kubernetes-style APIs", long_about = None)]
struct Cli {
    /// TOML client configuration. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra request header, `Name: value`. May be repeated.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL and print the body
    Get { url: String },
    /// Stream a URL line by line (e.g. `?watch=true`)
    Watch { url: String },
    /// Open a WebSocket, send stdin lines, print what comes back
    Ws {
        url: String,
        #[arg(short = 'p', long)]
        subprotocol: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    logging::init(&config.observability);
    tracing::info!(
        read_timeout_ms = config.timeouts.read_ms,
        retries = config.retry.enabled,
        "kube-transport v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let client = HttpClientBuilder::from_config(config)?.build()?;
    let headers = parse_headers(&cli.headers)?;

    let result = match cli.command {
        Commands::Get { url } => get(&client, &url, &headers).await,
        Commands::Watch { url } => watch(&client, &url, &headers).await,
        Commands::Ws { url, subprotocol } => ws(&client, &url, &headers, subprotocol).await,
    };
    client.close();
    result
}

fn parse_headers(raw: &[String]) -> Result<Vec<(String, String)>, Box<dyn std::error::Error>> {
    raw.iter()
        .map(|h| match h.split_once(':') {
            Some((name, value)) => Ok((name.trim().to_string(), value.trim().to_string())),
            None => Err(format!("header '{}' is not 'Name: value'", h).into()),
        })
        .collect()
}

async fn get(
    client: &HttpClient,
    url: &str,
    headers: &[(String, String)],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = client.new_http_request_builder().url(url);
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let response = client.send::<String>(&builder.build()?).await?;
    eprintln!("{} (attempts: {})", response.status(), response.head().attempts());
    println!("{}", response.body());
    if !response.is_successful() {
        return Err(format!("request failed with status {}", response.code()).into());
    }
    Ok(())
}

async fn watch(
    client: &HttpClient,
    url: &str,
    headers: &[(String, String)],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = client.new_http_request_builder().url(url);
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let response = client
        .consume_lines(&builder.build()?, |line: String, body: &AsyncBody| {
            println!("{}", line);
            body.consume();
            Ok(())
        })
        .await?;
    eprintln!("{}", response.status());

    let done = response.body().done();
    tokio::select! {
        result = done => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, cancelling watch");
            response.body().cancel();
        }
    }
    Ok(())
}

/// Prints frames and wakes the driver once the socket closes.
struct Printer {
    closed: Arc<Notify>,
}

impl WebSocketListener for Printer {
    fn on_message(&self, socket: &WebSocket, text: String) {
        println!("{}", text);
        socket.request();
    }

    fn on_binary(&self, socket: &WebSocket, data: Bytes) {
        println!("<{} bytes>", data.len());
        socket.request();
    }

    fn on_close(&self, _socket: &WebSocket, code: u16, reason: String) {
        eprintln!("closed: {} {}", code, reason);
        self.closed.notify_one();
    }

    fn on_error(&self, _socket: &WebSocket, error: &kube_transport::TransportError) {
        eprintln!("error: {}", error);
        self.closed.notify_one();
    }
}

async fn ws(
    client: &HttpClient,
    url: &str,
    headers: &[(String, String)],
    subprotocol: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = client.new_websocket_builder().url(url);
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(protocol) = subprotocol {
        builder = builder.subprotocol(protocol);
    }

    let closed = Arc::new(Notify::new());
    let socket = builder
        .build_async(Printer {
            closed: closed.clone(),
        })
        .await?;
    eprintln!("connected {} (protocol: {:?})", socket.id(), socket.protocol());

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = closed.notified() => break,
            _ = tokio::signal::ctrl_c() => {
                socket.cancel();
                break;
            }
            line = stdin.next_line() => match line? {
                Some(line) => {
                    if !socket.send_text(line) {
                        break;
                    }
                }
                None => {
                    socket.send_close(NORMAL_CLOSURE, "");
                    closed.notified().await;
                    break;
                }
            },
        }
    }
    Ok(())
}
