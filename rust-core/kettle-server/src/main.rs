//! # Kettle Server
//!
//! Standalone demo server: loads a JSON config, opens the access log file and
//! serves a handful of sample routes until SIGINT.

use anyhow::Context;
use clap::Parser;
use kettle_core::{
    HandlerError, HandlerOutput, Method, ResultExt, RouteSpec, RouteTable, Server, ServerConfig,
};
use serde::Deserialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kettle-server", version, about = "Kettle HTTP application server")]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address from the config
    #[arg(short, long)]
    address: Option<std::net::SocketAddr>,
}

/// On-disk configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    #[serde(flatten)]
    server: ServerConfig,
    /// Access log destination; stdout when absent
    log_file: Option<PathBuf>,
}

impl FileConfig {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    fn log_sink(&self) -> anyhow::Result<Box<dyn Write + Send>> {
        match &self.log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("failed to open log file {}", path.display()))?;
                Ok(Box::new(file))
            }
            None => Ok(Box::new(std::io::stdout())),
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("kettle=info".parse()?);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
    Ok(())
}

fn demo_routes() -> anyhow::Result<RouteTable> {
    let mut routes = RouteTable::new();

    routes.add(RouteSpec::get("/", |_, _| Ok("kettle is on\n".into())))?;

    routes.add(RouteSpec::get("/users/:id{integer}", |_, params| {
        let id = params.get_int("id").unwrap_or_default();
        Ok(format!("user {id}").into())
    }))?;

    routes.add(RouteSpec::get("/files/*file{path}", |ctx, params| {
        ctx.set_header("Content-Type", "text/plain");
        Ok(params.get_str("file").unwrap_or_default().to_string().into())
    }))?;

    routes.add(RouteSpec::new(
        [Method::Get, Method::Post],
        "/hello",
        |ctx, _| {
            let name = ctx
                .form("name")
                .or_else(|| ctx.query("name"))
                .or_else(|| ctx.cookie("name"))
                .unwrap_or("stranger");
            Ok(format!("hello, {name}").into())
        },
    ))?;

    routes.add(RouteSpec::post("/upload", |ctx, _| {
        let listing: Vec<String> = ctx
            .files()
            .iter()
            .map(|f| format!("{} {} {}", f.field, f.filename, f.data.len()))
            .collect();
        Ok(listing.join("\n").into())
    }))?;

    routes.add(RouteSpec::post("/echo", |ctx, _| {
        let value: serde_json::Value = ctx.json().or_http(400)?;
        Ok(HandlerOutput::json(value))
    }))?;

    routes.add(RouteSpec::get("/teapot", |_, _| {
        Err(HandlerError::http(418, "I'm a teapot"))
    }))?;

    Ok(routes)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    if let Some(address) = args.address {
        config.server.address = address;
    }

    let sink = config.log_sink()?;
    info!("Starting kettle-server v{}", kettle_core::VERSION);
    let server = Server::with_log_sink(config.server, demo_routes()?, sink);
    server.serve().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kettle_core::{Dispatcher, IncomingRequest};

    #[test]
    fn test_file_config_flattens_server_settings() {
        let config: FileConfig = serde_json::from_str(
            r#"{"address": "0.0.0.0:9000", "log_format": "time c-ip", "log_file": "access.log"}"#,
        )
        .unwrap();
        assert_eq!(config.server.address.port(), 9000);
        assert_eq!(config.server.log_format.as_deref(), Some("time c-ip"));
        assert_eq!(config.log_file, Some(PathBuf::from("access.log")));
        assert!(config.server.expose_errors);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: FileConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.address.port(), 4567);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_demo_routes() {
        let mut dispatcher = Dispatcher::new(demo_routes().unwrap());

        let res = dispatcher.handle(IncomingRequest::new(Method::Get, "/users/7"));
        assert_eq!(res.status, 200);
        assert_eq!(&res.body[..], b"user 7");

        let res = dispatcher.handle(IncomingRequest::new(Method::Get, "/hello?name=ada"));
        assert_eq!(&res.body[..], b"hello, ada");

        let res = dispatcher.handle(
            IncomingRequest::new(Method::Post, "/echo")
                .header("Content-Type", "application/json")
                .header("Content-Length", "11")
                .body(r#"{"a":[1,2]}"#),
        );
        assert_eq!(res.status, 200);
        assert_eq!(&res.body[..], br#"{"a":[1,2]}"#);

        let res = dispatcher.handle(
            IncomingRequest::new(Method::Post, "/echo")
                .header("Content-Length", "4")
                .body("nope"),
        );
        assert_eq!(res.status, 400);

        let res = dispatcher.handle(IncomingRequest::new(Method::Get, "/teapot"));
        assert_eq!(res.status, 418);

        let res = dispatcher.handle(IncomingRequest::new(Method::Get, "/files/../etc/passwd"));
        assert_eq!(res.status, 400);
    }
}
