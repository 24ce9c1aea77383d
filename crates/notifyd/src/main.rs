//! # notifyd
//!
//! Notification relay binary: loads settings, sets up logging and metrics,
//! then serves until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use notify_server::config::ServerConfig;
use notify_server::server::NotificationServer;
use notify_server::shutdown::wait_for_signal;

/// How long in-flight connections get to wind down on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Repository change notification relay.
#[derive(Parser, Debug)]
#[command(name = "notifyd", about = "Repository change notification relay")]
struct Cli {
    /// Directory holding `notification.json` and the default log file.
    #[arg(short = 'c', long, value_parser = existing_dir)]
    config_dir: PathBuf,

    /// Log file path; `-` logs to stderr.
    #[arg(short = 'l', long)]
    log_file: Option<String>,
}

fn existing_dir(raw: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(raw);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("config directory {raw} does not exist"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings =
        notify_settings::load_settings(&args.config_dir).context("Failed to load settings")?;

    let log_target =
        notify_logging::resolve_log_target(&args.config_dir, args.log_file.as_deref())
            .context("Failed to resolve log file")?;
    notify_logging::init_subscriber(&settings.logging.level, &log_target)
        .context("Failed to initialize logging")?;

    let metrics =
        notify_server::metrics::install_recorder().context("Failed to install metrics")?;
    let server = NotificationServer::new(ServerConfig::from_settings(&settings), metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(config_dir = %args.config_dir.display(), "notification relay listening on http://{addr}");

    wait_for_signal().await;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(SHUTDOWN_TIMEOUT))
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn config_dir_is_required() {
        assert!(Cli::try_parse_from(["notifyd"]).is_err());
    }

    #[test]
    fn config_dir_must_exist() {
        let err = Cli::try_parse_from(["notifyd", "-c", "/definitely/not/here"]).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn parses_short_and_long_flags() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();

        let cli = Cli::try_parse_from(["notifyd", "-c", dir_str, "-l", "-"]).unwrap();
        assert_eq!(cli.config_dir, dir.path());
        assert_eq!(cli.log_file.as_deref(), Some("-"));

        let cli = Cli::try_parse_from(["notifyd", "--config-dir", dir_str]).unwrap();
        assert!(cli.log_file.is_none());
    }

    #[test]
    fn settings_file_drives_server_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("notification.json"),
            r#"{"general": {"port": 9099}, "session": {"queue_capacity": 3}}"#,
        )
        .unwrap();
        let settings = notify_settings::load_settings(dir.path()).unwrap();
        let config = ServerConfig::from_settings(&settings);
        assert_eq!(config.port, 9099);
        assert_eq!(config.session.queue_capacity, 3);
    }

    #[tokio::test]
    async fn server_boots_and_shuts_down() {
        let metrics = PrometheusBuilder::new().build_recorder().handle();
        let server = NotificationServer::new(ServerConfig::default(), metrics);
        let (addr, handle) = server.listen().await.unwrap();

        let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert!(resp.status().is_success());
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");

        server
            .shutdown()
            .graceful_shutdown(vec![handle], Some(Duration::from_secs(5)))
            .await;
        assert!(server.shutdown().is_shutting_down());
    }
}
