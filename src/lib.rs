//! Log File Metric Exporter: tracks how many bytes each container wrote to
//! its log files on a node and exposes the totals as a Prometheus counter.
//!
//! The core is an inotify watch engine over the kubelet pod log tree
//! (`/var/log/pods`) and a rotation-aware accounting scheme that turns file
//! size samples into the monotonically increasing
//! `log_logged_bytes_total{namespace,podname,poduuid,containername}` counter.
pub mod accounting;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fsutil;
pub mod identity;
pub mod inotify;
pub mod transport;
pub mod watch;

pub use error::{Error, Result};

/// Runs the exporter until the event loop or the metrics server fails.
///
/// Configuration and TLS material are validated before the watch engine
/// starts.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid configuration or unreadable TLS certificate/key.
/// - A log root that does not exist or cannot be watched.
/// - An inotify queue overflow; the process is expected to be restarted,
///   which resyncs all counters from the current file sizes.
/// - Failure to bind the metrics address.
pub async fn run() -> Result<()> {
    let config = config::Config::from_env()?;
    log::info!(
        "starting log file metric exporter: log_dir={}, addr={}",
        config.log_dir.display(),
        config.listen_addr
    );
    let tls = config
        .tls
        .as_ref()
        .map(transport::server_config)
        .transpose()?;

    let engine = engine::Engine::start(&config.log_dir, config.self_dir_name.clone())?;
    let server = api::MetricsServer::new(engine.counters());
    let mut dispatcher = tokio::spawn(engine.into_dispatcher().run());

    tokio::select! {
        result = &mut dispatcher => {
            result??;
            log::info!("event dispatcher finished");
            Ok(())
        }
        result = server.serve(config.listen_addr, tls) => {
            dispatcher.abort();
            result.map_err(Error::Server)
        }
    }
}
