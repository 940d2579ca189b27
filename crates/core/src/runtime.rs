//! Process runtime environment: worker width and logging.

use tracing::Level;

/// Default cap on concurrent RTSP connection threads.
pub const DEFAULT_WORKER_THREADS: usize = 16;

/// Where engine logs go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    /// Formatted events on stderr.
    Console,
    /// Install nothing; events are dropped unless the host installed a subscriber.
    Disabled,
}

/// One-time environment settings applied by [`MediaEngine::init_environment`](crate::engine::MediaEngine::init_environment).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum number of RTSP client connections served at once
    /// (one thread each).
    pub worker_threads: usize,
    pub log_level: Level,
    pub log_sink: LogSink,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            log_level: Level::INFO,
            log_sink: LogSink::Console,
        }
    }
}

/// Install the global log subscriber described by `config`.
///
/// Returns `false` when nothing was installed, either because the sink is
/// disabled or because the host already set a global subscriber.
pub fn install_logging(config: &RuntimeConfig) -> bool {
    match config.log_sink {
        LogSink::Disabled => false,
        LogSink::Console => {
            let installed = tracing_subscriber::fmt()
                .with_max_level(config.log_level)
                .with_writer(std::io::stderr)
                .try_init()
                .is_ok();
            if !installed {
                tracing::debug!("global subscriber already set, keeping it");
            }
            installed
        }
    }
}

/// Parse a log level name (`trace`, `debug`, `info`, `warn`, `error`).
pub fn parse_level(name: &str) -> Option<Level> {
    name.parse().ok()
}
