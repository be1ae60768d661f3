//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use request_telemetry::config::{ConfigStore, LoggingSettings};
use request_telemetry::observability::SinkRouter;
use request_telemetry::{HttpServer, Shutdown};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Console stand-in that keeps everything written to it.
#[derive(Clone, Default)]
pub struct CapturedConsole(Arc<Mutex<Vec<u8>>>);

impl CapturedConsole {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for CapturedConsole {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A running demo service writing its logs under a temp dir.
pub struct TestService {
    pub addr: SocketAddr,
    pub dir: TempDir,
    pub store: Arc<ConfigStore>,
    pub sinks: Arc<SinkRouter>,
    pub console: CapturedConsole,
    pub shutdown: Arc<Shutdown>,
}

impl TestService {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn performance_records(&self) -> Vec<Value> {
        self.sinks.flush_all();
        read_lines(self.dir.path(), "perf.")
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    pub fn json_events(&self) -> Vec<Value> {
        self.sinks.flush_all();
        read_lines(self.dir.path(), "app-json.")
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    pub fn app_lines(&self) -> Vec<String> {
        self.sinks.flush_all();
        read_lines(self.dir.path(), "app.")
    }

    /// Publish a logging change derived from the current snapshot.
    pub fn update_logging(&self, change: impl FnOnce(&mut LoggingSettings)) {
        let mut logging = (**self.store.logging()).clone();
        change(&mut logging);
        self.store.publish(logging).unwrap();
    }
}

/// Logging settings that write every sink into `dir` with bare templates.
pub fn logging_in(dir: &Path) -> LoggingSettings {
    let mut logging = LoggingSettings::default();
    logging.console_log.message_template = "[{Level:u3}] [{CorrelationId}] {Message}{NewLine}".to_string();
    logging.app_log.path = dir.join("app..log").to_string_lossy().into_owned();
    logging.app_log.message_template = "[{CorrelationId}] {Message}{NewLine}".to_string();
    logging.app_json_log.path = dir.join("app-json..json").to_string_lossy().into_owned();
    logging.performance_log.path = dir.join("perf..log").to_string_lossy().into_owned();
    logging.performance_log.message_template = "{Message}{NewLine}".to_string();
    logging
}

/// Start the demo service on an ephemeral port.
pub async fn start_service() -> TestService {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ConfigStore::default());
    store.publish(logging_in(dir.path())).unwrap();

    let console = CapturedConsole::default();
    let sinks = Arc::new(SinkRouter::new(Arc::clone(&store)).with_console_writer(console.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Arc::new(Shutdown::new());
    let server = HttpServer::new(Arc::clone(&sinks));
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    TestService {
        addr,
        dir,
        store,
        sinks,
        console,
        shutdown,
    }
}

/// Every line of every file in `dir` whose name starts with `prefix`.
pub fn read_lines(dir: &Path, prefix: &str) -> Vec<String> {
    let mut paths: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(prefix))
        })
        .collect();
    paths.sort();

    paths
        .into_iter()
        .flat_map(|path| {
            fs::read_to_string(path)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
