//! Annotation server lifecycle management
//!
//! An annotation server is an owned resource with an explicit lifecycle:
//! [`AnnotatorService::start`] brings it up and waits for readiness,
//! [`AnnotatorService::stop`] tears it down, and dropping a [`ServerSession`]
//! kills any process it still owns. Readiness is established by probing the
//! server URL with exponential backoff; any HTTP answer counts as ready.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};

use relex_core::{RelexError, Result};

/// Longest delay between two readiness probes
const MAX_PROBE_DELAY: Duration = Duration::from_secs(8);

/// How long a single readiness probe waits for an answer
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle interface for annotation services
pub trait AnnotatorService {
    /// Probe whether the service currently answers requests
    fn is_ready(&self) -> bool;

    /// Start the service and block until it is ready
    fn start(&mut self) -> Result<()>;

    /// Stop the service
    fn stop(&mut self);
}

/// Configuration for a locally spawned annotation server
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Executable to launch
    pub command: String,

    /// Arguments passed to the executable
    pub args: Vec<String>,

    /// Working directory for the server process
    pub workdir: Option<PathBuf>,

    /// URL probed for readiness
    pub probe_url: String,

    /// Readiness probes before giving up
    pub max_probes: u32,

    /// Delay before the first probe; doubles per probe up to 8 seconds
    pub initial_probe_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: "java".to_string(),
            args: vec![
                "-mx4g".to_string(),
                "-cp".to_string(),
                "*".to_string(),
                "edu.stanford.nlp.pipeline.StanfordCoreNLPServer".to_string(),
                "-port".to_string(),
                "9000".to_string(),
            ],
            workdir: None,
            probe_url: "http://localhost:9000".to_string(),
            max_probes: 10,
            initial_probe_delay: Duration::from_millis(500),
        }
    }
}

impl SessionConfig {
    /// Set the server working directory
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Set the probed URL
    pub fn with_probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = url.into();
        self
    }
}

/// An annotation server process owned by this session
///
/// The child process is killed when the session is stopped or dropped, so a
/// session cannot leak a server past its own lifetime.
pub struct ServerSession {
    config: SessionConfig,
    client: reqwest::blocking::Client,
    child: Option<Child>,
}

impl ServerSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let client = probe_client()?;
        Ok(Self {
            config,
            client,
            child: None,
        })
    }

    /// Wait for the server to answer, probing with exponential backoff
    fn wait_ready(&self) -> bool {
        let mut delay = self.config.initial_probe_delay;
        for probe in 1..=self.config.max_probes {
            std::thread::sleep(delay);
            if self.is_ready() {
                debug!(probe, "annotation server became ready");
                return true;
            }
            delay = (delay * 2).min(MAX_PROBE_DELAY);
        }
        false
    }
}

impl AnnotatorService for ServerSession {
    fn is_ready(&self) -> bool {
        probe(&self.client, &self.config.probe_url)
    }

    fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }

        info!(
            command = %self.config.command,
            url = %self.config.probe_url,
            "starting annotation server"
        );

        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(workdir) = &self.config.workdir {
            command.current_dir(workdir);
        }

        let child = command.spawn().map_err(|e| {
            RelexError::AnnotatorUnavailable(format!(
                "failed to launch {}: {e}",
                self.config.command
            ))
        })?;
        self.child = Some(child);

        if self.wait_ready() {
            return Ok(());
        }

        warn!(
            probes = self.config.max_probes,
            "annotation server never became ready, killing it"
        );
        self.stop();
        Err(RelexError::AnnotatorUnavailable(format!(
            "server at {} did not become ready after {} probes",
            self.config.probe_url, self.config.max_probes
        )))
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!("stopping annotation server");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for ServerSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A server managed outside this process
///
/// `start` only waits for the server to answer; `stop` is a no-op since the
/// session does not own the process.
pub struct RemoteSession {
    probe_url: String,
    client: reqwest::blocking::Client,
    max_probes: u32,
    initial_probe_delay: Duration,
}

impl RemoteSession {
    pub fn new(probe_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            probe_url: probe_url.into(),
            client: probe_client()?,
            max_probes: 10,
            initial_probe_delay: Duration::from_millis(500),
        })
    }

    /// Set how many readiness probes to attempt
    pub fn with_max_probes(mut self, max_probes: u32, initial_delay: Duration) -> Self {
        self.max_probes = max_probes;
        self.initial_probe_delay = initial_delay;
        self
    }
}

impl AnnotatorService for RemoteSession {
    fn is_ready(&self) -> bool {
        probe(&self.client, &self.probe_url)
    }

    fn start(&mut self) -> Result<()> {
        let mut delay = self.initial_probe_delay;
        for _ in 0..self.max_probes {
            if self.is_ready() {
                return Ok(());
            }
            std::thread::sleep(delay);
            delay = (delay * 2).min(MAX_PROBE_DELAY);
        }
        Err(RelexError::AnnotatorUnavailable(format!(
            "no answer from {} after {} probes",
            self.probe_url, self.max_probes
        )))
    }

    fn stop(&mut self) {}
}

fn probe_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|e| RelexError::Config(format!("failed to build HTTP client: {e}")))
}

/// A probe succeeds on any HTTP answer, error statuses included
fn probe(client: &reqwest::blocking::Client, url: &str) -> bool {
    client.get(url).send().is_ok()
}

// ============================================================================
// Tests
// ============================================================================
