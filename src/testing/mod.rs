//! Test support
//!
//! [`MockSession`] stands in for a remote interactive session. Responses are
//! scripted per command, and the counters it hands out stay readable after
//! the session itself has moved into a [`SessionHandle`](crate::session::SessionHandle).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::common::{Error, Result};
use crate::context::{Context, LocalContext};
use crate::session::Session;
use crate::testbed::{DpdkBuild, LogicalCore, Node, Port, PortLink, Topology};

/// Serializes the unit tests that install the process-wide context
#[cfg(test)]
pub(crate) static GLOBAL_CONTEXT: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Timestamp of the DPDK build returned by [`test_context`]
pub const TEST_TIMESTAMP: &str = "20240101120000";

fn test_node(name: &str, pci_bus: &str) -> Node {
    Node {
        name: name.to_string(),
        hostname: format!("{}.lab", name),
        // 2 sockets x 2 cores x 2 hyperthreads
        lcores: (0..8)
            .map(|lcore| LogicalCore::new(lcore, lcore / 2, lcore / 4))
            .collect(),
        memory_channels: 4,
        ports: vec![
            Port::new("p0", format!("0000:{}.0", pci_bus)),
            Port::new("p1", format!("0000:{}.1", pci_bus)),
        ],
    }
}

/// A two-link testbed context with default local settings
///
/// SUT ports are `0000:00:08.0` and `0000:00:08.1`; TG ports live on bus
/// `00:09`. Both nodes expose lcores 0-7.
pub fn test_context() -> Context {
    let sut = test_node("sut", "00:08");
    let tg = test_node("tg", "00:09");
    let topology = Topology::from_port_links(
        sut.ports
            .iter()
            .zip(&tg.ports)
            .map(|(sut_port, tg_port)| PortLink {
                sut_port: sut_port.clone(),
                tg_port: tg_port.clone(),
            })
            .collect::<Vec<_>>(),
    );
    let dpdk = DpdkBuild::with_timestamp("/opt/dpdk/build", TEST_TIMESTAMP);
    Context::new(sut, tg, topology, dpdk, LocalContext::default())
}

/// Shared call counter
#[derive(Debug, Clone, Default)]
pub struct CallCount(Arc<AtomicUsize>);

impl CallCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Shared log of the commands a session received
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<String>>>);

impl SentLog {
    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, text: &str) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
    }
}

/// Scripted in-memory session
#[derive(Debug)]
pub struct MockSession {
    name: String,
    responses: HashMap<String, String>,
    start_error: Option<String>,
    close_error: Option<String>,
    hang_on_start: bool,
    hang_on_close: bool,
    closed: bool,
    starts: CallCount,
    closes: CallCount,
    sent: SentLog,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            responses: HashMap::new(),
            start_error: None,
            close_error: None,
            hang_on_start: false,
            hang_on_close: false,
            closed: false,
            starts: CallCount::default(),
            closes: CallCount::default(),
            sent: SentLog::default(),
        }
    }

    /// Name used in error messages
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Answer `command` with `output`; unknown commands produce no output
    pub fn respond(mut self, command: impl Into<String>, output: impl Into<String>) -> Self {
        self.responses.insert(command.into(), output.into());
        self
    }

    pub fn fail_start(mut self, reason: impl Into<String>) -> Self {
        self.start_error = Some(reason.into());
        self
    }

    pub fn fail_close(mut self, reason: impl Into<String>) -> Self {
        self.close_error = Some(reason.into());
        self
    }

    /// Never see the ready token
    pub fn hang_on_start(mut self) -> Self {
        self.hang_on_start = true;
        self
    }

    /// Never finish closing
    pub fn hang_on_close(mut self) -> Self {
        self.hang_on_close = true;
        self
    }

    pub fn start_count(&self) -> CallCount {
        self.starts.clone()
    }

    pub fn close_count(&self) -> CallCount {
        self.closes.clone()
    }

    pub fn sent(&self) -> SentLog {
        self.sent.clone()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn start(&mut self, ready_token: &str) -> Result<()> {
        self.starts.bump();
        if self.hang_on_start {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = &self.start_error {
            return Err(Error::SessionStartFailed {
                name: self.name.clone(),
                reason: reason.clone(),
            });
        }
        tracing::debug!("Mock session {} ready on '{}'", self.name, ready_token);
        Ok(())
    }

    async fn send(&mut self, text: &str) -> Result<String> {
        if self.closed {
            return Err(Error::SessionClosed(self.name.clone()));
        }
        self.sent.push(text);
        Ok(self.responses.get(text).cloned().unwrap_or_default())
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.bump();
        self.closed = true;
        if self.hang_on_close {
            std::future::pending::<()>().await;
        }
        match &self.close_error {
            Some(reason) => Err(Error::close_failed(&self.name, reason)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_and_log() {
        let mut mock = MockSession::new().respond("show port info 0", "Link status: up");
        let sent = mock.sent();

        mock.start("testpmd>").await.unwrap();
        assert_eq!(mock.send("show port info 0").await.unwrap(), "Link status: up");
        assert_eq!(mock.send("unknown").await.unwrap(), "");
        assert_eq!(sent.all(), vec!["show port info 0", "unknown"]);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let mut mock = MockSession::new().named("shell");
        let closes = mock.close_count();

        mock.close().await.unwrap();
        assert_eq!(closes.get(), 1);
        assert!(matches!(mock.send("ls").await, Err(Error::SessionClosed(ref n)) if n == "shell"));
    }
}
