//! Interactive command sessions
//!
//! A session wraps one remote interactive process (a shell, testpmd, ...).
//! Connection handling and prompt detection belong to the implementation;
//! the framework only relies on [`Session::start`], [`Session::send`] and
//! [`Session::close`].

pub mod pool;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::common::Result;

pub use pool::SessionPool;

/// An interactive command session
#[async_trait]
pub trait Session: Send {
    /// Launch the session and wait until `ready_token` shows up in its output
    async fn start(&mut self, ready_token: &str) -> Result<()>;

    /// Send one command, returning the output it produced
    async fn send(&mut self, text: &str) -> Result<String>;

    /// Terminate the session and release its resources
    async fn close(&mut self) -> Result<()>;
}

/// Process-unique session identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared handle to a session
///
/// Clones refer to the same session; the pool holds one clone while the
/// owner keeps another.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    name: Arc<str>,
    inner: Arc<Mutex<dyn Session>>,
}

impl SessionHandle {
    pub fn new<S: Session + 'static>(name: impl Into<String>, session: S) -> Self {
        let name: String = name.into();
        Self {
            id: SessionId::next(),
            name: name.into(),
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn start(&self, ready_token: &str) -> Result<()> {
        self.inner.lock().await.start(ready_token).await
    }

    pub async fn send(&self, text: &str) -> Result<String> {
        self.inner.lock().await.send(text).await
    }

    pub async fn close(&self) -> Result<()> {
        self.inner.lock().await.close().await
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SessionHandle {}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.id)
    }
}
