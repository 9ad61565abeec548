//! Stack-scoped session registry
//!
//! The pool keeps one level of sessions per nested test phase. Entering a
//! phase pushes an empty level; leaving it pops the level and closes every
//! session that was registered there. Level 0 always exists.
//!
//! Closes run as tasks on the tokio runtime, each bounded by the pool's
//! close timeout. A level that has left the registry is therefore closed
//! even when the future popping it is dropped.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use scopeguard::ScopeGuard;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::common::{Error, Result};

use super::SessionHandle;

/// Close timeout of a pool built with [`SessionPool::new`]
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(15);

/// A session whose close is in flight
struct Closing {
    session: SessionHandle,
    task: JoinHandle<Result<()>>,
}

/// Registry of live sessions, grouped by nesting depth
#[derive(Debug)]
pub struct SessionPool {
    levels: Mutex<Vec<Vec<SessionHandle>>>,
    close_timeout: Duration,
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionPool {
    pub fn new() -> Self {
        Self::with_close_timeout(DEFAULT_CLOSE_TIMEOUT)
    }

    /// A pool that gives up on a single close after `close_timeout`
    pub fn with_close_timeout(close_timeout: Duration) -> Self {
        Self {
            levels: Mutex::new(vec![Vec::new()]),
            close_timeout,
        }
    }

    fn levels(&self) -> MutexGuard<'_, Vec<Vec<SessionHandle>>> {
        self.levels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    /// Current depth; 0 is the outermost level
    pub fn depth(&self) -> usize {
        self.levels().len().saturating_sub(1)
    }

    /// Number of sessions registered across all levels
    pub fn len(&self) -> usize {
        self.levels().iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, session: &SessionHandle) -> bool {
        self.levels().iter().any(|level| level.contains(session))
    }

    /// Add a session to the current level
    pub fn register(&self, session: &SessionHandle) {
        let mut levels = self.levels();
        let depth = levels.len() - 1;
        tracing::debug!("Registering session {} at depth {}", session, depth);
        levels[depth].push(session.clone());
    }

    /// Remove a session from whichever level holds it
    pub fn unregister(&self, session: &SessionHandle) {
        let mut levels = self.levels();
        let current = levels.len() - 1;

        for (depth, level) in levels.iter_mut().enumerate().rev() {
            if let Some(index) = level.iter().position(|s| s == session) {
                level.remove(index);
                if depth == current {
                    tracing::debug!("Unregistered session {} at depth {}", session, depth);
                } else {
                    tracing::warn!(
                        "Unregistered session {} from depth {} while the current depth is {}",
                        session,
                        depth,
                        current
                    );
                }
                return;
            }
        }

        tracing::debug!("Session {} was not registered", session);
    }

    /// Open a new empty level, returning its depth
    pub fn push(&self) -> usize {
        let mut levels = self.levels();
        levels.push(Vec::new());
        let depth = levels.len() - 1;
        tracing::debug!("Started session pool at depth {}", depth);
        depth
    }

    /// Take the sessions of `depth` and every level above it out of the registry
    ///
    /// Levels deeper than `depth` are dropped; depth 0 itself is only emptied.
    fn drain_from(&self, depth: usize) -> Vec<SessionHandle> {
        let mut levels = self.levels();
        let mut sessions = Vec::new();
        if depth == 0 {
            sessions.append(&mut levels[0]);
        }
        let keep = depth.max(1);
        if levels.len() > keep {
            sessions.extend(levels.drain(keep..).flatten());
        }
        sessions
    }

    fn spawn_closes(&self, runtime: &Handle, sessions: Vec<SessionHandle>) -> Vec<Closing> {
        let timeout = self.close_timeout;
        sessions
            .into_iter()
            .map(|session| {
                let closing = session.clone();
                let task = runtime.spawn(async move {
                    tokio::time::timeout(timeout, closing.close())
                        .await
                        .map_err(|_| Error::Timeout(timeout))?
                });
                Closing { session, task }
            })
            .collect()
    }

    async fn finish(closing: Vec<Closing>) -> Result<()> {
        let mut last_error: Option<Error> = None;
        for Closing { session, task } in closing {
            let closed = task.await.unwrap_or_else(|e| {
                Err(Error::Internal(format!("close task of {} failed: {}", session, e)))
            });
            if let Err(e) = closed {
                tracing::error!("Failed to close session {}: {}", session, e);
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close every session of the current level and drop the level
    ///
    /// Sessions close concurrently, each bounded by the close timeout. Every
    /// failure is logged and the last one, in registration order, is
    /// returned. Popping depth 0 leaves an empty depth 0 in place.
    pub async fn pop(&self) -> Result<()> {
        let depth = self.depth();
        self.pop_to(depth).await
    }

    async fn pop_to(&self, depth: usize) -> Result<()> {
        let sessions = self.drain_from(depth);
        tracing::debug!(
            "Terminating session pool at depth {} ({} session(s))",
            depth,
            sessions.len()
        );
        // pop is only ever awaited on the tokio runtime
        let closing = self.spawn_closes(&Handle::current(), sessions);
        Self::finish(closing).await
    }

    /// Tear down a level whose scope was dropped before it could pop
    fn abandon(&self, depth: usize) {
        let sessions = self.drain_from(depth);
        tracing::warn!(
            "Session pool level {} abandoned with {} session(s) open",
            depth,
            sessions.len()
        );

        match Handle::try_current() {
            Ok(runtime) => {
                self.spawn_closes(&runtime, sessions);
            }
            Err(_) => {
                let mut levels = self.levels();
                let parent = levels.len() - 1;
                tracing::warn!("No runtime to close on; moving sessions to depth {}", parent);
                levels[parent].extend(sessions);
            }
        }
    }

    /// Run `work` inside a fresh level, popping it afterwards
    ///
    /// An error from `work` takes precedence over a teardown error, which is
    /// then only logged. When the returned future is dropped early, the level
    /// still leaves the stack and its sessions are closed in the background.
    pub async fn scope<F, T>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let depth = self.push();
        let level = scopeguard::guard(depth, |depth| self.abandon(depth));
        let result = work.await;
        let teardown = self.pop_to(ScopeGuard::into_inner(level)).await;

        match (result, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown)) => {
                tracing::error!("Session pool teardown failed after an error: {}", teardown);
                Err(e)
            }
        }
    }
}
