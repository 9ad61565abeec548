//! Process-wide runtime context
//!
//! One [`Context`] describes the test run in progress: the testbed it runs
//! on, the session pool, and a [`LocalContext`] describing the test unit
//! currently executing. The harness creates it once with [`init_ctx`];
//! everything else reaches it through [`get_ctx`].
//!
//! The local context changes only through [`Context::with_local`] (and its
//! async and core-filter variants) or [`Context::reset_local`]. An override
//! is undone when the wrapped work ends, whichever way it ends: return,
//! error, panic, or the future being dropped.

mod local;

pub use local::{LocalContext, LocalField, DEFAULT_TIMEOUT};

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::session::SessionPool;
use crate::testbed::{DpdkBuild, LcoreFilter, Node, Topology};

static CONTEXT: RwLock<Option<Arc<Context>>> = RwLock::new(None);

/// Install `ctx` as the process-wide context, replacing any previous one
pub fn init_ctx(ctx: Context) -> Arc<Context> {
    let ctx = Arc::new(ctx);
    let mut slot = CONTEXT.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        tracing::debug!("Replacing the runtime context");
    }
    *slot = Some(Arc::clone(&ctx));
    ctx
}

/// The process-wide context
pub fn get_ctx() -> Result<Arc<Context>> {
    CONTEXT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(Error::ContextNotInitialized)
}

/// Runtime context of a test run
#[derive(Debug)]
pub struct Context {
    pub sut_node: Node,
    pub tg_node: Node,
    pub topology: Topology,
    pub dpdk: DpdkBuild,
    pub shell_pool: SessionPool,
    local: RwLock<LocalContext>,
    local_defaults: LocalContext,
}

impl Context {
    pub fn new(
        sut_node: Node,
        tg_node: Node,
        topology: Topology,
        dpdk: DpdkBuild,
        local_defaults: LocalContext,
    ) -> Self {
        Self {
            sut_node,
            tg_node,
            topology,
            dpdk,
            shell_pool: SessionPool::with_close_timeout(local_defaults.timeout),
            local: RwLock::new(local_defaults.clone()),
            local_defaults,
        }
    }

    /// Build the context of a run from its configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let sut_node = Node::try_from(&config.sut)?;
        let tg_node = Node::try_from(&config.tg)?;
        let topology = Topology::from_config(&config.links, &sut_node, &tg_node)?;
        let dpdk = DpdkBuild::new(&config.dpdk.build_dir);
        let local_defaults = LocalContext::try_from(&config.defaults)?;

        tracing::info!(
            "Test run context: SUT '{}', TG '{}', {} link(s)",
            sut_node.name,
            tg_node.name,
            topology.links().len()
        );

        Ok(Self::new(sut_node, tg_node, topology, dpdk, local_defaults))
    }

    /// Snapshot of the local context
    pub fn local(&self) -> LocalContext {
        self.local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn local_defaults(&self) -> &LocalContext {
        &self.local_defaults
    }

    fn local_mut(&self) -> RwLockWriteGuard<'_, LocalContext> {
        self.local.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set one local field until the next [`reset_local`](Self::reset_local)
    ///
    /// An enclosing [`with_local`](Self::with_local) overriding the same field
    /// still restores its own entry value when it ends.
    pub fn set_local(&self, field: LocalField) {
        tracing::trace!("Setting local context: {:?}", field);
        field.swap_into(&mut self.local_mut());
    }

    /// Restore every local field to its default
    pub fn reset_local(&self) {
        *self.local_mut() = self.local_defaults.clone();
    }

    fn apply(&self, overrides: impl IntoIterator<Item = LocalField>) -> Vec<LocalField> {
        let mut local = self.local_mut();
        overrides
            .into_iter()
            .map(|field| {
                tracing::trace!("Overriding local context: {:?}", field);
                field.swap_into(&mut local)
            })
            .collect()
    }

    fn restore(&self, saved: Vec<LocalField>) {
        let mut local = self.local_mut();
        for field in saved.into_iter().rev() {
            field.swap_into(&mut local);
        }
    }

    /// Run `f` with `overrides` applied to the local context
    pub fn with_local<R>(
        &self,
        overrides: impl IntoIterator<Item = LocalField>,
        f: impl FnOnce() -> R,
    ) -> R {
        let saved = self.apply(overrides);
        let _restore = scopeguard::guard(saved, |saved| self.restore(saved));
        f()
    }

    /// Await `work` with `overrides` applied to the local context
    pub async fn with_local_async<F: Future>(
        &self,
        overrides: impl IntoIterator<Item = LocalField>,
        work: F,
    ) -> F::Output {
        let saved = self.apply(overrides);
        let _restore = scopeguard::guard(saved, |saved| self.restore(saved));
        work.await
    }

    /// Run `f` with a different lcore selection
    pub fn filter_cores<R>(
        &self,
        filter: LcoreFilter,
        ascending: Option<bool>,
        f: impl FnOnce() -> R,
    ) -> R {
        let mut overrides = vec![LocalField::LcoreFilter(filter)];
        overrides.extend(ascending.map(LocalField::AscendingCores));
        self.with_local(overrides, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::{Config, LinkConfig, NodeConfig, PortConfig};
    use crate::testing::test_context;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::time::Duration;

    #[test]
    fn test_override_is_restored_after_error() {
        let ctx = test_context();
        let before = ctx.local().timeout;

        let result: Result<()> = ctx.with_local([LocalField::Timeout(Duration::from_secs(5))], || {
            assert_eq!(ctx.local().timeout, Duration::from_secs(5));
            Err(Error::Internal("test failure".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(ctx.local().timeout, before);
    }

    #[test]
    fn test_override_is_restored_after_panic() {
        let ctx = test_context();
        let caught = catch_unwind(AssertUnwindSafe(|| {
            ctx.with_local([LocalField::AscendingCores(false)], || {
                panic!("test unit crashed");
            })
        }));

        assert!(caught.is_err());
        assert!(ctx.local().ascending_cores);
    }

    #[test]
    fn test_nested_overrides_restore_their_own_entry_values() {
        let ctx = test_context();
        let suite = |name: &str| LocalField::CurrentTestSuite(Some(name.to_string()));

        ctx.with_local([suite("outer")], || {
            ctx.with_local([suite("inner"), LocalField::Timeout(Duration::from_secs(1))], || {
                assert_eq!(ctx.local().current_test_suite.as_deref(), Some("inner"));
            });
            let local = ctx.local();
            assert_eq!(local.current_test_suite.as_deref(), Some("outer"));
            assert_eq!(local.timeout, DEFAULT_TIMEOUT);
        });

        assert_eq!(ctx.local().current_test_suite, None);
    }

    #[test]
    fn test_same_field_twice_restores_original() {
        let ctx = test_context();
        ctx.with_local(
            [
                LocalField::Timeout(Duration::from_secs(1)),
                LocalField::Timeout(Duration::from_secs(2)),
            ],
            || assert_eq!(ctx.local().timeout, Duration::from_secs(2)),
        );
        assert_eq!(ctx.local().timeout, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_async_override_restored_on_cancellation() {
        let ctx = test_context();
        let work = ctx.with_local_async(
            [LocalField::CurrentTestCase(Some("test_rx".to_string()))],
            std::future::pending::<()>(),
        );

        let timed_out = tokio::time::timeout(Duration::from_millis(10), work).await;
        assert!(timed_out.is_err());
        assert_eq!(ctx.local().current_test_case, None);
    }

    #[tokio::test]
    async fn test_async_override_visible_inside() {
        let ctx = test_context();
        let seen = ctx
            .with_local_async([LocalField::CurrentTestCase(Some("test_tx".to_string()))], async {
                ctx.local().current_test_case
            })
            .await;
        assert_eq!(seen.as_deref(), Some("test_tx"));
        assert_eq!(ctx.local().current_test_case, None);
    }

    #[test]
    fn test_filter_cores() {
        let ctx = test_context();
        let list: crate::testbed::LogicalCoreList = "4-5".parse().unwrap();
        ctx.filter_cores(LcoreFilter::List(list.clone()), Some(false), || {
            let local = ctx.local();
            assert_eq!(local.lcore_filter, LcoreFilter::List(list.clone()));
            assert!(!local.ascending_cores);
        });
        assert_eq!(ctx.local().lcore_filter, LcoreFilter::default());
    }

    #[test]
    fn test_reset_local() {
        let ctx = test_context();
        let saved = ctx.apply([LocalField::CurrentTestSuite(Some("leaked".to_string()))]);
        assert_eq!(saved.len(), 1);

        ctx.reset_local();
        assert_eq!(&ctx.local(), ctx.local_defaults());
    }

    #[test]
    fn test_from_config_validates_links() {
        let node = |name: &str| NodeConfig {
            name: name.to_string(),
            lcores: "0-3".to_string(),
            ports: vec![PortConfig {
                name: "p0".to_string(),
                pci: "0000:00:08.0".to_string(),
            }],
            ..Default::default()
        };
        let mut config = Config {
            sut: node("sut"),
            tg: node("tg"),
            links: vec![LinkConfig {
                sut_port: "p0".to_string(),
                tg_port: "p0".to_string(),
            }],
            ..Default::default()
        };

        let ctx = Context::from_config(&config).unwrap();
        assert_eq!(ctx.topology.sut_ports()[0].pci, "0000:00:08.0");
        assert_eq!(ctx.shell_pool.depth(), 0);

        config.links[0].tg_port = "p7".to_string();
        assert!(matches!(
            Context::from_config(&config),
            Err(Error::PortNotFound { .. })
        ));
    }

    #[test]
    fn test_init_replaces_global_context() {
        let _lock = crate::testing::GLOBAL_CONTEXT.blocking_lock();
        let first = init_ctx(test_context());
        assert!(Arc::ptr_eq(&first, &get_ctx().unwrap()));

        let second = init_ctx(test_context());
        assert!(Arc::ptr_eq(&second, &get_ctx().unwrap()));
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
