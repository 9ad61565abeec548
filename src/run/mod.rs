//! Test run driver
//!
//! A [`TestRun`] walks its suites and their cases through setup, execution
//! and teardown. It installs the process-wide context, resets the local
//! context at each suite start and gives every suite and case its own session
//! pool level, so sessions opened by a phase are closed when it ends.
//!
//! Errors of a step are recorded and the run continues with the next unit.
//! An [`ErrorKind::Internal`] error ends the run. When a blocking suite fails,
//! the suites after it are recorded as blocked without running.

mod result;

pub use result::{CaseResult, SuiteResult, TestRunResult, Verdict};

use std::sync::Arc;

use async_trait::async_trait;

use crate::common::config::{Config, RunConfig};
use crate::common::{paths, Error, ErrorKind, Result};
use crate::context::{init_ctx, Context, LocalField};

/// A suite of test cases
///
/// Hooks default to doing nothing. A case body signals a failed check with
/// [`Error::VerifyFailed`] and a skip with [`Error::Skipped`]; any other error
/// is recorded as an error of the case.
#[async_trait]
pub trait TestSuite: Send + Sync {
    fn name(&self) -> &str;

    /// Names of the cases, in execution order
    fn test_cases(&self) -> Vec<String>;

    /// Whether a failure of this suite blocks the suites after it
    fn is_blocking(&self) -> bool {
        false
    }

    async fn set_up_suite(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    async fn tear_down_suite(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    async fn set_up_test_case(&self, _ctx: &Context, _case: &str) -> Result<()> {
        Ok(())
    }

    async fn tear_down_test_case(&self, _ctx: &Context, _case: &str) -> Result<()> {
        Ok(())
    }

    async fn run_test_case(&self, ctx: &Context, case: &str) -> Result<()>;
}

/// Classify the error of a step, or hand back an internal error to abort on
fn failure(step: &str, e: Error) -> Result<(Verdict, String)> {
    if e.kind() == ErrorKind::Internal {
        tracing::error!("A critical error occurred during {}, shutting down: {}", step, e);
        return Err(e);
    }
    let verdict = match e {
        Error::Skipped(_) => Verdict::Skip,
        Error::VerifyFailed(_) => Verdict::Fail,
        _ => Verdict::Error,
    };
    match verdict {
        Verdict::Skip => tracing::info!("{} skipped: {}", step, e),
        _ => tracing::error!("{} failed: {}", step, e),
    }
    Ok((verdict, e.to_string()))
}

/// One execution of a test run
pub struct TestRun {
    ctx: Context,
    suites: Vec<Box<dyn TestSuite>>,
    config: RunConfig,
}

impl TestRun {
    pub fn new(ctx: Context, suites: Vec<Box<dyn TestSuite>>, config: RunConfig) -> Self {
        Self {
            ctx,
            suites,
            config,
        }
    }

    /// A run on the testbed described by `config`
    pub fn from_config(config: &Config, suites: Vec<Box<dyn TestSuite>>) -> Result<Self> {
        let ctx = Context::from_config(config)?;
        Ok(Self::new(ctx, suites, config.run.clone()))
    }

    /// Execute every suite, returning what happened to each
    ///
    /// Only an internal error is returned as `Err`; the sessions still open
    /// at that point are closed first.
    pub async fn run(self) -> Result<TestRunResult> {
        let TestRun { ctx, suites, config } = self;
        tracing::info!("Running test run with SUT '{}'", ctx.sut_node.name);
        let ctx = init_ctx(ctx);
        let mut result = TestRunResult::default();

        match paths::ensure_output_dir(config.output_dir.as_deref()) {
            Ok(dir) => {
                tracing::info!("Test run output in {}", dir.display());
                result.output_dir = Some(dir);
            }
            Err(e) => {
                tracing::error!("Test run setup failed: {}", e);
                result.errors.push(e.to_string());
                Self::teardown(&ctx, &mut result).await;
                return Ok(result);
            }
        }

        let mut blocked = false;
        for suite in &suites {
            let name = suite.name();
            if blocked {
                tracing::warn!("Test suite '{}' was BLOCKED", name);
                result.suites.push(SuiteResult::blocked(name, &suite.test_cases()));
                continue;
            }

            ctx.reset_local();
            let suite_result = match run_suite(&ctx, &config, &**suite).await {
                Ok(suite_result) => suite_result,
                Err(e) => {
                    Self::teardown(&ctx, &mut result).await;
                    return Err(e);
                }
            };
            tracing::info!("Test suite '{}': {}", name, suite_result.overall());

            if suite.is_blocking() && suite_result.overall() >= Verdict::Fail {
                tracing::warn!(
                    "An error occurred within blocking suite '{}', the remaining suites will be blocked",
                    name
                );
                blocked = true;
            }
            result.suites.push(suite_result);
        }

        Self::teardown(&ctx, &mut result).await;
        Ok(result)
    }

    async fn teardown(ctx: &Arc<Context>, result: &mut TestRunResult) {
        if let Err(e) = ctx.shell_pool.pop().await {
            tracing::warn!("The environment may not have been cleaned up correctly: {}", e);
            result.errors.push(e.to_string());
        }
    }
}

async fn run_suite(ctx: &Context, config: &RunConfig, suite: &dyn TestSuite) -> Result<SuiteResult> {
    let name = suite.name();
    let mut result = SuiteResult::new(name);

    let phase = ctx.shell_pool.scope(async {
        match suite.set_up_suite(ctx).await {
            Ok(()) => {
                result.setup = Some(Verdict::Pass);
                for case in suite.test_cases() {
                    let case_result = run_case(ctx, config, suite, &case).await?;
                    result.cases.push(case_result);
                }
            }
            Err(e) => {
                let (verdict, message) = failure(&format!("test suite '{}' setup", name), e)?;
                result.setup = Some(verdict);
                let blocked = if verdict == Verdict::Skip {
                    Verdict::Skip
                } else {
                    Verdict::Block
                };
                result.cases = suite
                    .test_cases()
                    .iter()
                    .map(|case| CaseResult {
                        verdict: blocked,
                        ..CaseResult::new(case)
                    })
                    .collect();
                result.message = Some(message);
            }
        }

        result.teardown = Some(match suite.tear_down_suite(ctx).await {
            Ok(()) => Verdict::Pass,
            Err(e) => {
                let (_, message) = failure(&format!("test suite '{}' teardown", name), e)?;
                result.message.get_or_insert(message);
                Verdict::Error
            }
        });
        Ok(())
    });

    let current = LocalField::CurrentTestSuite(Some(name.to_string()));
    if let Err(e) = ctx.with_local_async([current], phase).await {
        if e.kind() == ErrorKind::Internal {
            return Err(e);
        }
        tracing::warn!("Test suite '{}' sessions were not all closed: {}", name, e);
        result.teardown = Some(Verdict::Error);
        result.message.get_or_insert(e.to_string());
    }
    Ok(result)
}

async fn run_case(
    ctx: &Context,
    config: &RunConfig,
    suite: &dyn TestSuite,
    case: &str,
) -> Result<CaseResult> {
    let mut result = CaseResult::new(case);

    let phase = ctx.shell_pool.scope(async {
        match suite.set_up_test_case(ctx, case).await {
            Ok(()) => {
                result.setup = Some(Verdict::Pass);
                execute(ctx, config, suite, &mut result).await?;
            }
            Err(e) => {
                let (verdict, message) = failure(&format!("test case '{}' setup", case), e)?;
                result.setup = Some(verdict);
                result.message = Some(message);
            }
        }

        result.teardown = Some(match suite.tear_down_test_case(ctx, case).await {
            Ok(()) => Verdict::Pass,
            Err(e) => {
                let (_, message) = failure(&format!("test case '{}' teardown", case), e)?;
                result.message.get_or_insert(message);
                Verdict::Error
            }
        });
        Ok(())
    });

    let current = LocalField::CurrentTestCase(Some(case.to_string()));
    if let Err(e) = ctx.with_local_async([current], phase).await {
        if e.kind() == ErrorKind::Internal {
            return Err(e);
        }
        tracing::warn!("Test case '{}' sessions were not all closed: {}", case, e);
        result.teardown = Some(Verdict::Error);
        result.message.get_or_insert(e.to_string());
    }
    Ok(result)
}

/// Run the case body, re-running it after failed verifications
async fn execute(
    ctx: &Context,
    config: &RunConfig,
    suite: &dyn TestSuite,
    result: &mut CaseResult,
) -> Result<()> {
    let case = result.name.clone();
    let attempts = config.re_run + 1;
    tracing::info!("Running test case '{}'", case);

    loop {
        result.attempts += 1;
        let outcome = match config.case_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, suite.run_test_case(ctx, &case))
                .await
                .unwrap_or(Err(Error::Timeout(timeout))),
            None => suite.run_test_case(ctx, &case).await,
        };

        match outcome {
            Ok(()) => {
                tracing::info!("Test case '{}' PASSED", case);
                result.verdict = Verdict::Pass;
                return Ok(());
            }
            Err(Error::VerifyFailed(reason)) if result.attempts < attempts => {
                tracing::error!("Test case '{}' FAILED: {}", case, reason);
                tracing::info!("Re-attempting, {} attempt(s) left", attempts - result.attempts);
            }
            Err(e) => {
                let (verdict, message) = failure(&format!("test case '{}'", case), e)?;
                result.verdict = verdict;
                result.message = Some(message);
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::get_ctx;
    use crate::session::SessionHandle;
    use crate::testing::{test_context, CallCount, MockSession, GLOBAL_CONTEXT};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Suite scripted per case name
    #[derive(Default)]
    struct Scripted {
        name: &'static str,
        cases: Vec<&'static str>,
        blocking: bool,
        fail_setup: Option<&'static str>,
        persist_timeout: Option<Duration>,
        fail_case_teardown: bool,
        flaky_failures: AtomicU32,
        events: Mutex<Vec<String>>,
        session_closes: Mutex<Vec<CallCount>>,
    }

    impl Scripted {
        fn new(name: &'static str, cases: &[&'static str]) -> Self {
            Self {
                name,
                cases: cases.to_vec(),
                ..Default::default()
            }
        }

        fn log(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn open_session(&self, ctx: &Context, name: &str) {
            let mock = MockSession::new().named(name);
            self.session_closes.lock().unwrap().push(mock.close_count());
            ctx.shell_pool.register(&SessionHandle::new(name, mock));
        }
    }

    #[async_trait]
    impl TestSuite for Arc<Scripted> {
        fn name(&self) -> &str {
            self.name
        }

        fn test_cases(&self) -> Vec<String> {
            self.cases.iter().map(|c| c.to_string()).collect()
        }

        fn is_blocking(&self) -> bool {
            self.blocking
        }

        async fn set_up_suite(&self, ctx: &Context) -> Result<()> {
            let local = ctx.local();
            self.log(format!(
                "setup suite={:?} timeout={}ms",
                local.current_test_suite,
                local.timeout.as_millis()
            ));
            if let Some(timeout) = self.persist_timeout {
                ctx.set_local(LocalField::Timeout(timeout));
            }
            self.open_session(ctx, "suite-shell");
            match self.fail_setup {
                Some(reason) => Err(Error::command_failed("port start all", reason)),
                None => Ok(()),
            }
        }

        async fn tear_down_suite(&self, ctx: &Context) -> Result<()> {
            self.log(format!("teardown suite depth={}", ctx.shell_pool.depth()));
            Ok(())
        }

        async fn tear_down_test_case(&self, _ctx: &Context, case: &str) -> Result<()> {
            if self.fail_case_teardown {
                return Err(Error::command_failed("port stop all", "no reply"));
            }
            self.log(format!("teardown {}", case));
            Ok(())
        }

        async fn run_test_case(&self, ctx: &Context, case: &str) -> Result<()> {
            let local = ctx.local();
            self.log(format!(
                "run {} case={:?} depth={}",
                case,
                local.current_test_case,
                ctx.shell_pool.depth()
            ));
            self.open_session(ctx, case);
            match case {
                "test_fail" => Err(Error::verify_failed("no packets received")),
                "test_skip" => Err(Error::skipped("no crypto device")),
                "test_error" => Err(Error::command_failed("start", "link down")),
                "test_internal" => Err(Error::Internal("bad encoder table".to_string())),
                "test_hang" => std::future::pending().await,
                "test_flaky" => {
                    if self.flaky_failures.fetch_sub(1, Ordering::SeqCst) > 0 {
                        Err(Error::verify_failed("flaky"))
                    } else {
                        Ok(())
                    }
                }
                _ => Ok(()),
            }
        }
    }

    fn run_with(suites: &[Arc<Scripted>], config: RunConfig) -> TestRun {
        let suites = suites
            .iter()
            .map(|s| Box::new(Arc::clone(s)) as Box<dyn TestSuite>)
            .collect();
        TestRun::new(test_context(), suites, config)
    }

    fn run_config(dir: &tempfile::TempDir) -> RunConfig {
        RunConfig {
            output_dir: Some(dir.path().join("output")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_phases_and_verdicts() {
        let _lock = GLOBAL_CONTEXT.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let suite = Arc::new(Scripted::new(
            "pmd",
            &["test_pass", "test_fail", "test_skip", "test_error"],
        ));

        let result = run_with(&[Arc::clone(&suite)], run_config(&dir))
            .run()
            .await
            .unwrap();

        let pmd = result.suite("pmd").unwrap();
        assert_eq!(pmd.setup, Some(Verdict::Pass));
        assert_eq!(pmd.teardown, Some(Verdict::Pass));
        let verdicts: Vec<_> = pmd.cases.iter().map(|c| c.verdict).collect();
        assert_eq!(
            verdicts,
            [Verdict::Pass, Verdict::Fail, Verdict::Skip, Verdict::Error]
        );
        assert_eq!(
            pmd.case("test_fail").unwrap().message.as_deref(),
            Some("Verification failed: no packets received")
        );
        assert_eq!(result.overall(), Verdict::Error);
        assert_eq!(result.output_dir, Some(dir.path().join("output")));
        assert!(dir.path().join("output").is_dir());

        let events = suite.events();
        assert_eq!(events[0], "setup suite=Some(\"pmd\") timeout=15000ms");
        assert_eq!(events[1], "run test_pass case=Some(\"test_pass\") depth=2");
        assert_eq!(events.last().unwrap(), "teardown suite depth=1");

        // every case and suite level closed its sessions
        let closes = suite.session_closes.lock().unwrap();
        assert_eq!(closes.len(), 5);
        assert!(closes.iter().all(|c| c.get() == 1));
        let ctx = get_ctx().unwrap();
        assert!(ctx.shell_pool.is_empty());
        assert_eq!(ctx.shell_pool.depth(), 0);
        assert_eq!(ctx.local().current_test_suite, None);
    }

    #[tokio::test]
    async fn test_local_context_reset_at_suite_start() {
        let _lock = GLOBAL_CONTEXT.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let first = Arc::new(Scripted {
            persist_timeout: Some(Duration::from_secs(1)),
            ..Scripted::new("first", &["test_pass"])
        });
        let second = Arc::new(Scripted::new("second", &["test_pass"]));

        run_with(&[first, Arc::clone(&second)], run_config(&dir))
            .run()
            .await
            .unwrap();

        // the first suite's setting does not reach the second suite
        assert_eq!(second.events()[0], "setup suite=Some(\"second\") timeout=15000ms");
        assert_eq!(get_ctx().unwrap().local().timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_failed_verification_is_re_run() {
        let _lock = GLOBAL_CONTEXT.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let suite = Arc::new(Scripted::new("pmd", &["test_flaky"]));
        suite.flaky_failures.store(2, Ordering::SeqCst);
        let config = RunConfig {
            re_run: 2,
            ..run_config(&dir)
        };

        let result = run_with(&[Arc::clone(&suite)], config).run().await.unwrap();

        let case = result.suite("pmd").unwrap().case("test_flaky").unwrap();
        assert_eq!(case.verdict, Verdict::Pass);
        assert_eq!(case.attempts, 3);
    }

    #[tokio::test]
    async fn test_case_timeout_closes_case_sessions() {
        let _lock = GLOBAL_CONTEXT.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let suite = Arc::new(Scripted::new("pmd", &["test_hang", "test_pass"]));
        let config = RunConfig {
            case_timeout_secs: Some(1),
            ..run_config(&dir)
        };

        let result = run_with(&[Arc::clone(&suite)], config).run().await.unwrap();

        let pmd = result.suite("pmd").unwrap();
        let hang = pmd.case("test_hang").unwrap();
        assert_eq!(hang.verdict, Verdict::Error);
        assert_eq!(hang.teardown, Some(Verdict::Pass));
        assert_eq!(pmd.case("test_pass").unwrap().verdict, Verdict::Pass);
        assert!(suite.session_closes.lock().unwrap().iter().all(|c| c.get() == 1));
    }

    #[tokio::test]
    async fn test_suite_setup_error_blocks_cases_and_runs_teardown() {
        let _lock = GLOBAL_CONTEXT.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let suite = Arc::new(Scripted {
            fail_setup: Some("timeout"),
            ..Scripted::new("pmd", &["test_pass"])
        });

        let result = run_with(&[Arc::clone(&suite)], run_config(&dir)).run().await.unwrap();

        let pmd = result.suite("pmd").unwrap();
        assert_eq!(pmd.setup, Some(Verdict::Error));
        assert_eq!(pmd.teardown, Some(Verdict::Pass));
        assert_eq!(pmd.case("test_pass").unwrap().verdict, Verdict::Block);
        assert!(!suite.events().iter().any(|e| e.starts_with("run ")));
        assert_eq!(suite.session_closes.lock().unwrap()[0].get(), 1);
    }

    #[tokio::test]
    async fn test_case_teardown_error_is_recorded() {
        let _lock = GLOBAL_CONTEXT.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let suite = Arc::new(Scripted {
            fail_case_teardown: true,
            ..Scripted::new("pmd", &["test_pass"])
        });

        let result = run_with(&[suite], run_config(&dir)).run().await.unwrap();

        let case = result.suite("pmd").unwrap().case("test_pass").unwrap();
        assert_eq!(case.verdict, Verdict::Pass);
        assert_eq!(case.teardown, Some(Verdict::Error));
        assert_eq!(case.overall(), Verdict::Error);
    }

    #[tokio::test]
    async fn test_blocking_suite_failure_blocks_later_suites() {
        let _lock = GLOBAL_CONTEXT.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let smoke = Arc::new(Scripted {
            blocking: true,
            ..Scripted::new("smoke", &["test_fail"])
        });
        let later = Arc::new(Scripted::new("later", &["test_pass", "test_pass_too"]));

        let result = run_with(&[smoke, Arc::clone(&later)], run_config(&dir))
            .run()
            .await
            .unwrap();

        let blocked = result.suite("later").unwrap();
        assert_eq!(blocked.overall(), Verdict::Block);
        assert_eq!(blocked.cases.len(), 2);
        assert!(later.events().is_empty());
    }

    #[tokio::test]
    async fn test_internal_error_ends_run() {
        let _lock = GLOBAL_CONTEXT.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let first = Arc::new(Scripted::new("first", &["test_internal", "test_pass"]));
        let second = Arc::new(Scripted::new("second", &["test_pass"]));

        let err = run_with(&[Arc::clone(&first), Arc::clone(&second)], run_config(&dir))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Internal(_)));
        assert!(second.events().is_empty());
        assert!(first.session_closes.lock().unwrap().iter().all(|c| c.get() == 1));
        assert!(get_ctx().unwrap().shell_pool.is_empty());
    }

    #[tokio::test]
    async fn test_unusable_output_dir_skips_suites() {
        let _lock = GLOBAL_CONTEXT.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("taken");
        std::fs::write(&taken, "").unwrap();
        let suite = Arc::new(Scripted::new("pmd", &["test_pass"]));
        let config = RunConfig {
            output_dir: Some(taken),
            ..Default::default()
        };

        let result = run_with(&[Arc::clone(&suite)], config).run().await.unwrap();

        assert_eq!(result.errors.len(), 1);
        assert!(result.suites.is_empty());
        assert_eq!(result.overall(), Verdict::Error);
        assert!(suite.events().is_empty());
    }
}
