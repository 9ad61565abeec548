//! Results recorded while a test run executes

use std::fmt;
use std::path::PathBuf;

/// Outcome of a step or a test unit, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verdict {
    Pass,
    Skip,
    Block,
    Fail,
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Pass => "PASS",
            Verdict::Skip => "SKIP",
            Verdict::Block => "BLOCK",
            Verdict::Fail => "FAIL",
            Verdict::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Result of one test case
#[derive(Debug, Clone, PartialEq)]
pub struct CaseResult {
    pub name: String,
    /// `None` when setup never ran
    pub setup: Option<Verdict>,
    pub verdict: Verdict,
    pub teardown: Option<Verdict>,
    /// Executions of the case body, re-runs included
    pub attempts: u32,
    /// Reason of the last failure, skip or error
    pub message: Option<String>,
}

impl CaseResult {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            setup: None,
            verdict: Verdict::Block,
            teardown: None,
            attempts: 0,
            message: None,
        }
    }

    /// Worst of the setup, execution and teardown verdicts
    pub fn overall(&self) -> Verdict {
        [self.setup, Some(self.verdict), self.teardown]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(self.verdict)
    }
}

/// Result of one test suite and its cases
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteResult {
    pub name: String,
    pub setup: Option<Verdict>,
    pub teardown: Option<Verdict>,
    pub cases: Vec<CaseResult>,
    pub message: Option<String>,
}

impl SuiteResult {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            setup: None,
            teardown: None,
            cases: Vec::new(),
            message: None,
        }
    }

    /// A suite that never ran because an earlier blocking suite failed
    pub(crate) fn blocked(name: &str, cases: &[String]) -> Self {
        let mut result = Self::new(name);
        result.setup = Some(Verdict::Block);
        result.cases = cases
            .iter()
            .map(|case| CaseResult::new(case))
            .collect();
        result
    }

    pub fn case(&self, name: &str) -> Option<&CaseResult> {
        self.cases.iter().find(|case| case.name == name)
    }

    /// Worst verdict of the suite steps and all its cases
    pub fn overall(&self) -> Verdict {
        self.cases
            .iter()
            .map(CaseResult::overall)
            .chain(self.setup)
            .chain(self.teardown)
            .max()
            .unwrap_or(Verdict::Pass)
    }
}

/// Result of a whole test run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestRunResult {
    pub output_dir: Option<PathBuf>,
    pub suites: Vec<SuiteResult>,
    /// Errors of the run setup and teardown
    pub errors: Vec<String>,
}

impl TestRunResult {
    pub fn suite(&self, name: &str) -> Option<&SuiteResult> {
        self.suites.iter().find(|suite| suite.name == name)
    }

    pub fn overall(&self) -> Verdict {
        let run = if self.errors.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Error
        };
        self.suites
            .iter()
            .map(SuiteResult::overall)
            .fold(run, Verdict::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_is_worst_verdict() {
        let mut case = CaseResult::new("test_a");
        case.setup = Some(Verdict::Pass);
        case.verdict = Verdict::Pass;
        case.teardown = Some(Verdict::Error);
        assert_eq!(case.overall(), Verdict::Error);

        let mut suite = SuiteResult::new("suite");
        suite.setup = Some(Verdict::Pass);
        suite.teardown = Some(Verdict::Pass);
        assert_eq!(suite.overall(), Verdict::Pass);
        suite.cases.push(case);
        assert_eq!(suite.overall(), Verdict::Error);
    }

    #[test]
    fn test_blocked_suite() {
        let suite = SuiteResult::blocked("suite", &["a".to_string(), "b".to_string()]);
        assert_eq!(suite.overall(), Verdict::Block);
        assert!(suite.cases.iter().all(|c| c.verdict == Verdict::Block));
        assert_eq!(suite.case("b").map(|c| c.attempts), Some(0));
    }

    #[test]
    fn test_run_errors_count() {
        let mut run = TestRunResult::default();
        assert_eq!(run.overall(), Verdict::Pass);
        run.errors.push("teardown failed".to_string());
        assert_eq!(run.overall(), Verdict::Error);
        assert_eq!(Verdict::Fail.to_string(), "FAIL");
    }
}
