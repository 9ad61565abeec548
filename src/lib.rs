//! DTS framework core - building blocks of a DPDK test suite
//!
//! The crate provides what test suites and application wrappers are built
//! on: command-line encoding of typed parameter sets ([`params`]), decoding
//! of command output into typed records ([`parser`]), a stack-scoped pool of
//! interactive sessions ([`session`]) and a process-wide runtime context with
//! scoped overrides ([`context`]). [`testpmd`] uses all of them to drive
//! DPDK's testpmd application, and [`run`] drives test suites through their
//! phases on top of the context and the pool.

pub mod common;
pub mod context;
pub mod params;
pub mod parser;
pub mod run;
pub mod session;
pub mod testbed;
pub mod testing;
pub mod testpmd;

// Re-export commonly used types
pub use common::{Error, ErrorKind, Result};
pub use context::{get_ctx, init_ctx, Context, LocalContext, LocalField};
pub use params::{ParamSet, RawParams};
pub use parser::{Fields, TextParser};
pub use run::{TestRun, TestRunResult, TestSuite, Verdict};
pub use session::{Session, SessionHandle, SessionPool};
