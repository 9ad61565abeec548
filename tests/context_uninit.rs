//! Accessing the runtime context before a run installs it
//!
//! Kept in its own test binary: every other integration test installs a
//! process-wide context.

use dts::context::get_ctx;
use dts::params::eal::EalParams;
use dts::testing::MockSession;
use dts::testpmd::{TestPmd, TestPmdParams};
use dts::{Error, ErrorKind};

#[test]
fn test_get_ctx_before_init_fails() {
    let err = get_ctx().unwrap_err();
    assert!(matches!(err, Error::ContextNotInitialized));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn test_launch_without_context_creates_no_session() {
    let mock = MockSession::new();
    let starts = mock.start_count();

    let result = TestPmd::launch(EalParams::default(), TestPmdParams::default(), |_| mock).await;

    assert!(matches!(result, Err(Error::ContextNotInitialized)));
    assert_eq!(starts.get(), 0);
}
