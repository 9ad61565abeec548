//! Testpmd interactive application
//!
//! [`TestPmd`] launches `dpdk-testpmd` in interactive mode through a session
//! registered in the current level of the context's session pool, and wraps
//! the commands test suites use. Command output is decoded into the types of
//! [`types`].

pub mod config;
pub mod types;

pub use config::{
    Event, ForwardingMode, PortTopology, SimpleForwardingMode, TestPmdParams,
};
pub use types::{
    extract_verbose_output, PortFlowCtrl, PortInfo, PortStats, QueueInfo, RxQueueState, RxqInfo,
    TxqInfo, VerbosePacket,
};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{Error, Result};
use crate::context::{get_ctx, Context};
use crate::params::eal::{compute_eal_params, DpdkAppParams, EalParams};
use crate::params::ParamSet;
use crate::parser::TextParser;
use crate::session::{Session, SessionHandle};
use crate::testbed::LinkTopology;

/// Prompt printed by testpmd once it accepts commands
pub const TESTPMD_PROMPT: &str = "testpmd>";

/// Location of the binary inside a DPDK build directory
pub const TESTPMD_PATH: &str = "app/dpdk-testpmd";

async fn bounded<T>(timeout: Duration, work: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, work)
        .await
        .map_err(|_| Error::Timeout(timeout))?
}

fn rx_or_tx(is_rx_queue: bool) -> &'static str {
    if is_rx_queue {
        "rxq"
    } else {
        "txq"
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// A running testpmd instance
pub struct TestPmd {
    ctx: Arc<Context>,
    session: SessionHandle,
    ports_started: bool,
}

impl TestPmd {
    /// Launch testpmd on the SUT of the process-wide context
    pub async fn launch<S, F>(eal: EalParams, params: TestPmdParams, factory: F) -> Result<Self>
    where
        S: Session + 'static,
        F: FnOnce(String) -> S,
    {
        Self::launch_with(get_ctx()?, eal, params, factory).await
    }

    /// Launch testpmd on the SUT of `ctx`
    ///
    /// `factory` turns the full command line into a session. The session is
    /// registered in the current pool level before it starts, so a failed or
    /// timed-out start is still cleaned up when that level is popped.
    pub async fn launch_with<S, F>(
        ctx: Arc<Context>,
        eal: EalParams,
        mut params: TestPmdParams,
        factory: F,
    ) -> Result<Self>
    where
        S: Session + 'static,
        F: FnOnce(String) -> S,
    {
        // paired forwarding needs an even number of ports
        if ctx.topology.kind() == LinkTopology::OneLink
            && params.port_topology == Some(PortTopology::Paired)
        {
            params.port_topology = Some(PortTopology::Loop);
        }

        let ports_started = !params.disable_device_start;
        let app = DpdkAppParams {
            eal: compute_eal_params(&ctx, eal)?,
            app: params,
        };
        let command = format!(
            "{} {}",
            ctx.dpdk.app_path(TESTPMD_PATH).display(),
            app.render()
        );
        tracing::info!("Launching testpmd: {}", command);

        let session = SessionHandle::new("testpmd", factory(command));
        ctx.shell_pool.register(&session);
        let timeout = ctx.local().timeout;
        bounded(timeout, session.start(TESTPMD_PROMPT)).await?;

        Ok(Self {
            ctx,
            session,
            ports_started,
        })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn ports_started(&self) -> bool {
        self.ports_started
    }

    /// Send a raw command, bounded by the current timeout
    pub async fn send(&self, command: &str) -> Result<String> {
        tracing::debug!("testpmd> {}", command);
        let timeout = self.ctx.local().timeout;
        bounded(timeout, self.session.send(command)).await
    }

    async fn require_started_ports(&mut self) -> Result<()> {
        if !self.ports_started {
            tracing::debug!("Ports need to be started to continue");
            self.start_all_ports(true).await?;
        }
        Ok(())
    }

    async fn require_stopped_ports(&mut self) -> Result<()> {
        if self.ports_started {
            tracing::debug!("Ports need to be stopped to continue");
            self.stop_all_ports(true).await?;
        }
        Ok(())
    }

    /// Start packet forwarding
    ///
    /// With `verify`, a second `start` must report forwarding as already
    /// started.
    pub async fn start(&mut self, verify: bool) -> Result<()> {
        self.require_started_ports().await?;
        self.send("start").await?;
        if verify {
            let output = self.send("start").await?;
            if !output.contains("Packet forwarding already started") {
                tracing::debug!("Failed to start packet forwarding:\n{}", output);
                return Err(Error::command_failed(
                    "start",
                    "testpmd failed to start packet forwarding",
                ));
            }
        }
        Ok(())
    }

    /// Stop packet forwarding, returning the forwarding statistics it printed
    pub async fn stop(&self, verify: bool) -> Result<String> {
        let output = self.send("stop").await?;
        if verify
            && !output.contains("Done.")
            && !output.contains("Packet forwarding not started")
        {
            tracing::debug!("Failed to stop packet forwarding:\n{}", output);
            return Err(Error::command_failed(
                "stop",
                "testpmd failed to stop packet forwarding",
            ));
        }
        Ok(output)
    }

    pub async fn start_all_ports(&mut self, verify: bool) -> Result<()> {
        let output = self.send("port start all").await?;
        if verify && !output.trim().ends_with("Done") {
            return Err(Error::command_failed("port start all", "ports were not started"));
        }
        self.ports_started = true;
        Ok(())
    }

    pub async fn stop_all_ports(&mut self, verify: bool) -> Result<()> {
        let output = self.send("port stop all").await?;
        if verify && !output.trim().ends_with("Done") {
            return Err(Error::command_failed("port stop all", "ports were not stopped"));
        }
        self.ports_started = false;
        Ok(())
    }

    /// Set the number of RX and TX queues of every port
    pub async fn set_ports_queues(&mut self, number_of: u32) -> Result<()> {
        if number_of == 0 {
            return Err(Error::Internal(
                "the number of queues must be positive".to_string(),
            ));
        }
        self.require_stopped_ports().await?;
        self.send(&format!("port config all rxq {}", number_of)).await?;
        self.send(&format!("port config all txq {}", number_of)).await?;
        Ok(())
    }

    pub async fn set_forward_mode(&self, mode: SimpleForwardingMode, verify: bool) -> Result<()> {
        let command = format!("set fwd {}", mode);
        let output = self.send(&command).await?;
        if verify && !output.contains(&format!("Set {} packet forwarding mode", mode)) {
            return Err(Error::command_failed(&command, "forwarding mode was not set"));
        }
        Ok(())
    }

    pub async fn show_port_info_all(&self) -> Result<Vec<PortInfo>> {
        let output = self.send("show port info all").await?;
        types::split_port_info(&output)?
            .iter()
            .map(|block| PortInfo::parse(block))
            .collect()
    }

    pub async fn show_port_info(&self, port_id: u16) -> Result<PortInfo> {
        let command = format!("show port info {}", port_id);
        let output = self.send(&command).await?;
        if output.trim_start().starts_with("Invalid port") {
            return Err(Error::command_failed(&command, "invalid port given"));
        }
        PortInfo::parse(&output)
    }

    /// Statistics of every port, along with the raw output
    pub async fn show_port_stats_all(&self) -> Result<(Vec<PortStats>, String)> {
        let output = self.send("show port stats all").await?;
        let stats = types::split_port_stats(&output)?
            .into_iter()
            .map(PortStats::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok((stats, output))
    }

    pub async fn show_port_stats(&self, port_id: u16) -> Result<PortStats> {
        let command = format!("show port stats {}", port_id);
        let output = self.send(&command).await?;
        if output.trim_start().starts_with("Invalid port") {
            return Err(Error::command_failed(&command, "invalid port given"));
        }
        PortStats::parse(&output)
    }

    /// Flow control settings, or `None` when the port does not support them
    pub async fn show_port_flow_info(&self, port: u16) -> Result<Option<PortFlowCtrl>> {
        let output = self.send(&format!("show port {} flow_ctrl", port)).await?;
        if output.contains("Flow control infos") {
            PortFlowCtrl::parse(&output).map(Some)
        } else {
            Ok(None)
        }
    }

    pub async fn set_flow_control(&self, port: u16, ctrl: &PortFlowCtrl, verify: bool) -> Result<()> {
        let command = format!("set flow_ctrl {} {}", ctrl, port);
        let output = self.send(&command).await?;
        if verify && !output.trim().is_empty() {
            return Err(Error::command_failed(&command, output.trim()));
        }
        Ok(())
    }

    /// Turn promiscuous mode on or off; `verify` checks it through `show port info`
    pub async fn set_promisc(&self, port: u16, enable: bool, verify: bool) -> Result<()> {
        let command = format!("set promisc {} {}", port, on_off(enable));
        let output = self.send(&command).await?;
        if verify && self.show_port_info(port).await?.is_promiscuous_mode_enabled != enable {
            tracing::debug!("Failed to set promiscuous mode on port {}:\n{}", port, output);
            return Err(Error::command_failed(&command, "promiscuous mode was not set"));
        }
        Ok(())
    }

    pub async fn set_verbose(&self, level: u32, verify: bool) -> Result<()> {
        let command = format!("set verbose {}", level);
        let output = self.send(&command).await?;
        if verify && !output.contains("Change verbose level") {
            return Err(Error::command_failed(&command, "verbose level was not changed"));
        }
        Ok(())
    }

    pub async fn clear_port_stats(&self, port_id: u16, verify: bool) -> Result<()> {
        let command = format!("clear port stats {}", port_id);
        let output = self.send(&command).await?;
        if verify && !output.contains(&format!("NIC statistics for port {} cleared", port_id)) {
            return Err(Error::command_failed(&command, "statistics were not cleared"));
        }
        Ok(())
    }

    pub async fn rxq_info(&self, port_id: u16, queue_id: u16) -> Result<RxqInfo> {
        let output = self
            .send(&format!("show rxq info {} {}", port_id, queue_id))
            .await?;
        RxqInfo::parse(&output)
    }

    pub async fn txq_info(&self, port_id: u16, queue_id: u16) -> Result<TxqInfo> {
        let output = self
            .send(&format!("show txq info {} {}", port_id, queue_id))
            .await?;
        TxqInfo::parse(&output)
    }

    /// State shared by RX and TX queues
    pub async fn queue_info(&self, port_id: u16, queue_id: u16, is_rx_queue: bool) -> Result<QueueInfo> {
        let output = self
            .send(&format!("show {} info {} {}", rx_or_tx(is_rx_queue), port_id, queue_id))
            .await?;
        QueueInfo::parse(&output)
    }

    async fn set_queue_state(
        &self,
        port_id: u16,
        queue_id: u16,
        is_rx_queue: bool,
        start: bool,
        verify: bool,
    ) -> Result<()> {
        let action = if start { "start" } else { "stop" };
        let command = format!("port {} {} {} {}", port_id, rx_or_tx(is_rx_queue), queue_id, action);
        let output = self.send(&command).await?;
        if verify {
            let started = self.queue_info(port_id, queue_id, is_rx_queue).await?.is_queue_started;
            if started != start {
                tracing::debug!("Failed to {} queue:\n{}", action, output);
                return Err(Error::command_failed(&command, "queue state did not change"));
            }
        }
        Ok(())
    }

    pub async fn start_port_queue(
        &self,
        port_id: u16,
        queue_id: u16,
        is_rx_queue: bool,
        verify: bool,
    ) -> Result<()> {
        self.set_queue_state(port_id, queue_id, is_rx_queue, true, verify)
            .await
    }

    pub async fn stop_port_queue(
        &self,
        port_id: u16,
        queue_id: u16,
        is_rx_queue: bool,
        verify: bool,
    ) -> Result<()> {
        self.set_queue_state(port_id, queue_id, is_rx_queue, false, verify)
            .await
    }

    /// Stop forwarding, quit testpmd and release the session
    ///
    /// The session leaves the pool even when quitting or closing fails.
    pub async fn close(self) -> Result<()> {
        let quit = match self.stop(false).await {
            Ok(_) => self.send("quit").await.map(drop),
            Err(e) => Err(e),
        };
        let closed = self.session.close().await;
        self.ctx.shell_pool.unregister(&self.session);

        if let Err(e) = &quit {
            tracing::warn!("testpmd did not quit cleanly: {}", e);
        }
        quit.and(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LocalField;
    use crate::testbed::Topology;
    use crate::testing::{test_context, MockSession, TEST_TIMESTAMP};

    async fn launch(ctx: &Arc<Context>, mock: MockSession) -> TestPmd {
        TestPmd::launch_with(
            Arc::clone(ctx),
            EalParams::default(),
            TestPmdParams::default(),
            |_| mock,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_launch_composes_command_and_registers() {
        let ctx = Arc::new(test_context());
        let mut command = String::new();

        let testpmd = TestPmd::launch_with(
            Arc::clone(&ctx),
            EalParams::default(),
            TestPmdParams::default(),
            |cmd| {
                command = cmd;
                MockSession::new()
            },
        )
        .await
        .unwrap();

        assert!(command.starts_with("/opt/dpdk/build/app/dpdk-testpmd -l "));
        assert!(command.ends_with(&format!(
            "-n 4 --file-prefix=dpdk_{} -a 0000:00:08.0 -a 0000:00:08.1 \
             -- -i --port-topology=paired --mask-event=intr_lsc",
            TEST_TIMESTAMP
        )));
        assert!(ctx.shell_pool.contains(testpmd.session()));
        assert!(testpmd.ports_started());
    }

    #[tokio::test]
    async fn test_one_link_topology_uses_loop() {
        let mut ctx = test_context();
        let link = ctx.topology.links()[0].clone();
        ctx.topology = Topology::from_port_links([link]);
        let ctx = Arc::new(ctx);
        let mut command = String::new();

        TestPmd::launch_with(ctx, EalParams::default(), TestPmdParams::default(), |cmd| {
            command = cmd;
            MockSession::new()
        })
        .await
        .unwrap();

        assert!(command.contains("--port-topology=loop"));
        assert!(command.contains("-a 0000:00:08.0 --"));
    }

    #[tokio::test]
    async fn test_start_timeout_leaves_session_registered() {
        let ctx = Arc::new(test_context());
        let mock = MockSession::new().hang_on_start();
        let closes = mock.close_count();

        let result = ctx
            .with_local_async(
                [LocalField::Timeout(Duration::from_millis(20))],
                TestPmd::launch_with(
                    Arc::clone(&ctx),
                    EalParams::default(),
                    TestPmdParams::default(),
                    |_| mock,
                ),
            )
            .await;

        assert!(matches!(result, Err(Error::Timeout(t)) if t == Duration::from_millis(20)));
        assert_eq!(ctx.shell_pool.len(), 1);

        ctx.shell_pool.pop().await.unwrap();
        assert_eq!(closes.get(), 1);
        assert!(ctx.shell_pool.is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_is_closed_by_pool() {
        let ctx = Arc::new(test_context());
        let mock = MockSession::new().fail_start("no hugepages");
        let closes = mock.close_count();

        let result = TestPmd::launch_with(
            Arc::clone(&ctx),
            EalParams::default(),
            TestPmdParams::default(),
            |_| mock,
        )
        .await;

        assert!(matches!(result, Err(Error::SessionStartFailed { .. })));
        ctx.shell_pool.pop().await.unwrap();
        assert_eq!(closes.get(), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop_verification() {
        let ctx = Arc::new(test_context());
        let mock = MockSession::new()
            .respond("start", "Packet forwarding already started")
            .respond("stop", "Telling cores to stop...\nDone.");
        let sent = mock.sent();
        let mut testpmd = launch(&ctx, mock).await;

        testpmd.start(true).await.unwrap();
        assert!(testpmd.stop(true).await.unwrap().contains("Done."));
        assert_eq!(sent.all(), vec!["start", "start", "stop"]);

        let mut silent = launch(&ctx, MockSession::new()).await;
        assert!(matches!(
            silent.start(true).await,
            Err(Error::CommandFailed { ref command, .. }) if command == "start"
        ));
        assert!(silent.stop(true).await.is_err());
        assert!(silent.stop(false).await.is_ok());
    }

    #[tokio::test]
    async fn test_start_starts_stopped_ports_first() {
        let ctx = Arc::new(test_context());
        let mock = MockSession::new().respond("port start all", "Configuring Port 0\nDone\n");
        let sent = mock.sent();
        let params = TestPmdParams {
            disable_device_start: true,
            ..Default::default()
        };

        let mut testpmd = TestPmd::launch_with(ctx, EalParams::default(), params, |_| mock)
            .await
            .unwrap();
        assert!(!testpmd.ports_started());

        testpmd.start(false).await.unwrap();
        assert!(testpmd.ports_started());
        assert_eq!(sent.all(), vec!["port start all", "start"]);
    }

    #[tokio::test]
    async fn test_set_ports_queues() {
        let ctx = Arc::new(test_context());
        let mock = MockSession::new().respond("port stop all", "Stopping ports...\nDone");
        let sent = mock.sent();
        let mut testpmd = launch(&ctx, mock).await;

        assert!(matches!(testpmd.set_ports_queues(0).await, Err(Error::Internal(_))));
        testpmd.set_ports_queues(4).await.unwrap();
        assert!(!testpmd.ports_started());
        assert_eq!(
            sent.all(),
            vec!["port stop all", "port config all rxq 4", "port config all txq 4"]
        );
    }

    #[tokio::test]
    async fn test_show_port_stats() {
        let ctx = Arc::new(test_context());
        let stats = "\
  ######################## NIC statistics for port 1  ########################
  RX-packets: 7          RX-missed: 0          RX-bytes:  448
  RX-errors: 0
  RX-nombuf:  0
  TX-packets: 7          TX-errors: 0          TX-bytes:  448

  Throughput (since last show)
  Rx-pps:            0          Rx-bps:            0
  Tx-pps:            0          Tx-bps:            0
  ############################################################################
";
        let mock = MockSession::new()
            .respond("show port stats 1", stats)
            .respond("show port stats 5", "Invalid port 5\nValid port range is [0-1]")
            .respond("show port stats all", stats.replace('\n', "\r\n"));
        let testpmd = launch(&ctx, mock).await;

        let port = testpmd.show_port_stats(1).await.unwrap();
        assert_eq!((port.port_id, port.rx_packets, port.tx_bytes), (1, 7, 448));
        assert!(matches!(
            testpmd.show_port_stats(5).await,
            Err(Error::CommandFailed { .. })
        ));

        let (all, raw) = testpmd.show_port_stats_all().await.unwrap();
        assert_eq!(all, vec![port]);
        assert!(raw.contains("NIC statistics"));
    }

    #[tokio::test]
    async fn test_flow_ctrl_support() {
        let ctx = Arc::new(test_context());
        let mock = MockSession::new()
            .respond(
                "show port 0 flow_ctrl",
                "********* Flow control infos for port 0  *********\nRx pause: on\nAutoneg: on\n",
            )
            .respond("show port 1 flow_ctrl", "Function not supported");
        let sent = mock.sent();
        let testpmd = launch(&ctx, mock).await;

        let ctrl = testpmd.show_port_flow_info(0).await.unwrap().unwrap();
        assert!(ctrl.rx && ctrl.autoneg && !ctrl.tx);
        assert_eq!(testpmd.show_port_flow_info(1).await.unwrap(), None);

        testpmd.set_flow_control(0, &ctrl, true).await.unwrap();
        assert_eq!(
            sent.all().last().map(String::as_str),
            Some("set flow_ctrl rx on tx off 0 0 0 0 mac_ctrl_frame_fwd off autoneg on 0")
        );
    }

    #[tokio::test]
    async fn test_verified_setters() {
        let ctx = Arc::new(test_context());
        let mock = MockSession::new()
            .respond("set fwd mac", "Set mac packet forwarding mode")
            .respond("set verbose 1", "Change verbose level from 0 to 1")
            .respond("clear port stats 0", "\n  NIC statistics for port 0 cleared\n")
            .respond("show port info 0", "Infos for port 0\nPromiscuous mode: disabled\n");
        let testpmd = launch(&ctx, mock).await;

        testpmd.set_forward_mode(SimpleForwardingMode::Mac, true).await.unwrap();
        assert!(testpmd.set_forward_mode(SimpleForwardingMode::Io, true).await.is_err());
        testpmd.set_verbose(1, true).await.unwrap();
        testpmd.clear_port_stats(0, true).await.unwrap();
        assert!(testpmd.clear_port_stats(1, true).await.is_err());
        // the canned port info lacks required fields
        assert!(matches!(
            testpmd.set_promisc(0, true, true).await,
            Err(Error::MissingField { type_name: "PortInfo", .. })
        ));
        testpmd.set_promisc(0, true, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_stop_verification() {
        let ctx = Arc::new(test_context());
        let info = "\
RX prefetch threshold: 0
RX host threshold: 0
RX writeback threshold: 0
RX free threshold: 32
Number of RXDs: 512
Rx queue state: stopped
";
        let mock = MockSession::new().respond("show rxq info 0 1", info);
        let testpmd = launch(&ctx, mock).await;

        testpmd.stop_port_queue(0, 1, true, true).await.unwrap();
        assert!(testpmd.start_port_queue(0, 1, true, true).await.is_err());
        assert_eq!(testpmd.rxq_info(0, 1).await.unwrap().queue.ring_size, 512);
    }

    #[tokio::test]
    async fn test_close_quits_and_unregisters() {
        let ctx = Arc::new(test_context());
        let mock = MockSession::new();
        let sent = mock.sent();
        let closes = mock.close_count();
        let testpmd = launch(&ctx, mock).await;

        testpmd.close().await.unwrap();
        assert_eq!(sent.all(), vec!["stop", "quit"]);
        assert_eq!(closes.get(), 1);
        assert!(ctx.shell_pool.is_empty());
    }

    #[tokio::test]
    async fn test_close_failure_still_unregisters() {
        let ctx = Arc::new(test_context());
        let testpmd = launch(&ctx, MockSession::new().fail_close("broken pipe")).await;

        let err = testpmd.close().await.unwrap_err();
        assert!(matches!(err, Error::SessionCloseFailed { .. }));
        assert!(ctx.shell_pool.is_empty());
    }
}
