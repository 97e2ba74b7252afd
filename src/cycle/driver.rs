//! Periodic driver: one dial → request → response → close cycle per interval

use crate::exchange::{await_first_byte, drain_and_emit, DrainPolicy, WaitOutcome};
use crate::operator::OperatorSink;
use crate::transport::{close, DialError, TransportConnector, TransportStream};
use anyhow::Result;
use probe_shared::{
    codec, defaults, diagnosis,
    state_machine::{CycleEvent, CycleStateMachine, TransitionResult},
    CycleOutcome, Endpoint, StatusPayload,
};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Configuration for the probe
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Device identifier carried in the payload
    pub device_id: String,
    /// Peer to report to
    pub endpoint: Endpoint,
    /// Network to join
    pub ssid: String,
    /// Shared secret of the network
    pub password: String,
    /// Upper bound on one TCP connect attempt
    pub connect_timeout: Duration,
    /// How long to wait for the first response byte
    pub response_timeout: Duration,
    /// Idle delay between cycles
    pub cycle_interval: Duration,
    /// Poll period while associating
    pub association_poll: Duration,
    /// When response draining stops
    pub drain_policy: DrainPolicy,
    /// Stop after this many cycles (None: run forever)
    pub max_cycles: Option<u64>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            device_id: defaults::DEVICE_ID.into(),
            endpoint: Endpoint::default(),
            ssid: String::new(),
            password: String::new(),
            connect_timeout: Duration::from_millis(defaults::CONNECT_TIMEOUT_MS),
            response_timeout: Duration::from_millis(defaults::RESPONSE_TIMEOUT_MS),
            cycle_interval: Duration::from_millis(defaults::CYCLE_INTERVAL_MS),
            association_poll: Duration::from_millis(defaults::ASSOCIATION_POLL_MS),
            drain_policy: DrainPolicy::BestEffort,
            max_cycles: None,
        }
    }
}

/// Count of outcomes across cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleTally {
    pub responded: u64,
    pub timed_out: u64,
    pub connect_failed: u64,
}

impl CycleTally {
    pub fn record(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Responded => self.responded += 1,
            CycleOutcome::TimedOut => self.timed_out += 1,
            CycleOutcome::ConnectFailed => self.connect_failed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.responded + self.timed_out + self.connect_failed
    }
}

/// Runs test cycles against the configured endpoint
pub struct CycleDriver<C: TransportConnector> {
    config: ProbeConfig,
    connector: C,
    payload: String,
    fsm: CycleStateMachine,
    tally: CycleTally,
}

impl<C: TransportConnector> CycleDriver<C> {
    /// Create a driver; the payload is serialized once here
    pub fn new(config: ProbeConfig, connector: C) -> Result<Self> {
        let payload = StatusPayload::connected(config.device_id.clone()).to_json()?;
        Ok(Self {
            config,
            connector,
            payload,
            fsm: CycleStateMachine::new(),
            tally: CycleTally::default(),
        })
    }

    /// Run cycles forever (or until `max_cycles`), sleeping between them
    pub async fn run(&mut self, sink: &mut dyn OperatorSink) -> CycleTally {
        loop {
            if self.limit_reached() {
                return self.tally;
            }

            let outcome = self.run_cycle(sink).await;
            self.tally.record(outcome);
            info!(
                "Cycle {} finished: {} (responded={} timeout={} failed={})",
                self.fsm.cycles_started(),
                outcome,
                self.tally.responded,
                self.tally.timed_out,
                self.tally.connect_failed
            );

            if self.limit_reached() {
                return self.tally;
            }

            tokio::time::sleep(self.config.cycle_interval).await;
        }
    }

    /// Run one full cycle; the connection is closed on every path
    pub async fn run_cycle(&mut self, sink: &mut dyn OperatorSink) -> CycleOutcome {
        let endpoint = self.config.endpoint;

        sink.line("");
        if self.fsm.cycles_started() == 0 {
            sink.line("--- Testing direct TCP connection ---");
        } else {
            sink.line("--- Testing connection again ---");
        }
        sink.line(&format!("Connecting to {}", endpoint));
        self.transition(CycleEvent::CycleStarted);

        let mut conn = match self.connector.connect(&endpoint).await {
            Ok(conn) => conn,
            Err(e) => {
                self.transition(CycleEvent::DialFailed);
                self.report_connect_failure(&e, sink);
                self.transition(CycleEvent::ReportEmitted);
                return CycleOutcome::ConnectFailed;
            }
        };
        sink.line("TCP CONNECTION SUCCESSFUL!");
        info!("Connected to {} via {}", endpoint, self.connector.name());
        self.transition(CycleEvent::DialSucceeded);

        let request = codec::build(&endpoint, &self.payload);
        sink.line("Sending HTTP POST request...");
        sink.line("--- Request start ---");
        sink.line(&request.to_text());
        sink.line("--- Request end ---");

        if let Err(e) = conn.send_all(request.as_bytes()).await {
            error!("Sending request to {} failed: {}", endpoint, e);
            self.transition(CycleEvent::SendFailed);
            close(conn).await;
            sink.line(&format!("Sending request failed: {}", e));
            self.transition(CycleEvent::ReportEmitted);
            return CycleOutcome::ConnectFailed;
        }
        debug!("Sent {} byte request ({} byte body)", request.len(), request.body_len());
        self.transition(CycleEvent::RequestSent);

        match await_first_byte(&conn, self.config.response_timeout).await {
            WaitOutcome::Ready => {
                self.transition(CycleEvent::FirstByteArrived);
                sink.line("");
                sink.line("--- Server Response ---");
                let summary = drain_and_emit(
                    &mut conn,
                    self.config.drain_policy,
                    self.config.response_timeout,
                    sink,
                )
                .await;
                sink.line("--- End Response ---");
                if !summary.peer_closed {
                    debug!("Response drained without seeing the peer close");
                }

                close(conn).await;
                sink.line("Connection closed.");
                self.transition(CycleEvent::DrainComplete);
                CycleOutcome::Responded
            }
            WaitOutcome::TimedOut => {
                warn!(
                    "No response from {} within {:?}",
                    endpoint, self.config.response_timeout
                );
                self.transition(CycleEvent::ResponseTimedOut);
                sink.line(&diagnosis::timeout_warning(
                    self.config.response_timeout.as_millis() as u64,
                ));
                close(conn).await;
                self.transition(CycleEvent::ReportEmitted);
                CycleOutcome::TimedOut
            }
            WaitOutcome::Closed => {
                warn!("{} closed the connection without responding", endpoint);
                self.transition(CycleEvent::PeerClosed);
                sink.line("Server closed the connection without a response!");
                close(conn).await;
                self.transition(CycleEvent::ReportEmitted);
                CycleOutcome::TimedOut
            }
        }
    }

    fn limit_reached(&self) -> bool {
        self.config.max_cycles.is_some_and(|max| self.tally.total() >= max)
    }

    fn report_connect_failure(&self, err: &DialError, sink: &mut dyn OperatorSink) {
        warn!("Dial failed ({}): {}", err.kind(), err);
        sink.line("TCP CONNECTION FAILED!");
        sink.line("");
        sink.line("TROUBLESHOOTING STEPS:");
        for line in diagnosis::checklist_lines(&self.config.endpoint) {
            sink.line(&line);
        }
    }

    fn transition(&mut self, event: CycleEvent) {
        let from = self.fsm.state();
        match self.fsm.process_event(event) {
            TransitionResult::Success(to) => debug!("[CYCLE] {} -> {}", from, to),
            TransitionResult::Invalid { from, event } => {
                error!("[CYCLE] Invalid event {:?} in state {}", event, from)
            }
        }
    }
}
