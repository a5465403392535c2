//! Acquisition Loop Recovery Tests
//!
//! Drives `AcquisitionLoop` against a scripted `SampleSource` whose field
//! reads, connects and navigations are laid out in advance. Time is paused,
//! so timeouts elapse instantly and deterministically.
//!
//! When the read script runs out the stub cancels the loop, which lets each
//! test end in a clean shutdown and inspect the report.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use linkscope::acquisition::fields::metadata;
use linkscope::{
    AcquisitionError, AcquisitionLoop, Credentials, LoopReport, LoopSettings, LoopState,
    MetricValue, SampleSource, SourceError, WindowBuffer,
};

// ============================================================================
// Scripted Source
// ============================================================================

/// Outcome of one metric read.
#[derive(Debug, Clone)]
enum Read {
    Text(&'static str),
    /// Field never appears: waits out the timeout, then fails
    Timeout,
    /// Never returns
    Hang,
}

/// Outcome of one connect call.
#[derive(Debug, Clone, Copy)]
enum Connect {
    Ok,
    Refused,
    Hang,
}

#[derive(Debug, Default)]
struct Journal {
    connects: u32,
    closed: Vec<u64>,
    configured: Vec<(String, String)>,
    navigated: Vec<String>,
    metric_reads: u32,
}

struct StubHandle {
    id: u64,
}

struct ScriptedSource {
    reads: VecDeque<Read>,
    /// Connect outcomes in order; `Ok` once exhausted
    connects: VecDeque<Connect>,
    /// Navigations that succeed before every later one fails
    navigate_fails_after: Option<usize>,
    metadata_fails: bool,
    journal: Arc<Mutex<Journal>>,
    cancel_token: CancellationToken,
    next_id: u64,
}

impl ScriptedSource {
    fn new(reads: Vec<Read>, cancel_token: CancellationToken) -> Self {
        Self {
            reads: reads.into(),
            connects: VecDeque::new(),
            navigate_fails_after: None,
            metadata_fails: false,
            journal: Arc::new(Mutex::new(Journal::default())),
            cancel_token,
            next_id: 0,
        }
    }

    fn with_connects(mut self, connects: Vec<Connect>) -> Self {
        self.connects = connects.into();
        self
    }

    fn journal(&self) -> Arc<Mutex<Journal>> {
        Arc::clone(&self.journal)
    }
}

fn is_metadata(field: &str) -> bool {
    [metadata::MODEL, metadata::MAC, metadata::IMSI, metadata::BAND].contains(&field)
}

#[async_trait]
impl SampleSource for ScriptedSource {
    type Handle = StubHandle;

    async fn connect(
        &mut self,
        _credentials: &Credentials,
        timeout: Duration,
    ) -> Result<StubHandle, SourceError> {
        self.journal.lock().unwrap().connects += 1;
        match self.connects.pop_front().unwrap_or(Connect::Ok) {
            Connect::Ok => {
                self.next_id += 1;
                Ok(StubHandle { id: self.next_id })
            }
            Connect::Refused => Err(SourceError::ConnectOrAuth("401 Unauthorized".to_string())),
            Connect::Hang => {
                // Overruns the loop's own bound on the call.
                tokio::time::sleep(timeout * 10).await;
                Err(SourceError::ConnectOrAuth("late".to_string()))
            }
        }
    }

    async fn navigate(
        &mut self,
        _handle: &mut StubHandle,
        target: &str,
        _timeout: Duration,
    ) -> Result<(), SourceError> {
        let mut journal = self.journal.lock().unwrap();
        if self
            .navigate_fails_after
            .is_some_and(|ok| journal.navigated.len() >= ok)
        {
            return Err(SourceError::ConnectOrAuth(format!("{target} returned 500")));
        }
        journal.navigated.push(target.to_string());
        Ok(())
    }

    async fn read_field(
        &mut self,
        _handle: &mut StubHandle,
        field: &str,
        timeout: Duration,
    ) -> Result<String, SourceError> {
        if is_metadata(field) {
            if self.metadata_fails {
                return Err(SourceError::FieldNotFound {
                    field: field.to_string(),
                    view: "/".to_string(),
                });
            }
            return Ok(match field {
                metadata::BAND => "78".to_string(),
                other => format!("{other}-value"),
            });
        }

        self.journal.lock().unwrap().metric_reads += 1;
        match self.reads.pop_front() {
            Some(Read::Text(text)) => Ok(text.to_string()),
            Some(Read::Timeout) => {
                tokio::time::sleep(timeout).await;
                Err(SourceError::FieldTimeout {
                    field: field.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap(),
                })
            }
            Some(Read::Hang) => std::future::pending().await,
            None => {
                self.cancel_token.cancel();
                std::future::pending().await
            }
        }
    }

    async fn configure(
        &mut self,
        _handle: &mut StubHandle,
        option: &str,
        value: &str,
        _timeout: Duration,
    ) -> Result<(), SourceError> {
        self.journal
            .lock()
            .unwrap()
            .configured
            .push((option.to_string(), value.to_string()));
        Ok(())
    }

    async fn close(&mut self, handle: StubHandle) {
        self.journal.lock().unwrap().closed.push(handle.id);
    }

    fn source_name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn settings() -> LoopSettings {
    LoopSettings {
        base_timeout: Duration::from_millis(5_000),
        field_timeout: Duration::from_millis(1_000),
        poll_interval: Duration::from_millis(200),
        ..LoopSettings::default()
    }
}

fn good_cycle(rsrp: &'static str, rsrq: &'static str, sinr: &'static str) -> Vec<Read> {
    vec![Read::Text(rsrp), Read::Text(rsrq), Read::Text(sinr)]
}

struct Run {
    outcome: Result<LoopReport, AcquisitionError>,
    buffer: Arc<WindowBuffer>,
    journal: Arc<Mutex<Journal>>,
    final_state: LoopState,
}

async fn run(source: ScriptedSource, cancel_token: CancellationToken) -> Run {
    let journal = source.journal();
    let buffer = Arc::new(WindowBuffer::new(Duration::from_secs(60)));
    let acquisition = AcquisitionLoop::new(
        source,
        Credentials::new("admin", "secret"),
        Arc::clone(&buffer),
        settings(),
        cancel_token,
    );
    let state = acquisition.state_watch();
    let outcome = acquisition.run().await;
    let final_state = *state.borrow();
    Run {
        outcome,
        buffer,
        journal,
        final_state,
    }
}

fn assert_each_handle_closed_once(journal: &Journal) {
    let mut ids = journal.closed.clone();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), journal.closed.len(), "handle closed twice: {:?}", journal.closed);
}

// ============================================================================
// Recovery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn stalled_fields_trigger_exactly_one_reauthentication() {
    let token = CancellationToken::new();
    let mut reads = vec![Read::Timeout, Read::Timeout];
    reads.extend(good_cycle("-85 dBm", "-10 dB", "12 dB"));
    let source = ScriptedSource::new(reads, token.clone());

    let run = run(source, token).await;
    let report = run.outcome.unwrap();

    assert_eq!(report.reauthentications, 1);
    assert_eq!(report.samples_pushed, 1);
    assert_eq!(report.voided_cycles, 2);

    let snapshot = run.buffer.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].value("rsrp_dbm"), Some(MetricValue::Integer(-85)));
    assert_eq!(snapshot[0].value("rsrq_db"), Some(MetricValue::Integer(-10)));
    assert_eq!(snapshot[0].value("sinr_db"), Some(MetricValue::Integer(12)));

    let journal = run.journal.lock().unwrap();
    assert_eq!(journal.connects, 2);
    assert_eq!(journal.closed, vec![1, 2]);
    assert_eq!(run.final_state, LoopState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn reauthentication_reconfigures_and_renavigates() {
    let token = CancellationToken::new();
    let mut reads = good_cycle("-90 dBm", "-11 dB", "10 dB");
    reads.push(Read::Timeout);
    reads.extend(good_cycle("-88 dBm", "-11 dB", "11 dB"));
    let source = ScriptedSource::new(reads, token.clone());

    let run = run(source, token).await;
    let report = run.outcome.unwrap();
    assert_eq!(report.samples_pushed, 2);
    assert_eq!(report.reauthentications, 1);

    let journal = run.journal.lock().unwrap();
    assert_eq!(journal.configured.len(), 2);
    assert_eq!(journal.configured[0], ("autoRefresh_interval".to_string(), "3".to_string()));
    assert_eq!(journal.navigated, vec!["/cellular_info.html", "/cellular_info.html"]);

    // Samples keep increasing capture times across the reauthentication.
    let snapshot = run.buffer.snapshot();
    assert!(snapshot[0].captured_at < snapshot[1].captured_at);
}

#[tokio::test(start_paused = true)]
async fn partial_cycle_pushes_nothing() {
    let token = CancellationToken::new();
    let mut reads = good_cycle("-90 dBm", "-11 dB", "10 dB");
    reads.extend([Read::Text("-89 dBm"), Read::Text("-11 dB"), Read::Timeout]);
    let source = ScriptedSource::new(reads, token.clone());

    let run = run(source, token).await;
    let report = run.outcome.unwrap();

    assert_eq!(run.buffer.len(), 1);
    assert_eq!(report.samples_pushed, 1);
    assert_eq!(report.voided_cycles, 1);
    assert_eq!(
        run.buffer.snapshot()[0].value("rsrp_dbm"),
        Some(MetricValue::Integer(-90))
    );
}

#[tokio::test(start_paused = true)]
async fn unparseable_field_skips_cycle_without_reauthenticating() {
    let token = CancellationToken::new();
    let mut reads = good_cycle("-90 dBm", "N/A", "10 dB");
    reads.extend(good_cycle("-80 dBm", "-9 dB", "11 dB"));
    let source = ScriptedSource::new(reads, token.clone());

    let run = run(source, token).await;
    let report = run.outcome.unwrap();

    assert_eq!(report.parse_skips, 1);
    assert_eq!(report.reauthentications, 0);
    assert_eq!(report.samples_pushed, 1);
    assert_eq!(
        run.buffer.snapshot()[0].value("rsrp_dbm"),
        Some(MetricValue::Integer(-80))
    );
    assert_eq!(run.journal.lock().unwrap().connects, 1);
}

#[tokio::test(start_paused = true)]
async fn metadata_failure_is_not_fatal() {
    let token = CancellationToken::new();
    let mut source = ScriptedSource::new(good_cycle("-90 dBm", "-11 dB", "10 dB"), token.clone());
    source.metadata_fails = true;

    let run = run(source, token).await;
    let report = run.outcome.unwrap();
    assert_eq!(report.samples_pushed, 1);
    assert_eq!(report.device.model, None);
    assert_eq!(report.device.band, None);
}

#[tokio::test(start_paused = true)]
async fn device_metadata_is_reported() {
    let token = CancellationToken::new();
    let source = ScriptedSource::new(good_cycle("-90 dBm", "-11 dB", "10 dB"), token.clone());

    let report = run(source, token).await.outcome.unwrap();
    assert_eq!(report.device.model.as_deref(), Some("span_module_name-value"));
    assert_eq!(report.device.band_label().as_deref(), Some("n78"));
}

// ============================================================================
// Fatal Paths
// ============================================================================

#[tokio::test(start_paused = true)]
async fn reauthentication_connect_overrun_is_fatal() {
    let token = CancellationToken::new();
    let source = ScriptedSource::new(vec![Read::Timeout], token.clone())
        .with_connects(vec![Connect::Ok, Connect::Hang]);

    let run = run(source, token).await;
    match run.outcome {
        Err(AcquisitionError::ConnectOrAuth { phase, source }) => {
            assert_eq!(phase, "reauthentication");
            assert!(matches!(source, SourceError::ConnectOrAuth(_)));
        }
        other => panic!("expected ConnectOrAuth, got {other:?}"),
    }

    let journal = run.journal.lock().unwrap();
    assert_eq!(journal.connects, 2);
    assert_eq!(journal.closed, vec![1]);
    assert_eq!(run.final_state, LoopState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn initial_connect_failure_is_fatal() {
    let token = CancellationToken::new();
    let source = ScriptedSource::new(vec![], token.clone()).with_connects(vec![Connect::Refused]);

    let run = run(source, token).await;
    assert!(matches!(
        run.outcome,
        Err(AcquisitionError::ConnectOrAuth { phase: "connect", .. })
    ));
    assert!(run.journal.lock().unwrap().closed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn navigate_failure_is_fatal_and_closes_session() {
    let token = CancellationToken::new();
    let mut source = ScriptedSource::new(vec![], token.clone());
    source.navigate_fails_after = Some(0);

    let run = run(source, token).await;
    assert!(matches!(
        run.outcome,
        Err(AcquisitionError::ConnectOrAuth { phase: "navigate", .. })
    ));
    assert_eq!(run.journal.lock().unwrap().closed, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn navigate_failure_after_reauthentication_names_recovery() {
    let token = CancellationToken::new();
    let mut reads = good_cycle("-90 dBm", "-11 dB", "10 dB");
    reads.push(Read::Timeout);
    let mut source = ScriptedSource::new(reads, token.clone());
    source.navigate_fails_after = Some(1);

    let run = run(source, token).await;
    match run.outcome {
        Err(AcquisitionError::ConnectOrAuth { phase, source }) => {
            assert_eq!(phase, "reauthentication");
            assert!(source.to_string().contains("returned 500"), "{source}");
        }
        other => panic!("expected ConnectOrAuth, got {other:?}"),
    }

    let journal = run.journal.lock().unwrap();
    assert_eq!(journal.connects, 2);
    assert_eq!(journal.closed, vec![1, 2]);
    assert_eq!(run.buffer.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn session_that_never_recovers_gives_up_after_base_timeout() {
    let token = CancellationToken::new();
    let reads = vec![Read::Timeout; 20];
    let source = ScriptedSource::new(reads, token.clone());

    let run = run(source, token).await;
    assert!(matches!(
        run.outcome,
        Err(AcquisitionError::ConnectOrAuth { phase: "reauthentication", .. })
    ));

    let journal = run.journal.lock().unwrap();
    // One reauthentication only; the recovery window bounds the retries.
    assert_eq!(journal.connects, 2);
    assert!(journal.metric_reads < 20);
    assert_eq!(journal.closed, vec![1, 2]);
    assert_each_handle_closed_once(&journal);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_blocked_read() {
    let token = CancellationToken::new();
    let source = ScriptedSource::new(vec![Read::Hang], token.clone());

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        canceller.cancel();
    });

    let run = run(source, token).await;
    let report = run.outcome.unwrap();
    assert_eq!(report.samples_pushed, 0);
    assert_eq!(report.reauthentications, 0);

    let journal = run.journal.lock().unwrap();
    assert_eq!(journal.closed, vec![1]);
    assert_eq!(run.final_state, LoopState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_opens_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let source = ScriptedSource::new(vec![], token.clone());

    let run = run(source, token).await;
    assert!(run.outcome.is_ok());
    let journal = run.journal.lock().unwrap();
    assert_eq!(journal.connects, 0);
    assert!(journal.closed.is_empty());
}
