use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use bullseye_assessor::Assessor;
use bullseye_dom_port::DomPort;

use crate::errors::RuntimeError;
use crate::model::{RuntimeEvent, TestFlags, TestSpec};

/// Lifecycle of one active test.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TestState {
    /// Waiting for its first or next run.
    #[default]
    Idle,
    /// A pipeline run is in flight.
    Running,
    /// The last run passed. Terminal unless the test always runs.
    Passed,
    /// A run ended fatally. Terminal; the test is not rescheduled.
    Erred,
}

/// Snapshot of a test's latest run, retained for the debug dump.
#[derive(Clone, Debug, Default)]
pub struct TestStatus {
    pub state: TestState,
    pub runs: u64,
    pub values: Vec<String>,
    pub incorrect: Vec<String>,
    pub diagnostics: Vec<String>,
}

/// A registered test brought to life: the assessor pipeline plus the
/// background task that replays it on the repeat interval.
///
/// Runs once immediately. Unless `no_repeat`, re-runs until it passes
/// (unless `always_run`), errs, or is stopped. Stopping aborts the
/// worker task; an in-flight run completes but is never rescheduled.
pub struct ActiveTest {
    description: String,
    flags: TestFlags,
    status: Arc<RwLock<TestStatus>>,
    worker: Option<JoinHandle<()>>,
}

impl ActiveTest {
    pub(crate) fn start<D>(
        suite: &str,
        spec: TestSpec,
        port: Arc<D>,
        repeat_interval: Duration,
        events: broadcast::Sender<RuntimeEvent>,
    ) -> Result<Self, RuntimeError>
    where
        D: DomPort + 'static,
    {
        let assessor = Assessor::from_definition(port, spec.description.clone(), &spec.definition)
            .map_err(|source| RuntimeError::BadTestDefinition {
                suite: suite.to_string(),
                test: spec.description.clone(),
                source,
            })?;

        let status = Arc::new(RwLock::new(TestStatus::default()));
        let worker = tokio::spawn(run_loop(
            assessor,
            spec.flags,
            repeat_interval,
            Arc::clone(&status),
            events,
            suite.to_string(),
        ));

        Ok(Self {
            description: spec.description,
            flags: spec.flags,
            status,
            worker: Some(worker),
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn flags(&self) -> TestFlags {
        self.flags
    }

    pub fn state(&self) -> TestState {
        self.status.read().state
    }

    pub fn passed(&self) -> bool {
        self.state() == TestState::Passed
    }

    pub fn status(&self) -> TestStatus {
        self.status.read().clone()
    }

    /// Cancel the repeat task. Idempotent.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
            debug!(test = %self.description, "active test stopped");
        }
    }
}

impl Drop for ActiveTest {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop<D>(
    assessor: Assessor<D>,
    flags: TestFlags,
    repeat_interval: Duration,
    status: Arc<RwLock<TestStatus>>,
    events: broadcast::Sender<RuntimeEvent>,
    suite: String,
) where
    D: DomPort + 'static,
{
    let test = assessor.description().to_string();
    let mut ticker = tokio::time::interval(repeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // The first tick fires immediately, so the test runs right away.
        ticker.tick().await;

        {
            let mut st = status.write();
            st.state = TestState::Running;
            st.runs += 1;
        }

        let report = assessor.run().await;

        let passed = report.passed;
        let fatal = report.fatal;
        {
            // Each run replaces the previous run's observations.
            let mut st = status.write();
            st.values = report.values;
            st.incorrect = report.incorrect;
            st.diagnostics = report.diagnostics;
            st.state = match (&fatal, passed) {
                (Some(_), _) => TestState::Erred,
                (None, true) => TestState::Passed,
                (None, false) => TestState::Idle,
            };
        }

        if let Some(reason) = fatal {
            warn!(%suite, %test, %reason, "test erred; giving up");
            let _ = events.send(RuntimeEvent::TestErred {
                suite,
                test,
                reason,
            });
            return;
        }

        if passed {
            info!(%suite, %test, "test passed");
            let _ = events.send(RuntimeEvent::TestPassed {
                suite: suite.clone(),
                test: test.clone(),
            });
            if !flags.always_run {
                return;
            }
        }

        if flags.no_repeat {
            return;
        }
    }
}
