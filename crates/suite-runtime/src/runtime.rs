use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use bullseye_assessor::parse_definition;
use bullseye_dom_port::DomPort;

use crate::active::{ActiveTest, TestState};
use crate::errors::RuntimeError;
use crate::model::{RuntimeConfig, RuntimeEvent, SuiteSpec};

/// A live suite: its registered shape plus the active tests it spawned.
pub struct Suite {
    name: String,
    code: String,
    tests: Vec<ActiveTest>,
}

impl Suite {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn tests(&self) -> &[ActiveTest] {
        &self.tests
    }

    /// A suite passes when every non-optional test has passed.
    pub fn passed(&self) -> bool {
        self.tests
            .iter()
            .filter(|t| !t.flags().optional)
            .all(ActiveTest::passed)
    }
}

/// Per-test entry of the debug dump.
#[derive(Clone, Debug)]
pub struct TestDump {
    pub description: String,
    pub state: TestState,
    pub runs: u64,
    pub values: Vec<String>,
    pub incorrect: Vec<String>,
    pub diagnostics: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct SuiteDump {
    pub name: String,
    pub passed: bool,
    pub tests: Vec<TestDump>,
}

struct RuntimeInner<D>
where
    D: DomPort + 'static,
{
    port: Arc<D>,
    config: RuntimeConfig,
    events: broadcast::Sender<RuntimeEvent>,
    registered: RwLock<Vec<SuiteSpec>>,
    suites: RwLock<Vec<Suite>>,
    active: AtomicBool,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

/// The owned suite registry and scheduler. Each runtime instance owns its
/// suites outright; nothing is process-global, so independent runtimes
/// can grade different documents in the same process.
pub struct GradingRuntime<D>
where
    D: DomPort + 'static,
{
    inner: Arc<RuntimeInner<D>>,
}

impl<D> GradingRuntime<D>
where
    D: DomPort + 'static,
{
    pub fn new(port: Arc<D>) -> Self {
        Self::with_config(port, RuntimeConfig::default())
    }

    pub fn with_config(port: Arc<D>, config: RuntimeConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(RuntimeInner {
                port,
                config,
                events,
                registered: RwLock::new(Vec::new()),
                suites: RwLock::new(Vec::new()),
                active: AtomicBool::new(false),
                monitor: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> RuntimeConfig {
        self.inner.config
    }

    pub fn is_on(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.inner.events.subscribe()
    }

    /// Register suites from their JSON definition. The whole batch is
    /// validated first; one malformed test rejects everything, so a
    /// registration never half-applies. If the runtime is already on,
    /// newly registered suites start immediately.
    pub fn register_suites(&self, json: &str) -> Result<(), RuntimeError> {
        let specs: Vec<SuiteSpec> = serde_json::from_str(json)?;
        for suite in &specs {
            for test in &suite.tests {
                parse_definition(&test.definition).map_err(|source| {
                    RuntimeError::BadTestDefinition {
                        suite: suite.name.clone(),
                        test: test.description.clone(),
                        source,
                    }
                })?;
            }
        }

        info!(suites = specs.len(), "suites registered");
        if self.is_on() {
            let mut live = Vec::with_capacity(specs.len());
            for spec in &specs {
                live.push(self.start_suite(spec.clone())?);
            }
            self.inner.suites.write().extend(live);
        }
        self.inner.registered.write().extend(specs);
        Ok(())
    }

    /// Bring every registered suite to life. Idempotent; emits
    /// [`RuntimeEvent::Activated`] on the actual transition.
    pub fn turn_on(&self) -> Result<(), RuntimeError> {
        if self.inner.active.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let specs = self.inner.registered.read().clone();
        let mut live = Vec::with_capacity(specs.len());
        for spec in specs {
            live.push(self.start_suite(spec)?);
        }
        *self.inner.suites.write() = live;

        *self.inner.monitor.lock() = Some(spawn_monitor(Arc::clone(&self.inner)));

        info!("grading runtime on");
        let _ = self.inner.events.send(RuntimeEvent::Activated);
        Ok(())
    }

    /// Stop and discard every live suite. Registered definitions survive,
    /// so the runtime can be turned back on later.
    pub fn turn_off(&self) {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(monitor) = self.inner.monitor.lock().take() {
            monitor.abort();
        }
        self.inner.suites.write().clear();

        info!("grading runtime off");
        let _ = self.inner.events.send(RuntimeEvent::Deactivated);
    }

    /// True when at least one suite is live and all of them pass.
    pub fn all_correct(&self) -> bool {
        let suites = self.inner.suites.read();
        !suites.is_empty() && suites.iter().all(Suite::passed)
    }

    /// Point-in-time observations for every live test.
    pub fn debug_dump(&self) -> Vec<SuiteDump> {
        self.inner
            .suites
            .read()
            .iter()
            .map(|suite| SuiteDump {
                name: suite.name().to_string(),
                passed: suite.passed(),
                tests: suite
                    .tests()
                    .iter()
                    .map(|test| {
                        let status = test.status();
                        TestDump {
                            description: test.description().to_string(),
                            state: status.state,
                            runs: status.runs,
                            values: status.values,
                            incorrect: status.incorrect,
                            diagnostics: status.diagnostics,
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    fn start_suite(&self, spec: SuiteSpec) -> Result<Suite, RuntimeError> {
        let mut tests = Vec::with_capacity(spec.tests.len());
        for test in spec.tests {
            tests.push(ActiveTest::start(
                &spec.name,
                test,
                Arc::clone(&self.inner.port),
                self.inner.config.repeat_interval(),
                self.inner.events.clone(),
            )?);
        }
        Ok(Suite {
            name: spec.name,
            code: spec.code,
            tests,
        })
    }
}

impl<D> Drop for GradingRuntime<D>
where
    D: DomPort + 'static,
{
    fn drop(&mut self) {
        if let Some(monitor) = self.inner.monitor.lock().take() {
            monitor.abort();
        }
    }
}

/// Watch for suites whose non-optional tests all hold a pass at the same
/// time, and release each suite's completion code exactly once. Scans on
/// every test pass and on a coarse tick, so a pass that lands while a
/// registration is still in flight is picked up on the next tick.
fn spawn_monitor<D>(inner: Arc<RuntimeInner<D>>) -> JoinHandle<()>
where
    D: DomPort + 'static,
{
    tokio::spawn(async move {
        let mut rx = inner.events.subscribe();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut announced: HashSet<String> = HashSet::new();
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                event = rx.recv() => match event {
                    Ok(RuntimeEvent::TestPassed { .. }) => {}
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            }
            let newly_passed: Vec<(String, String)> = {
                let suites = inner.suites.read();
                suites
                    .iter()
                    .filter(|s| s.passed() && !announced.contains(s.name()))
                    .map(|s| (s.name().to_string(), s.code().to_string()))
                    .collect()
            };
            for (suite, code) in newly_passed {
                announced.insert(suite.clone());
                info!(%suite, "suite passed");
                let _ = inner.events.send(RuntimeEvent::SuitePassed { suite, code });
            }
        }
    })
}
