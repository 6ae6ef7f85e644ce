//! Bullseye grades a live document and reports back immediately.
//!
//! Feedback on front-end exercises usually arrives after a submit/review
//! round trip. Bullseye closes that loop: declarative test suites run
//! against the page as it is being edited, re-running every second until
//! they pass, and release a completion code when a whole suite goes
//! green.
//!
//! The engine is split into small crates re-exported here:
//!
//! - [`TaskQueue`] serializes the asynchronous steps of one test pipeline.
//! - [`Bullseye`] / [`Target`] hold the tree of selection results.
//! - [`GradeBook`] turns collected values into a pass/fail verdict.
//! - [`Assessor`] runs collector and grader operations against a
//!   [`DomPort`], the read-only capability interface onto the document.
//! - [`GradingRuntime`] owns registered suites, schedules their active
//!   tests, and broadcasts [`RuntimeEvent`]s.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bullseye::{GradingRuntime, RuntimeEvent};
//! # async fn demo(dom: Arc<impl bullseye::DomPort + 'static>) -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = GradingRuntime::new(dom);
//! runtime.register_suites(
//!     r#"[{
//!         "name": "Structure",
//!         "code": "unlock-42",
//!         "tests": [{
//!             "description": "the page has a header",
//!             "definition": {"nodes": "header", "exists": true}
//!         }]
//!     }]"#,
//! )?;
//!
//! let mut events = runtime.subscribe();
//! runtime.turn_on()?;
//! while let Ok(event) = events.recv().await {
//!     if let RuntimeEvent::SuitePassed { code, .. } = event {
//!         println!("done: {code}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub use bullseye_assessor::{
    parse_definition, Assessor, AssessorError, ConfigError, Edge, HitPolicy, OpSpec, RunReport,
    ValueSource,
};
pub use bullseye_core_types::{EngineError, SuiteId, TargetId, TestId};
pub use bullseye_dom_port::{
    ClientRect, DomError, DomPort, ElementHandle, LayoutInfo, OffsetBox, Viewport,
};
pub use bullseye_gradebook::{GradeBook, GradeReport, Question, Strictness};
pub use bullseye_suite_runtime::{
    ActiveTest, GradingRuntime, RuntimeConfig, RuntimeError, RuntimeEvent, Suite, SuiteDump,
    SuiteSpec, TestDump, TestFlags, TestSpec, TestState, TestStatus,
};
pub use bullseye_target_tree::{Bullseye, Target, Tier};
pub use bullseye_task_queue::{DrainStatus, QueueOp, StepSignal, TaskQueue};
