//! Active tests, suites, and the runtime that owns them.
//!
//! A registered suite definition becomes a set of [`ActiveTest`] state
//! machines when the runtime turns on; each test replays its assessor
//! pipeline until it passes, errs, or is stopped. The runtime is a plain
//! owned value: several independent runtimes can grade different
//! documents side by side.

pub mod active;
pub mod errors;
pub mod model;
pub mod runtime;

pub use active::{ActiveTest, TestState, TestStatus};
pub use errors::RuntimeError;
pub use model::{RuntimeConfig, RuntimeEvent, SuiteSpec, TestFlags, TestSpec};
pub use runtime::{GradingRuntime, Suite, SuiteDump, TestDump};
