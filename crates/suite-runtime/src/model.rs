use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Per-test behavior switches. Unknown flags are rejected so typos in a
/// definition fail at registration instead of silently defaulting.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct TestFlags {
    /// Run once and stop, pass or fail.
    pub no_repeat: bool,
    /// Keep re-running even after the test passes.
    pub always_run: bool,
    /// The test does not count toward its suite's verdict.
    pub optional: bool,
}

/// One declarative test: a description and the ordered operation map the
/// assessor translates into a pipeline.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSpec {
    pub description: String,
    pub definition: Map<String, Value>,
    #[serde(default)]
    pub flags: TestFlags,
}

/// A named group of tests with a completion code to reveal when every
/// non-optional test has passed.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteSpec {
    pub name: String,
    pub code: String,
    pub tests: Vec<TestSpec>,
}

/// Runtime tuning knobs.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Delay between repeated runs of a not-yet-passed test.
    pub repeat_interval_ms: u64,
    /// Capacity of the runtime event channel.
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            repeat_interval_ms: 1_000,
            event_capacity: 64,
        }
    }
}

impl RuntimeConfig {
    pub fn repeat_interval(&self) -> Duration {
        Duration::from_millis(self.repeat_interval_ms)
    }
}

/// Broadcast notifications about runtime and test state changes.
#[derive(Clone, Debug)]
pub enum RuntimeEvent {
    /// The runtime turned on and every registered suite is live.
    Activated,
    /// The runtime turned off; all suites were stopped and cleared.
    Deactivated,
    TestPassed {
        suite: String,
        test: String,
    },
    TestErred {
        suite: String,
        test: String,
        reason: String,
    },
    /// Every non-optional test of the suite has passed; the completion
    /// code is released with the event.
    SuitePassed {
        suite: String,
        code: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_default_false_and_reject_unknown_fields() {
        let flags: TestFlags = serde_json::from_str("{}").unwrap();
        assert_eq!(flags, TestFlags::default());
        assert!(!flags.no_repeat);

        let flags: TestFlags =
            serde_json::from_str(r#"{"noRepeat": true, "optional": true}"#).unwrap();
        assert!(flags.no_repeat);
        assert!(flags.optional);
        assert!(!flags.always_run);

        let err = serde_json::from_str::<TestFlags>(r#"{"noRepeats": true}"#);
        assert!(err.is_err());
    }

    #[test]
    fn suite_spec_parses_nested_tests() {
        let suite: SuiteSpec = serde_json::from_str(
            r#"{
                "name": "Layout",
                "code": "unlock-123",
                "tests": [
                    {
                        "description": "header exists",
                        "definition": {"nodes": "header", "exists": true}
                    }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(suite.name, "Layout");
        assert_eq!(suite.tests.len(), 1);
        assert_eq!(suite.tests[0].flags, TestFlags::default());
    }

    #[test]
    fn config_defaults_to_one_second_repeats() {
        let config = RuntimeConfig::default();
        assert_eq!(config.repeat_interval(), Duration::from_secs(1));

        let config: RuntimeConfig =
            serde_json::from_str(r#"{"repeatIntervalMs": 250}"#).unwrap();
        assert_eq!(config.repeat_interval(), Duration::from_millis(250));
        assert_eq!(config.event_capacity, 64);
    }
}
