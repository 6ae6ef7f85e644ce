use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use bullseye_core_types::TargetId;
use bullseye_dom_port::{DomError, DomPort, LayoutInfo, Viewport};
use bullseye_gradebook::{GradeBook, GradeReport, Question, Strictness};
use bullseye_target_tree::{Bullseye, Target, Tier};
use bullseye_task_queue::{DrainStatus, StepSignal, TaskQueue};

use crate::errors::{AssessorError, ConfigError};
use crate::model::{Edge, HitPolicy, OpSpec, ValueSource};
use crate::translate::parse_definition;
use crate::value::{display, strict_eq, unitless};

/// Explicit result of one pipeline run. Replaces mutable callback slots:
/// the caller gets everything a run produced in one value, so a stale
/// handler from a previous run can never fire late.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Overall verdict. False whenever the run ended fatally or no
    /// grader produced a report.
    pub passed: bool,
    /// The first (and authoritative) grade report of the run.
    pub report: Option<GradeReport>,
    /// Pre-order child counts of the final bullseye.
    pub tree_shape: Vec<usize>,
    /// Collected question values, stringified for diagnostics.
    pub values: Vec<String>,
    /// Human-readable mismatch explanations. Never fatal.
    pub incorrect: Vec<String>,
    /// Recoverable operational issues encountered while collecting.
    pub diagnostics: Vec<String>,
    /// Set when the run aborted; the enclosing test should stop repeating.
    pub fatal: Option<String>,
}

/// Mutable state threaded through one run's queued operations.
struct RunState {
    bullseye: Bullseye,
    gradebook: GradeBook,
    operations: Vec<&'static str>,
    strictness: Strictness,
    negate: bool,
    incorrect: Vec<String>,
    diagnostics: Vec<String>,
    report: Option<GradeReport>,
    pending_event: Option<String>,
    fatal: Option<String>,
}

impl RunState {
    fn new() -> Self {
        Self {
            bullseye: Bullseye::new(),
            gradebook: GradeBook::new(),
            operations: Vec::new(),
            strictness: Strictness::All,
            negate: false,
            incorrect: Vec::new(),
            diagnostics: Vec::new(),
            report: None,
            pending_event: None,
            fatal: None,
        }
    }

    /// Note what just happened and refresh the questions in the GradeBook.
    fn register_operation(&mut self, operation: &'static str) {
        self.operations.push(operation);
        self.gradebook.reset();
    }

    fn diagnostic(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "recoverable collection issue");
        self.diagnostics.push(reason);
    }

    fn question_for(&self, id: &TargetId) -> Option<Question> {
        self.bullseye.get(id).map(|t| {
            Question::new(
                t.id.clone(),
                t.value.clone(),
                t.element.is_some(),
                t.children.len(),
            )
        })
    }

    /// The tier rule: a produced value registers the node itself as a
    /// question; no value registers each of the node's children instead
    /// (element-gathering steps expand children rather than produce a
    /// scalar).
    fn finish_extraction(&mut self, id: &TargetId, value: Option<Value>) {
        match value {
            Some(v) => {
                self.bullseye.set_value(id, v);
                if let Some(q) = self.question_for(id) {
                    self.gradebook.record(q);
                }
            }
            None => {
                let child_ids: Vec<TargetId> = self
                    .bullseye
                    .get(id)
                    .map(|t| t.children.iter().map(|c| c.id.clone()).collect())
                    .unwrap_or_default();
                for child in child_ids {
                    if let Some(q) = self.question_for(&child) {
                        self.gradebook.record(q);
                    }
                }
            }
        }
    }

    /// The first grade report resolves the run; later ones are ignored.
    fn store_report(&mut self, report: GradeReport) {
        for question in &report.questions {
            self.bullseye.mark_correct(&question.target, question.correct);
        }
        if self.report.is_none() {
            self.report = Some(report);
        } else {
            debug!("additional grade report ignored; the first resolves the run");
        }
    }

    fn resume_with_event(&mut self, detail: Value) {
        if let Some(root) = self.bullseye.root_id() {
            self.bullseye.set_value(&root, detail);
            if let Some(q) = self.question_for(&root) {
                self.gradebook.record(q);
            }
        }
    }

    fn build_report(&mut self) -> RunReport {
        let report = self.report.take();
        let fatal = self.fatal.take();
        let values = report
            .as_ref()
            .map(|r| {
                r.questions
                    .iter()
                    .map(|q| display(q.value.as_ref()))
                    .collect()
            })
            .unwrap_or_default();
        RunReport {
            passed: fatal.is_none() && report.as_ref().map(|r| r.passed).unwrap_or(false),
            report,
            tree_shape: self.bullseye.shape(),
            values,
            incorrect: std::mem::take(&mut self.incorrect),
            diagnostics: std::mem::take(&mut self.diagnostics),
            fatal,
        }
    }
}

/// The collector/grader pipeline for one test. Construction is chainable
/// or driven by a declarative definition; `run` replays the pipeline
/// against the current document.
pub struct Assessor<D>
where
    D: DomPort + 'static,
{
    port: Arc<D>,
    description: String,
    ops: Vec<OpSpec>,
}

impl<D> Assessor<D>
where
    D: DomPort + 'static,
{
    pub fn new(port: Arc<D>, description: impl Into<String>) -> Self {
        Self {
            port,
            description: description.into(),
            ops: Vec::new(),
        }
    }

    pub fn from_definition(
        port: Arc<D>,
        description: impl Into<String>,
        definition: &Map<String, Value>,
    ) -> Result<Self, ConfigError> {
        let ops = parse_definition(definition)?;
        let mut assessor = Self::new(port, description);
        assessor.ops = ops;
        Ok(assessor)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn ops(&self) -> &[OpSpec] {
        &self.ops
    }

    fn push(mut self, op: OpSpec) -> Self {
        self.ops.push(op);
        self
    }

    /// Generate a new root target; matched elements become its children.
    pub fn these_elements(self, selector: impl Into<String>) -> Self {
        self.push(OpSpec::SelectElements {
            selector: selector.into(),
        })
    }

    /// Expand every bottom target by querying within its element.
    pub fn deep_children(self, selector: impl Into<String>) -> Self {
        self.push(OpSpec::SelectDeepChildren {
            selector: selector.into(),
        })
    }

    /// Block the pipeline until a named custom event fires once; the
    /// event's detail becomes the root target's value.
    pub fn wait_for_event(self, name: impl Into<String>) -> Self {
        self.push(OpSpec::WaitForEvent { name: name.into() })
    }

    pub fn get(self, source: ValueSource) -> Self {
        self.push(OpSpec::Get(source))
    }

    pub fn css_property(self, property: impl Into<String>) -> Self {
        self.push(OpSpec::CssProperty {
            property: property.into(),
        })
    }

    pub fn attribute(self, name: impl Into<String>) -> Self {
        self.push(OpSpec::Attribute { name: name.into() })
    }

    pub fn property(self, key: impl Into<String>) -> Self {
        self.push(OpSpec::Property { key: key.into() })
    }

    pub fn absolute_position(self, edge: Edge) -> Self {
        self.push(OpSpec::AbsolutePosition { edge })
    }

    pub fn limit(self, strictness: Strictness) -> Self {
        self.push(OpSpec::Limit(strictness))
    }

    pub fn not(self) -> Self {
        self.push(OpSpec::Not)
    }

    pub fn exists(self) -> Self {
        self.push(OpSpec::Exists)
    }

    pub fn equals(self, expected: Vec<Value>) -> Self {
        self.push(OpSpec::Equals { expected })
    }

    pub fn is_greater_than(self, expected: f64, or_equal: bool) -> Self {
        self.push(OpSpec::IsGreaterThan { expected, or_equal })
    }

    pub fn is_less_than(self, expected: f64, or_equal: bool) -> Self {
        self.push(OpSpec::IsLessThan { expected, or_equal })
    }

    pub fn is_in_range(self, lower: f64, upper: f64) -> Self {
        self.push(OpSpec::in_range(lower, upper, true, true))
    }

    pub fn has_substring(self, patterns: Vec<String>, policy: HitPolicy) -> Self {
        self.push(OpSpec::HasSubstring { patterns, policy })
    }

    /// Replay the whole pipeline against the current document. Each run
    /// rebuilds the bullseye and gradebook from scratch.
    pub async fn run(&self) -> RunReport {
        let state = Arc::new(Mutex::new(RunState::new()));
        let mut queue: TaskQueue<AssessorError> = TaskQueue::new();

        // Event listeners attach before the queue starts draining, so an
        // event fired while earlier steps are still collecting is held
        // until the pipeline reaches its wait step, not lost.
        let mut listeners: VecDeque<(String, JoinHandle<Result<Value, DomError>>)> = self
            .ops
            .iter()
            .filter_map(|op| match op {
                OpSpec::WaitForEvent { name } => Some(name.clone()),
                _ => None,
            })
            .map(|name| {
                let port = Arc::clone(&self.port);
                let event = name.clone();
                (
                    name,
                    tokio::spawn(async move { port.wait_event(&event).await }),
                )
            })
            .collect();

        for op in self.ops.clone() {
            let state = Arc::clone(&state);
            let port = Arc::clone(&self.port);
            queue.add(
                move || -> BoxFuture<'static, Result<StepSignal, AssessorError>> {
                    Box::pin(apply_op(op, state, port))
                },
            );
        }

        loop {
            match queue.drain().await {
                Ok(DrainStatus::Drained) => break,
                Ok(DrainStatus::Blocked) => {
                    let pending = state.lock().await.pending_event.take();
                    let name = match pending {
                        Some(name) => name,
                        None => break,
                    };
                    match await_event(&mut listeners, &self.port, &name).await {
                        Ok(detail) => {
                            state.lock().await.resume_with_event(detail);
                            queue.unblock();
                        }
                        Err(err) => {
                            let mut st = state.lock().await;
                            let reason = format!("waitForEvent '{name}' failed: {err}");
                            st.diagnostic(reason.clone());
                            st.fatal = Some(reason);
                            break;
                        }
                    }
                }
                Err(err) => {
                    let mut st = state.lock().await;
                    st.diagnostic(err.to_string());
                    st.fatal = Some(err.to_string());
                    break;
                }
            }
        }

        // Unfinished operations in a blocked queue still hold state clones.
        drop(queue);
        for (_, handle) in listeners {
            handle.abort();
        }
        let mut st = state.lock().await;
        st.build_report()
    }
}

/// Resolve a pending wait step through the listener attached at run
/// start. Wait steps resume in pipeline order, so the front listener is
/// the one to consume; a mismatch falls back to a fresh wait.
async fn await_event<D>(
    listeners: &mut VecDeque<(String, JoinHandle<Result<Value, DomError>>)>,
    port: &Arc<D>,
    name: &str,
) -> Result<Value, DomError>
where
    D: DomPort + 'static,
{
    match listeners.pop_front() {
        Some((event, handle)) if event == name => match handle.await {
            Ok(outcome) => outcome,
            Err(_) => Err(DomError::internal("event listener task failed")),
        },
        other => {
            if let Some((_, handle)) = other {
                handle.abort();
            }
            port.wait_event(name).await
        }
    }
}

async fn apply_op<D>(
    op: OpSpec,
    state: Arc<Mutex<RunState>>,
    port: Arc<D>,
) -> Result<StepSignal, AssessorError>
where
    D: DomPort + 'static,
{
    let mut st = state.lock().await;
    let st = &mut *st;
    match op {
        OpSpec::SelectElements { selector } => select_elements(st, &port, &selector).await,
        OpSpec::SelectDeepChildren { selector } => {
            select_deep_children(st, &port, &selector).await
        }
        OpSpec::WaitForEvent { name } => {
            st.register_operation("gatherElements");
            st.bullseye.replace_root();
            st.pending_event = Some(name);
            Ok(StepSignal::Block)
        }
        OpSpec::Get(source) => get_value(st, &port, source).await,
        OpSpec::CssProperty { property } => css_property(st, &port, &property).await,
        OpSpec::Attribute { name } => attribute(st, &port, &name).await,
        OpSpec::Property { key } => property(st, &port, &key).await,
        OpSpec::AbsolutePosition { edge } => absolute_position(st, &port, edge).await,
        OpSpec::Limit(strictness) => {
            st.strictness = strictness;
            Ok(StepSignal::Continue)
        }
        OpSpec::Not => {
            st.negate = true;
            Ok(StepSignal::Continue)
        }
        OpSpec::Exists => exists(st),
        OpSpec::Equals { expected } => equals(st, &expected),
        OpSpec::IsGreaterThan { expected, or_equal } => {
            compare(st, expected, or_equal, Comparison::Greater)
        }
        OpSpec::IsLessThan { expected, or_equal } => {
            compare(st, expected, or_equal, Comparison::Less)
        }
        OpSpec::IsInRange {
            lower,
            upper,
            lower_inclusive,
            upper_inclusive,
        } => in_range(st, lower, upper, lower_inclusive, upper_inclusive),
        OpSpec::HasSubstring { patterns, policy } => has_substring(st, &patterns, policy),
    }
}

async fn select_elements<D: DomPort>(
    st: &mut RunState,
    port: &Arc<D>,
    selector: &str,
) -> Result<StepSignal, AssessorError> {
    st.register_operation("gatherElements");
    let root = st.bullseye.replace_root();
    if selector.is_empty() {
        st.diagnostic("Cannot find elements without a selector.");
        st.finish_extraction(&root, None);
        return Ok(StepSignal::Continue);
    }
    let matches = port
        .query(selector)
        .await
        .map_err(|err| AssessorError::fatal(format!("cannot query '{selector}': {err}")))?;
    for (index, el) in matches.into_iter().enumerate() {
        st.bullseye.add_child(&root, Target::with_element(el, index));
    }
    st.finish_extraction(&root, None);
    Ok(StepSignal::Continue)
}

async fn select_deep_children<D: DomPort>(
    st: &mut RunState,
    port: &Arc<D>,
    selector: &str,
) -> Result<StepSignal, AssessorError> {
    st.register_operation("gatherDeepChildElements");
    if selector.is_empty() {
        st.diagnostic("Cannot find child elements without a selector.");
        return Err(AssessorError::fatal(
            "cannot gather children without a selector",
        ));
    }
    for id in st.bullseye.tier_ids(Tier::Bottom) {
        if let Some(el) = st.bullseye.element_of(&id) {
            let matches = port.query_within(el, selector).await.map_err(|err| {
                AssessorError::fatal(format!("cannot query '{selector}' within {el}: {err}"))
            })?;
            for (index, child) in matches.into_iter().enumerate() {
                st.bullseye.add_child(&id, Target::with_element(child, index));
            }
        }
        st.finish_extraction(&id, None);
    }
    Ok(StepSignal::Continue)
}

async fn get_value<D: DomPort>(
    st: &mut RunState,
    port: &Arc<D>,
    source: ValueSource,
) -> Result<StepSignal, AssessorError> {
    st.register_operation(source.operation());
    match source {
        ValueSource::Count => {
            // Counting moves one level up the bullseye from the leaves.
            for id in st.bullseye.tier_ids(Tier::NextToBottom) {
                let count = st.bullseye.get(&id).map(|t| t.children.len()).unwrap_or(0);
                st.finish_extraction(&id, Some(json!(count)));
            }
        }
        ValueSource::ChildPosition => {
            for id in st.bullseye.tier_ids(Tier::Bottom) {
                let value = match st.bullseye.element_of(&id) {
                    Some(el) => match port.child_index(el).await {
                        Ok(Some(position)) => Some(json!(position)),
                        Ok(None) => None,
                        Err(err) => {
                            st.diagnostic(format!("Cannot get child position: {err}"));
                            None
                        }
                    },
                    None => None,
                };
                st.finish_extraction(&id, value);
            }
        }
        ValueSource::InnerHtml => {
            for id in st.bullseye.tier_ids(Tier::Bottom) {
                let value = match st.bullseye.element_of(&id) {
                    Some(el) => match port.inner_html(el).await {
                        Ok(html) => Some(json!(html)),
                        Err(err) => {
                            st.diagnostic(format!(
                                "Cannot get innerHTML; element probably doesn't exist: {err}"
                            ));
                            Some(json!(""))
                        }
                    },
                    None => {
                        st.diagnostic("Cannot get innerHTML; element probably doesn't exist.");
                        Some(json!(""))
                    }
                };
                st.finish_extraction(&id, value);
            }
        }
        ValueSource::UserAgent => {
            let root = st.bullseye.replace_root();
            let value = match port.user_agent().await {
                Ok(ua) => Some(json!(ua)),
                Err(err) => {
                    st.diagnostic(format!("Can't find a user agent string: {err}"));
                    Some(json!(""))
                }
            };
            st.finish_extraction(&root, value);
        }
        ValueSource::DevicePixelRatio => {
            let root = st.bullseye.replace_root();
            let value = match port.device_pixel_ratio().await {
                Ok(dpr) => Some(json!(dpr)),
                Err(err) => {
                    st.diagnostic(format!("Can't find device pixel ratio: {err}"));
                    None
                }
            };
            st.finish_extraction(&root, value);
        }
    }
    Ok(StepSignal::Continue)
}

async fn css_property<D: DomPort>(
    st: &mut RunState,
    port: &Arc<D>,
    property: &str,
) -> Result<StepSignal, AssessorError> {
    st.register_operation("cssProperty");
    for id in st.bullseye.tier_ids(Tier::Bottom) {
        let value = match st.bullseye.element_of(&id) {
            Some(el) => match port.computed_style(el, property).await {
                Ok(Some(style)) => Some(json!(style)),
                Ok(None) => None,
                Err(err) => {
                    st.diagnostic(format!("Cannot get CSS property '{property}': {err}"));
                    None
                }
            },
            None => {
                st.diagnostic(format!("Cannot get CSS property '{property}': element missing"));
                None
            }
        };
        st.finish_extraction(&id, value);
    }
    Ok(StepSignal::Continue)
}

async fn attribute<D: DomPort>(
    st: &mut RunState,
    port: &Arc<D>,
    name: &str,
) -> Result<StepSignal, AssessorError> {
    st.register_operation("attribute");
    for id in st.bullseye.tier_ids(Tier::Bottom) {
        let value = match st.bullseye.element_of(&id) {
            Some(el) => match port.attribute(el, name).await {
                // A present-but-empty attribute reads as true.
                Ok(Some(attr)) if attr.is_empty() => Some(json!(true)),
                Ok(Some(attr)) => Some(json!(attr)),
                Ok(None) => None,
                Err(err) => {
                    st.diagnostic(format!("Cannot get attribute '{name}': {err}"));
                    None
                }
            },
            None => {
                st.diagnostic(format!("Cannot get attribute '{name}': element missing"));
                None
            }
        };
        st.finish_extraction(&id, value);
    }
    Ok(StepSignal::Continue)
}

async fn property<D: DomPort>(
    st: &mut RunState,
    port: &Arc<D>,
    key: &str,
) -> Result<StepSignal, AssessorError> {
    st.register_operation("property");
    for id in st.bullseye.tier_ids(Tier::Bottom) {
        let value = match st.bullseye.element_of(&id) {
            Some(el) => match port.property(el, key).await {
                Ok(Some(Value::String(s))) if s.is_empty() => Some(json!(true)),
                Ok(Some(v)) => Some(v),
                Ok(None) => None,
                Err(err) => {
                    st.diagnostic(format!("Cannot get property '{key}': {err}"));
                    None
                }
            },
            None => {
                st.diagnostic(format!("Cannot get property '{key}': element missing"));
                None
            }
        };
        st.finish_extraction(&id, value);
    }
    Ok(StepSignal::Continue)
}

async fn absolute_position<D: DomPort>(
    st: &mut RunState,
    port: &Arc<D>,
    edge: Edge,
) -> Result<StepSignal, AssessorError> {
    st.register_operation("absolutePosition");
    let viewport = port
        .viewport()
        .await
        .map_err(|err| AssessorError::fatal(format!("cannot read viewport: {err}")))?;
    for id in st.bullseye.tier_ids(Tier::Bottom) {
        let el = st.bullseye.element_of(&id).ok_or_else(|| {
            AssessorError::fatal(format!("cannot get absolute position of {edge:?}: element missing"))
        })?;
        let layout = port.layout(el).await.map_err(|err| {
            AssessorError::fatal(format!("cannot get absolute position of {edge:?}: {err}"))
        })?;
        st.finish_extraction(&id, Some(edge_value(edge, &layout, &viewport)));
    }
    Ok(StepSignal::Continue)
}

/// Resolve an absolute viewport-edge position: block layout reads the
/// offset box, inline layout reads the client rect; bottom/right clamp
/// to "max" when flush with the viewport edge.
fn edge_value(edge: Edge, layout: &LayoutInfo, viewport: &Viewport) -> Value {
    let numeric = match layout.display.as_str() {
        "block" => Some(match edge {
            Edge::Top => layout.offset.top,
            Edge::Left => layout.offset.left,
            Edge::Bottom => layout.offset.top + layout.offset.height,
            Edge::Right => layout.offset.left + layout.offset.width,
        }),
        "inline" => Some(match edge {
            Edge::Top => layout.rect.top,
            Edge::Left => layout.rect.left,
            Edge::Bottom => layout.rect.bottom,
            Edge::Right => layout.rect.right,
        }),
        _ => None,
    };
    match numeric {
        Some(n) => {
            let flush = match edge {
                Edge::Bottom => n == viewport.height,
                Edge::Right => n == viewport.width,
                _ => false,
            };
            if flush {
                json!("max")
            } else {
                json!(n)
            }
        }
        None => json!("NaN"),
    }
}

fn grade_with<F>(st: &mut RunState, mut predicate: F) -> Result<StepSignal, AssessorError>
where
    F: FnMut(&Question, &mut Vec<String>) -> bool,
{
    let strictness = st.strictness;
    let negate = st.negate;
    let mut incorrect = Vec::new();
    let report = st
        .gradebook
        .grade(strictness, negate, |q| predicate(q, &mut incorrect));
    st.incorrect.extend(incorrect);
    st.store_report(report);
    Ok(StepSignal::Continue)
}

fn exists(st: &mut RunState) -> Result<StepSignal, AssessorError> {
    let last_operation = st.operations.last().copied().unwrap_or("");
    grade_with(st, |q, incorrect| {
        let found = match last_operation {
            "gatherElements" => q.child_count > 0 || q.has_element || q.has_value(),
            "gatherDeepChildElements" => q.has_element,
            _ => q.has_value() || q.has_element,
        };
        if !found {
            incorrect.push("does not exist".to_string());
        }
        found
    })
}

fn equals(st: &mut RunState, expected: &[Value]) -> Result<StepSignal, AssessorError> {
    grade_with(st, |q, incorrect| {
        let hit = q
            .value
            .as_ref()
            .map(|v| expected.iter().any(|e| strict_eq(v, e)))
            .unwrap_or(false);
        if !hit {
            let list: Vec<String> = expected.iter().map(|e| display(Some(e))).collect();
            incorrect.push(format!(
                "{} is not one of: [{}]",
                display(q.value.as_ref()),
                list.join(", ")
            ));
        }
        hit
    })
}

#[derive(Clone, Copy)]
enum Comparison {
    Greater,
    Less,
}

fn compare(
    st: &mut RunState,
    expected: f64,
    or_equal: bool,
    direction: Comparison,
) -> Result<StepSignal, AssessorError> {
    grade_with(st, |q, incorrect| {
        let ok = q
            .value
            .as_ref()
            .and_then(unitless)
            .map(|n| match (direction, or_equal) {
                (Comparison::Greater, true) => n >= expected,
                (Comparison::Greater, false) => n > expected,
                (Comparison::Less, true) => n <= expected,
                (Comparison::Less, false) => n < expected,
            })
            .unwrap_or(false);
        if !ok {
            let relation = match direction {
                Comparison::Greater => "greater",
                Comparison::Less => "less",
            };
            incorrect.push(format!(
                "{} is not {relation} than {expected}",
                display(q.value.as_ref())
            ));
        }
        ok
    })
}

fn in_range(
    st: &mut RunState,
    lower: f64,
    upper: f64,
    lower_inclusive: bool,
    upper_inclusive: bool,
) -> Result<StepSignal, AssessorError> {
    grade_with(st, |q, incorrect| {
        let rendered = display(q.value.as_ref());
        match q.value.as_ref().and_then(unitless) {
            Some(n) => {
                let above = if lower_inclusive { n >= lower } else { n > lower };
                let below = if upper_inclusive { n <= upper } else { n < upper };
                if !above {
                    incorrect.push(format!("{rendered} is not greater than {lower}"));
                }
                if !below {
                    incorrect.push(format!("{rendered} is not less than {upper}"));
                }
                above && below
            }
            None => {
                incorrect.push(format!("{rendered} is not in range [{lower}, {upper}]"));
                false
            }
        }
    })
}

fn has_substring(
    st: &mut RunState,
    patterns: &[String],
    policy: HitPolicy,
) -> Result<StepSignal, AssessorError> {
    let mut regexes = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let re = Regex::new(pattern).map_err(|err| {
            AssessorError::fatal(format!("'hasSubstring' got an invalid regex '{pattern}': {err}"))
        })?;
        regexes.push(re);
    }
    let min = policy.min.unwrap_or(1);
    let max = policy.max.unwrap_or(patterns.len() as u32);

    grade_with(st, |q, incorrect| {
        let text = match q.value.as_ref().and_then(Value::as_str) {
            Some(text) => text,
            None => {
                incorrect.push(format!(
                    "{} has no text to search",
                    display(q.value.as_ref())
                ));
                return false;
            }
        };
        let mut hits = 0u32;
        for (re, pattern) in regexes.iter().zip(patterns) {
            if re.is_match(text) {
                hits += 1;
            } else {
                let preview: String = text.chars().take(20).collect();
                incorrect.push(format!("{pattern} did not hit against {preview}"));
            }
        }
        match policy.exact {
            Some(n) => hits == n,
            None => hits >= min && hits <= max,
        }
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use bullseye_dom_port::{ClientRect, FixtureDom, OffsetBox};

    use super::*;

    fn three_items(values: [&str; 3]) -> Arc<FixtureDom> {
        let dom = FixtureDom::new();
        let list = dom.insert(None, "ul");
        for value in values {
            let li = dom.insert(Some(list), "li");
            dom.set_html(li, value);
        }
        Arc::new(dom)
    }

    #[tokio::test]
    async fn equals_passes_when_every_value_matches() {
        let dom = three_items(["X", "X", "X"]);
        let report = Assessor::new(dom, "all list items say X")
            .these_elements("li")
            .get(ValueSource::InnerHtml)
            .equals(vec![json!("X")])
            .run()
            .await;

        assert!(report.passed);
        assert!(report.incorrect.is_empty());
        assert_eq!(report.values, vec!["X", "X", "X"]);
    }

    #[tokio::test]
    async fn equals_fails_with_one_incorrect_entry_per_miss() {
        let dom = three_items(["X", "Y", "X"]);
        let report = Assessor::new(dom, "all list items say X")
            .these_elements("li")
            .get(ValueSource::InnerHtml)
            .equals(vec![json!("X")])
            .run()
            .await;

        assert!(!report.passed);
        assert_eq!(report.incorrect, vec!["Y is not one of: [X]"]);
        let graded = report.report.unwrap();
        assert_eq!(graded.questions.iter().filter(|q| q.correct).count(), 2);
    }

    #[tokio::test]
    async fn greater_than_or_equal_reads_through_unit_suffixes() {
        let dom = FixtureDom::new();
        let el = dom.insert(None, "p");
        dom.set_style(el, "font-size", "5px");

        let report = Assessor::new(Arc::new(dom), "font size at least 5")
            .these_elements("p")
            .css_property("font-size")
            .is_greater_than(5.0, true)
            .run()
            .await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn substring_hit_window_bounds_the_pass() {
        let dom = three_items(["abc", "abc", "abc"]);
        let patterns = vec!["a".to_string(), "b".to_string()];

        // Both patterns hit "abc"; min 1, max 2 accepts that.
        let report = Assessor::new(Arc::clone(&dom), "has a or b")
            .these_elements("li")
            .get(ValueSource::InnerHtml)
            .has_substring(
                patterns.clone(),
                HitPolicy {
                    exact: None,
                    min: Some(1),
                    max: Some(2),
                },
            )
            .run()
            .await;
        assert!(report.passed);

        // Exactly 1 hit required, but both hit.
        let report = Assessor::new(dom, "exactly one of a, b")
            .these_elements("li")
            .get(ValueSource::InnerHtml)
            .has_substring(
                patterns,
                HitPolicy {
                    exact: Some(1),
                    min: None,
                    max: None,
                },
            )
            .run()
            .await;
        assert!(!report.passed);
    }

    #[tokio::test]
    async fn missed_pattern_reports_a_text_preview() {
        let dom = three_items(["abc", "abc", "abc"]);
        let report = Assessor::new(dom, "mentions z")
            .these_elements("li")
            .get(ValueSource::InnerHtml)
            .has_substring(vec!["z".to_string()], HitPolicy::default())
            .run()
            .await;

        assert!(!report.passed);
        assert_eq!(report.incorrect[0], "z did not hit against abc");
    }

    #[tokio::test]
    async fn repeated_runs_build_identical_trees() {
        let dom = three_items(["X", "X", "X"]);
        let assessor = Assessor::new(dom, "stable shape")
            .these_elements("li")
            .get(ValueSource::InnerHtml)
            .exists();

        let first = assessor.run().await;
        let second = assessor.run().await;
        assert_eq!(first.tree_shape, second.tree_shape);
        assert_eq!(
            first.report.unwrap().questions.len(),
            second.report.unwrap().questions.len()
        );
    }

    #[tokio::test]
    async fn count_looks_one_level_up_from_the_leaves() {
        let dom = FixtureDom::new();
        for _ in 0..2 {
            let list = dom.insert(None, "ul");
            for _ in 0..3 {
                dom.insert(Some(list), "li");
            }
        }

        let report = Assessor::new(Arc::new(dom), "each list holds three items")
            .these_elements("ul")
            .deep_children("li")
            .get(ValueSource::Count)
            .equals(vec![json!(3)])
            .run()
            .await;

        assert!(report.passed);
        assert_eq!(report.values, vec!["3", "3"]);
    }

    #[tokio::test]
    async fn child_position_grades_sibling_order() {
        let dom = FixtureDom::new();
        let list = dom.insert(None, "ol");
        for n in 0..3 {
            let li = dom.insert(Some(list), "li");
            if n == 1 {
                dom.set_attr(li, "class", "target");
            }
        }

        let report = Assessor::new(Arc::new(dom), "target sits second")
            .these_elements("li.target")
            .get(ValueSource::ChildPosition)
            .equals(vec![json!(1)])
            .run()
            .await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn missing_attribute_makes_not_exists_pass() {
        let dom = FixtureDom::new();
        dom.insert(None, "img");

        // No alt attribute: no value collected, so no questions register
        // and the negated existence check passes on the empty set.
        let report = Assessor::new(Arc::new(dom), "image has no alt text")
            .these_elements("img")
            .attribute("alt")
            .not()
            .exists()
            .run()
            .await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn empty_attribute_collects_as_true() {
        let dom = FixtureDom::new();
        let img = dom.insert(None, "img");
        dom.set_attr(img, "alt", "");

        let report = Assessor::new(Arc::new(dom), "alt attribute present")
            .these_elements("img")
            .attribute("alt")
            .equals(vec![json!(true)])
            .run()
            .await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn limit_some_needs_only_one_correct() {
        let dom = three_items(["X", "Y", "Z"]);
        let report = Assessor::new(dom, "at least one item says X")
            .these_elements("li")
            .get(ValueSource::InnerHtml)
            .limit(Strictness::Some)
            .equals(vec![json!("X")])
            .run()
            .await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn absolute_position_clamps_to_max_at_the_viewport_edge() {
        let dom = FixtureDom::new();
        let el = dom.insert(None, "footer");
        dom.set_layout(
            el,
            bullseye_dom_port::LayoutInfo {
                display: "block".to_string(),
                offset: OffsetBox {
                    top: 700.0,
                    left: 0.0,
                    width: 1024.0,
                    height: 68.0,
                },
                rect: ClientRect::default(),
            },
        );

        // 700 + 68 == default viewport height.
        let report = Assessor::new(Arc::new(dom), "footer flush with the bottom")
            .these_elements("footer")
            .absolute_position(Edge::Bottom)
            .equals(vec![json!("max")])
            .run()
            .await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn in_range_accepts_reversed_bounds() {
        let dom = FixtureDom::new();
        let el = dom.insert(None, "div");
        dom.set_style(el, "width", "5em");

        let report = Assessor::new(Arc::new(dom), "width between 1 and 10")
            .these_elements("div")
            .css_property("width")
            .push(OpSpec::in_range(10.0, 1.0, true, true))
            .run()
            .await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn first_grade_report_resolves_the_run() {
        let dom = three_items(["X", "X", "X"]);
        let report = Assessor::new(dom, "double-graded")
            .these_elements("li")
            .get(ValueSource::InnerHtml)
            .equals(vec![json!("X")])
            .equals(vec![json!("never")])
            .run()
            .await;

        // The failing second grader cannot overwrite the first verdict.
        assert!(report.passed);
    }

    #[tokio::test]
    async fn wait_for_event_blocks_until_the_event_fires_once() {
        let dom = Arc::new(FixtureDom::new());
        let assessor = Assessor::new(Arc::clone(&dom), "app signals ready")
            .wait_for_event("ready")
            .equals(vec![json!("ok")]);

        let emitter = {
            let dom = Arc::clone(&dom);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                dom.emit("ready", json!("ok"));
                // A second firing has no listener left to re-trigger.
                dom.emit("ready", json!("stale"));
            })
        };

        let report = assessor.run().await;
        emitter.await.unwrap();
        assert!(report.passed);
        assert_eq!(report.values, vec!["ok"]);
    }

    #[tokio::test]
    async fn fatal_collector_failure_aborts_and_surfaces() {
        let dom = three_items(["X", "X", "X"]);
        let report = Assessor::new(dom, "broken pipeline")
            .these_elements("li")
            .deep_children("")
            .exists()
            .run()
            .await;

        assert!(!report.passed);
        assert!(report.fatal.is_some());
        assert!(report.report.is_none());
    }

    #[tokio::test]
    async fn definition_keys_drive_the_pipeline_in_order() {
        let dom = three_items(["X", "X", "X"]);
        let definition: Map<String, Value> = serde_json::from_str(
            r#"{"nodes": "li", "get": "innerHTML", "equals": "X"}"#,
        )
        .unwrap();

        let assessor =
            Assessor::from_definition(dom, "declarative equals", &definition).unwrap();
        let report = assessor.run().await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn user_agent_and_dpr_grade_against_a_fresh_root() {
        let dom = FixtureDom::new();
        dom.set_user_agent("TestBrowser/2.0");
        dom.set_device_pixel_ratio(2.0);
        let dom = Arc::new(dom);

        let report = Assessor::new(Arc::clone(&dom), "browser identifies itself")
            .get(ValueSource::UserAgent)
            .has_substring(vec!["TestBrowser".to_string()], HitPolicy::default())
            .run()
            .await;
        assert!(report.passed);

        let report = Assessor::new(dom, "retina display")
            .get(ValueSource::DevicePixelRatio)
            .equals(vec![json!(2.0)])
            .run()
            .await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn less_than_honors_the_inclusive_flag() {
        let dom = FixtureDom::new();
        let el = dom.insert(None, "aside");
        dom.set_style(el, "width", "300px");
        let dom = Arc::new(dom);

        let report = Assessor::new(Arc::clone(&dom), "narrow enough")
            .these_elements("aside")
            .css_property("width")
            .is_less_than(300.0, true)
            .run()
            .await;
        assert!(report.passed);

        let report = Assessor::new(dom, "strictly narrower")
            .these_elements("aside")
            .css_property("width")
            .is_less_than(300.0, false)
            .run()
            .await;
        assert!(!report.passed);
        assert_eq!(report.incorrect, vec!["300px is not less than 300"]);
    }

    #[tokio::test]
    async fn property_collects_values_and_maps_empty_strings_to_true() {
        let dom = FixtureDom::new();
        let input = dom.insert(None, "input");
        dom.set_property(input, "value", json!("hello"));
        let dom = Arc::new(dom);

        let report = Assessor::new(Arc::clone(&dom), "input holds hello")
            .these_elements("input")
            .property("value")
            .equals(vec![json!("hello")])
            .run()
            .await;
        assert!(report.passed);

        // A present-but-empty property reads as true, like attributes.
        dom.set_property(input, "value", json!(""));
        let report = Assessor::new(dom, "input value present")
            .these_elements("input")
            .property("value")
            .equals(vec![json!(true)])
            .run()
            .await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn removed_attribute_stops_registering_questions() {
        let dom = Arc::new(FixtureDom::new());
        let img = dom.insert(None, "img");
        dom.set_attr(img, "alt", "mascot");

        let assessor = Assessor::new(Arc::clone(&dom), "alt present")
            .these_elements("img")
            .attribute("alt")
            .exists();
        assert!(assessor.run().await.passed);

        dom.remove_attr(img, "alt");
        assert!(!assessor.run().await.passed);
    }

    #[tokio::test]
    async fn event_fired_during_earlier_steps_is_not_lost() {
        let dom = Arc::new(FixtureDom::new());
        dom.insert(None, "body");
        let assessor = Assessor::new(Arc::clone(&dom), "early signal")
            .these_elements("body")
            .wait_for_event("ready")
            .equals(vec![json!("ok")]);

        let run = tokio::spawn(async move { assessor.run().await });
        // Let the run attach its listener, then fire while the selection
        // step is still draining, before the wait step has blocked.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        dom.emit("ready", json!("ok"));

        let report = run.await.unwrap();
        assert!(report.passed);
        assert_eq!(report.values, vec!["ok"]);
    }
}
