use serde_json::Value;
use tracing::debug;

use bullseye_core_types::TargetId;

/// What the GradeBook needs to know about a Target registered as a unit
/// of evaluation.
#[derive(Clone, Debug)]
pub struct Question {
    pub target: TargetId,
    pub value: Option<Value>,
    pub has_element: bool,
    pub child_count: usize,
    pub correct: bool,
}

impl Question {
    pub fn new(
        target: TargetId,
        value: Option<Value>,
        has_element: bool,
        child_count: usize,
    ) -> Self {
        Self {
            target,
            value,
            has_element,
            child_count,
            correct: false,
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

/// How many correct questions a grading pass requires.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Strictness {
    /// Every question must be correct, and there must be at least one.
    #[default]
    All,
    /// Any positive number of correct questions passes.
    Some,
    /// Pass iff `0 < correct <= n`. The translator rejects `n < 1`.
    AtMost(u32),
}

/// Final state of one grading pass, handed back to the active test.
#[derive(Clone, Debug)]
pub struct GradeReport {
    pub passed: bool,
    pub questions: Vec<Question>,
}

#[derive(Debug, Default)]
pub struct GradeBook {
    questions: Vec<Question>,
    passed: bool,
}

impl GradeBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a question. Correctness always starts false.
    pub fn record(&mut self, mut question: Question) {
        question.correct = false;
        self.questions.push(question);
    }

    /// Empty the questions and make sure the test hasn't passed
    /// prematurely. Called every time a new collector step runs.
    pub fn reset(&mut self) {
        self.questions.clear();
        self.passed = false;
    }

    pub fn number_of_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn number_correct(&self) -> usize {
        self.questions.iter().filter(|q| q.correct).count()
    }

    pub fn all_correct(&self) -> bool {
        self.number_of_questions() > 0 && self.number_correct() == self.number_of_questions()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Evaluate every question against `predicate` and decide the pass
    /// verdict under `strictness`. `negate` flips every per-question
    /// flag; with zero questions it flips the final verdict instead, so
    /// "not exists" against nothing correctly passes.
    pub fn grade<F>(&mut self, strictness: Strictness, negate: bool, mut predicate: F) -> GradeReport
    where
        F: FnMut(&Question) -> bool,
    {
        self.passed = false;

        for question in &mut self.questions {
            let mut correct = predicate(&*question);
            if negate {
                correct = !correct;
            }
            question.correct = correct;
        }

        let correct_count = self.number_correct();
        self.passed = match strictness {
            Strictness::Some => correct_count > 0,
            Strictness::AtMost(n) if n > 0 => correct_count > 0 && correct_count <= n as usize,
            _ => self.all_correct(),
        };

        if self.questions.is_empty() && negate {
            self.passed = !self.passed;
        }

        debug!(
            questions = self.number_of_questions(),
            correct = correct_count,
            passed = self.passed,
            "graded"
        );

        GradeReport {
            passed: self.passed,
            questions: self.questions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(value: i64) -> Question {
        Question::new(TargetId::new(), Some(serde_json::json!(value)), true, 0)
    }

    fn book_with(values: &[i64]) -> GradeBook {
        let mut book = GradeBook::new();
        for v in values {
            book.record(question(*v));
        }
        book
    }

    #[test]
    fn all_requires_every_question_correct_and_nonempty() {
        let mut book = book_with(&[1, 2, 3]);
        let report = book.grade(Strictness::All, false, |q| q.has_value());
        assert!(report.passed);

        let mut book = book_with(&[1, 2, 3]);
        let report = book.grade(Strictness::All, false, |q| {
            q.value == Some(serde_json::json!(1))
        });
        assert!(!report.passed);
        assert_eq!(report.questions.iter().filter(|q| q.correct).count(), 1);

        // Zero questions never pass under "all".
        let mut book = GradeBook::new();
        let report = book.grade(Strictness::All, false, |_| true);
        assert!(!report.passed);
    }

    #[test]
    fn some_passes_on_any_positive_count() {
        let mut book = book_with(&[1, 2, 3]);
        let report = book.grade(Strictness::Some, false, |q| {
            q.value == Some(serde_json::json!(2))
        });
        assert!(report.passed);

        let mut book = book_with(&[1, 2, 3]);
        let report = book.grade(Strictness::Some, false, |_| false);
        assert!(!report.passed);
    }

    #[test]
    fn numeric_strictness_bounds_the_correct_count() {
        // 2 correct out of 3, limit 2: pass.
        let mut book = book_with(&[1, 1, 3]);
        let report = book.grade(Strictness::AtMost(2), false, |q| {
            q.value == Some(serde_json::json!(1))
        });
        assert!(report.passed);

        // 3 correct, limit 2: fail.
        let mut book = book_with(&[1, 1, 1]);
        let report = book.grade(Strictness::AtMost(2), false, |q| {
            q.value == Some(serde_json::json!(1))
        });
        assert!(!report.passed);

        // 0 correct, limit 2: fail.
        let mut book = book_with(&[3, 3, 3]);
        let report = book.grade(Strictness::AtMost(2), false, |q| {
            q.value == Some(serde_json::json!(1))
        });
        assert!(!report.passed);
    }

    #[test]
    fn negate_flips_flags_and_empty_verdict() {
        let mut book = book_with(&[1]);
        let report = book.grade(Strictness::All, true, |q| q.has_value());
        assert!(!report.passed);
        assert!(!report.questions[0].correct);

        // "not exists" over an empty selection passes.
        let mut book = GradeBook::new();
        let report = book.grade(Strictness::All, true, |q| q.has_value());
        assert!(report.passed);
    }

    #[test]
    fn reset_clears_state_between_collectors() {
        let mut book = book_with(&[1]);
        book.grade(Strictness::All, false, |_| true);
        assert!(book.all_correct());

        book.reset();
        assert_eq!(book.number_of_questions(), 0);
        let report = book.grade(Strictness::All, false, |_| true);
        assert!(!report.passed);
    }
}
