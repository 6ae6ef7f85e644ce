//! The GradeBook maintains and reports on the state of the questions
//! registered by collector steps, and decides pass/fail per the
//! configured strictness policy.

pub mod book;

pub use book::{GradeBook, GradeReport, Question, Strictness};
