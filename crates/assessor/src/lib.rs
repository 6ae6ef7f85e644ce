//! The TA (teaching assistant) is responsible for collecting data from
//! the page into a tree of Targets (the bullseye), traversing it, and
//! feeding relevant values plus grading instructions into a GradeBook.

pub mod assessor;
pub mod errors;
pub mod model;
pub mod translate;
pub mod value;

pub use assessor::{Assessor, RunReport};
pub use errors::{AssessorError, ConfigError};
pub use model::{Edge, HitPolicy, OpSpec, ValueSource};
pub use translate::parse_definition;
