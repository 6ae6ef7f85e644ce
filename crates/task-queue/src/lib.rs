pub mod queue;

pub use queue::{DrainStatus, QueueOp, StepSignal, TaskQueue};
