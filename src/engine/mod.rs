pub mod roi;
pub mod pipeline;
pub mod scheduler;

pub use pipeline::{PassOutcome, SignalPipeline};
pub use scheduler::run_forever;
