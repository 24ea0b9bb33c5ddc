pub mod program;
pub mod error;
pub mod limits;
pub mod input;
pub mod vm;
pub mod trace;
pub mod table;
pub mod encoder;
pub mod codec;
pub mod metrics;

pub use error::{ExecError, TerminationReason};
pub use limits::ExecutionLimits;
pub use program::Program;
pub use trace::{Step, Steps, TraceRecorder};
pub use vm::{Vm, execute};
