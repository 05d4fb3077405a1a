pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod store;
pub mod workflow;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use config::GoflowConfig;
pub use error::{GoflowError, Result, StepError};
pub use store::{RunStore, StepLedger, TimerStore};
pub use workflow::{
    BoxFuture, EventType, InboundEvent, Instruction, RetryPolicy, RunStatus, StepContext,
    StepRecord, TimerEntry, Trigger, WorkflowDefinition, WorkflowRun,
};
