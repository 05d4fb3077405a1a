mod definition;
mod run;
mod step;
mod timer;
mod trigger;

pub use definition::{
    BoxFuture, DeadlineFn, GuardHandler, Instruction, StepContext, StepHandler,
    WorkflowDefinition, WorkflowDefinitionBuilder,
};
pub use run::{RunStatus, WorkflowRun};
pub use step::{BackoffStrategy, Recorded, RetryPolicy, StepRecord};
pub use timer::{SleepRecord, TimerEntry};
pub use trigger::{run_id_for, EventType, InboundEvent, Trigger};
