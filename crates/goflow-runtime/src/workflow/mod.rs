mod executor;
mod ingress;
mod registry;
mod scheduler;

pub use executor::{RunOutcome, RunReport, WorkflowExecutor};
pub use ingress::{Admission, EventIngress};
pub use registry::WorkflowRegistry;
pub use scheduler::{SweepReport, WorkflowScheduler, WorkflowSchedulerConfig};
