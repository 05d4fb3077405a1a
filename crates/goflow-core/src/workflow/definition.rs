use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use super::step::RetryPolicy;
use super::timer::SleepRecord;
use super::trigger::{EventType, Trigger};
use crate::error::{GoflowError, Result, StepError};

/// Boxed future used at every async seam of the engine.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type alias for a step handler.
pub type StepHandler = Arc<
    dyn Fn(StepContext) -> BoxFuture<'static, std::result::Result<serde_json::Value, StepError>>
        + Send
        + Sync,
>;

/// Type alias for a guard evaluated after a suspend point.
pub type GuardHandler =
    Arc<dyn Fn(StepContext) -> BoxFuture<'static, std::result::Result<bool, StepError>> + Send + Sync>;

/// Computes a suspend deadline from earlier step results.
pub type DeadlineFn = Arc<
    dyn Fn(&StepContext) -> std::result::Result<Option<DateTime<Utc>>, StepError> + Send + Sync,
>;

type PayloadValidator = Arc<dyn Fn(&Trigger) -> Result<()> + Send + Sync>;

/// One entry of a definition's ordered instruction list.
#[derive(Clone)]
pub enum Instruction {
    /// A memoized side effect.
    Step { id: String, handler: StepHandler },
    /// Durable suspension until a wall-clock deadline.
    SleepUntil { id: String, deadline: DeadlineFn },
    /// Re-reads current state; `false` completes the run with no further action.
    Guard { id: String, check: GuardHandler },
}

impl Instruction {
    pub fn id(&self) -> &str {
        match self {
            Self::Step { id, .. } | Self::SleepUntil { id, .. } | Self::Guard { id, .. } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Step { .. } => "step",
            Self::SleepUntil { .. } => "sleep_until",
            Self::Guard { .. } => "guard",
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruction")
            .field("kind", &self.kind())
            .field("id", &self.id())
            .finish()
    }
}

/// Static mapping of one event type to an ordered instruction list.
#[derive(Clone)]
pub struct WorkflowDefinition {
    id: String,
    event_type: EventType,
    instructions: Vec<Instruction>,
    validator: Option<PayloadValidator>,
    retry: Option<RetryPolicy>,
}

impl WorkflowDefinition {
    pub fn builder(id: impl Into<String>, event_type: EventType) -> WorkflowDefinitionBuilder {
        WorkflowDefinitionBuilder {
            id: id.into(),
            event_type,
            instructions: Vec::new(),
            validator: None,
            retry: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Retry policy override for this definition, if any.
    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    /// Index of the instruction with the given ID.
    pub fn position(&self, instruction_id: &str) -> Option<usize> {
        self.instructions
            .iter()
            .position(|i| i.id() == instruction_id)
    }

    /// Index of the suspend point, if the definition has one.
    pub fn suspend_index(&self) -> Option<usize> {
        self.instructions
            .iter()
            .position(|i| matches!(i, Instruction::SleepUntil { .. }))
    }

    /// Check a trigger before it is admitted.
    pub fn validate(&self, trigger: &Trigger) -> Result<()> {
        if trigger.event_type != self.event_type {
            return Err(GoflowError::Validation(format!(
                "workflow {} does not handle {}",
                self.id, trigger.event_type
            )));
        }
        match &self.validator {
            Some(validate) => validate(trigger),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("instructions", &self.instructions)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Builder for workflow definitions.
pub struct WorkflowDefinitionBuilder {
    id: String,
    event_type: EventType,
    instructions: Vec<Instruction>,
    validator: Option<PayloadValidator>,
    retry: Option<RetryPolicy>,
}

impl WorkflowDefinitionBuilder {
    /// Append a memoized step. Its output is stored in the step ledger.
    pub fn step<F, Fut, T>(mut self, id: impl Into<String>, f: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, StepError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let handler: StepHandler = Arc::new(move |ctx| {
            let fut = f(ctx);
            Box::pin(async move {
                let output = fut.await?;
                Ok(serde_json::to_value(output)?)
            })
        });
        self.instructions.push(Instruction::Step {
            id: id.into(),
            handler,
        });
        self
    }

    /// Append the suspend point.
    pub fn sleep_until<F>(mut self, id: impl Into<String>, deadline: F) -> Self
    where
        F: Fn(&StepContext) -> std::result::Result<Option<DateTime<Utc>>, StepError>
            + Send
            + Sync
            + 'static,
    {
        self.instructions.push(Instruction::SleepUntil {
            id: id.into(),
            deadline: Arc::new(deadline),
        });
        self
    }

    /// Append a guard.
    pub fn guard<F, Fut>(mut self, id: impl Into<String>, f: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<bool, StepError>> + Send + 'static,
    {
        let check: GuardHandler = Arc::new(move |ctx| Box::pin(f(ctx)));
        self.instructions.push(Instruction::Guard {
            id: id.into(),
            check,
        });
        self
    }

    /// Reject triggers whose payload does not deserialize into `T`.
    pub fn validate_with<T: DeserializeOwned + 'static>(mut self) -> Self {
        self.validator = Some(Arc::new(|trigger: &Trigger| {
            trigger.payload_as::<T>().map(|_| ())
        }));
        self
    }

    /// Override the engine-wide retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn build(self) -> Result<WorkflowDefinition> {
        if self.id.trim().is_empty() {
            return Err(GoflowError::Config("workflow id must not be empty".into()));
        }
        if self.instructions.is_empty() {
            return Err(GoflowError::Config(format!(
                "workflow {} has no instructions",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for instruction in &self.instructions {
            if instruction.id().trim().is_empty() {
                return Err(GoflowError::Config(format!(
                    "workflow {} has an instruction without an id",
                    self.id
                )));
            }
            if !seen.insert(instruction.id()) {
                return Err(GoflowError::Config(format!(
                    "workflow {} has duplicate instruction id '{}'",
                    self.id,
                    instruction.id()
                )));
            }
        }

        let suspend_points = self
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::SleepUntil { .. }))
            .count();
        if suspend_points > 1 {
            return Err(GoflowError::Config(format!(
                "workflow {} has {} suspend points, at most one is supported",
                self.id, suspend_points
            )));
        }

        Ok(WorkflowDefinition {
            id: self.id,
            event_type: self.event_type,
            instructions: self.instructions,
            validator: self.validator,
            retry: self.retry,
        })
    }
}

/// Context handed to step handlers, guards and deadline functions.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: Uuid,
    pub definition_id: String,
    /// ID of the instruction being executed.
    pub step_id: String,
    /// 1-based attempt number within the current execution.
    pub attempt: u32,
    /// Engine time when the attempt started.
    pub now: DateTime<Utc>,
    trigger: Arc<Trigger>,
    results: Arc<HashMap<String, serde_json::Value>>,
}

impl StepContext {
    pub fn new(
        run_id: Uuid,
        definition_id: impl Into<String>,
        trigger: Arc<Trigger>,
        results: Arc<HashMap<String, serde_json::Value>>,
    ) -> Self {
        Self {
            run_id,
            definition_id: definition_id.into(),
            step_id: String::new(),
            attempt: 1,
            now: Utc::now(),
            trigger,
            results,
        }
    }

    /// Context for one attempt of one instruction.
    pub fn for_attempt(&self, step_id: &str, attempt: u32, now: DateTime<Utc>) -> Self {
        Self {
            step_id: step_id.to_string(),
            attempt,
            now,
            ..self.clone()
        }
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn trigger_id(&self) -> &str {
        &self.trigger.trigger_id
    }

    /// Get the trigger payload as a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> std::result::Result<T, StepError> {
        serde_json::from_value(self.trigger.payload.clone())
            .map_err(|e| StepError::terminal(format!("invalid payload: {}", e)))
    }

    /// Recorded result of an earlier instruction.
    pub fn result(&self, step_id: &str) -> Option<&serde_json::Value> {
        self.results.get(step_id)
    }

    /// Recorded result of an earlier instruction as a typed value.
    pub fn result_as<T: DeserializeOwned>(&self, step_id: &str) -> std::result::Result<T, StepError> {
        let value = self.results.get(step_id).ok_or_else(|| {
            StepError::terminal(format!("step '{}' has no recorded result", step_id))
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Whether the run actually waited at the given suspend point.
    pub fn slept_at(&self, sleep_id: &str) -> bool {
        self.result_as::<SleepRecord>(sleep_id)
            .map(|r| r.slept)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> Arc<Trigger> {
        Arc::new(Trigger {
            trigger_id: "evt_1".into(),
            event_type: EventType::TaskAssigned,
            payload: serde_json::json!({"taskId": "t1"}),
            received_at: Utc::now(),
        })
    }

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    #[allow(dead_code)]
    struct TaskPayload {
        task_id: String,
    }

    #[test]
    fn test_builder_orders_instructions() {
        let def = WorkflowDefinition::builder("remind", EventType::TaskAssigned)
            .step("load", |_ctx| async { Ok(1) })
            .sleep_until("wait", |_ctx| Ok(None))
            .guard("check", |_ctx| async { Ok(true) })
            .step("notify", |_ctx| async { Ok(()) })
            .build()
            .unwrap();

        assert_eq!(def.instructions().len(), 4);
        assert_eq!(def.position("check"), Some(2));
        assert_eq!(def.suspend_index(), Some(1));
        assert_eq!(def.instructions()[1].kind(), "sleep_until");
    }

    #[test]
    fn test_builder_rejects_duplicate_ids() {
        let result = WorkflowDefinition::builder("dup", EventType::UserCreated)
            .step("a", |_ctx| async { Ok(()) })
            .step("a", |_ctx| async { Ok(()) })
            .build();
        assert!(matches!(result, Err(GoflowError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_two_suspend_points() {
        let result = WorkflowDefinition::builder("sleepy", EventType::UserCreated)
            .sleep_until("a", |_ctx| Ok(None))
            .sleep_until("b", |_ctx| Ok(None))
            .build();
        assert!(result.is_err());

        let empty = WorkflowDefinition::builder("empty", EventType::UserCreated).build();
        assert!(empty.is_err());
    }

    #[test]
    fn test_validate_payload() {
        let def = WorkflowDefinition::builder("remind", EventType::TaskAssigned)
            .step("load", |_ctx| async { Ok(()) })
            .validate_with::<TaskPayload>()
            .build()
            .unwrap();

        assert!(def.validate(&trigger()).is_ok());

        let bad = Trigger {
            payload: serde_json::json!({"other": 1}),
            ..(*trigger()).clone()
        };
        assert!(matches!(def.validate(&bad), Err(GoflowError::Validation(_))));

        let wrong_event = Trigger {
            event_type: EventType::UserCreated,
            ..(*trigger()).clone()
        };
        assert!(def.validate(&wrong_event).is_err());
    }

    #[tokio::test]
    async fn test_step_handler_serializes_output() {
        let def = WorkflowDefinition::builder("remind", EventType::TaskAssigned)
            .step("load", |ctx: StepContext| async move {
                let payload: TaskPayload = ctx.payload_as()?;
                Ok(serde_json::json!({"loaded": payload.task_id}))
            })
            .build()
            .unwrap();

        let ctx = StepContext::new(Uuid::new_v4(), "remind", trigger(), Arc::default());
        let Instruction::Step { handler, .. } = &def.instructions()[0] else {
            panic!("expected step");
        };
        let value = handler(ctx.for_attempt("load", 1, Utc::now())).await.unwrap();
        assert_eq!(value, serde_json::json!({"loaded": "t1"}));
    }

    #[test]
    fn test_context_results() {
        let now = Utc::now();
        let mut results = HashMap::new();
        results.insert(
            "wait".to_string(),
            serde_json::to_value(SleepRecord::woke(now, now)).unwrap(),
        );
        results.insert("load".to_string(), serde_json::json!(42));
        let ctx = StepContext::new(Uuid::new_v4(), "remind", trigger(), Arc::new(results));

        assert!(ctx.slept_at("wait"));
        assert!(!ctx.slept_at("missing"));
        assert_eq!(ctx.result_as::<i32>("load").unwrap(), 42);
        assert!(matches!(
            ctx.result_as::<i32>("missing"),
            Err(StepError::Terminal(_))
        ));
    }
}
