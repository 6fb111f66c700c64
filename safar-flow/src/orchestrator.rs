use safar_core::SharedClock;
use safar_store::PersistenceHandle;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    FlowMetadata, FlowProgress, FlowSession, FlowState, FlowStep, StepData, StepDefinition,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Moved { index: usize, step_id: String },
    /// The last step was passed; the session is now complete.
    Completed,
}

/// Refusals. None of them change the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("Flow has not been started")]
    NotStarted,

    #[error("Flow already completed")]
    AlreadyCompleted,

    #[error("Flow needs at least one step")]
    NoSteps,

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Required step {0} is not completed")]
    StepIncomplete(String),

    #[error("Step {step} is waiting on {missing:?}")]
    DependenciesUnmet { step: String, missing: Vec<String> },

    #[error("Already at the first step")]
    AtFirstStep,
}

/// Drives one purchase wizard: `NotStarted -> Running -> Completed`.
///
/// Every successful mutation writes the whole session back.
pub struct FlowOrchestrator {
    flow: String,
    definitions: Vec<StepDefinition>,
    session: Option<FlowSession>,
    user_tag: Option<String>,
    persistence: PersistenceHandle,
    clock: SharedClock,
}

impl FlowOrchestrator {
    pub fn new(flow: impl Into<String>, persistence: PersistenceHandle, clock: SharedClock) -> Self {
        Self {
            flow: flow.into(),
            definitions: Vec::new(),
            session: None,
            user_tag: None,
            persistence,
            clock,
        }
    }

    pub fn with_user_tag(mut self, tag: Option<String>) -> Self {
        self.user_tag = tag;
        self
    }

    /// Restores the persisted session of this flow and reattaches the
    /// validators from `definitions`. A stored session whose steps no longer
    /// match the definitions is dropped.
    pub async fn rehydrate(
        flow: impl Into<String>,
        definitions: Vec<StepDefinition>,
        persistence: PersistenceHandle,
        clock: SharedClock,
    ) -> Self {
        let mut orchestrator = Self::new(flow, persistence, clock);
        let key = orchestrator.storage_key();

        let Some(mut session) = orchestrator.persistence.load::<FlowSession>(&key).await else {
            orchestrator.definitions = definitions;
            return orchestrator;
        };

        let matches = session.flow == orchestrator.flow
            && session.steps.len() == definitions.len()
            && session.steps.iter().zip(&definitions).all(|(s, d)| s.id == d.id);

        if matches && session.completed {
            info!(flow = %orchestrator.flow, session_id = %session.id, "Archiving finished flow session left in the active key");
            orchestrator
                .persistence
                .schedule_save(&orchestrator.archive_key(session.id), &session);
            orchestrator.persistence.schedule_clear(&key);
        } else if matches {
            // code owns the step rules, storage owns the progress
            for (step, def) in session.steps.iter_mut().zip(&definitions) {
                step.name = def.name.clone();
                step.required = def.required;
                step.depends_on = def.depends_on.clone();
            }
            info!(
                flow = %orchestrator.flow,
                session_id = %session.id,
                index = session.current_index,
                "Flow session restored"
            );
            orchestrator.user_tag = session.metadata.user_tag.clone();
            orchestrator.session = Some(session);
        } else {
            warn!(flow = %orchestrator.flow, "Stored flow session does not match step definitions, discarding");
            orchestrator.persistence.schedule_clear(&key);
        }

        orchestrator.definitions = definitions;
        orchestrator
    }

    /// Storage key of the live session of `flow`.
    pub fn session_key(flow: &str) -> String {
        format!("flow_session:{}", flow)
    }

    pub fn storage_key(&self) -> String {
        Self::session_key(&self.flow)
    }

    pub fn archive_key(&self, session_id: Uuid) -> String {
        format!("flow_archive:{}:{}", self.flow, session_id)
    }

    pub fn initialize(&mut self, steps: Vec<StepDefinition>) -> Result<(), FlowError> {
        if steps.is_empty() {
            return Err(FlowError::NoSteps);
        }

        let mut ids = HashSet::new();
        for def in &steps {
            if !ids.insert(def.id.as_str()) {
                return Err(FlowError::DuplicateStep(def.id.clone()));
            }
        }
        for def in &steps {
            if let Some(dep) = def.depends_on.iter().find(|d| !ids.contains(d.as_str())) {
                return Err(FlowError::UnknownDependency {
                    step: def.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        let now = self.clock.now();
        let session = FlowSession {
            id: Uuid::new_v4(),
            flow: self.flow.clone(),
            steps: steps.iter().map(FlowStep::from_definition).collect(),
            current_index: 0,
            completed: false,
            metadata: FlowMetadata {
                created_at: now,
                last_modified: now,
                user_tag: self.user_tag.clone(),
            },
        };
        info!(flow = %self.flow, session_id = %session.id, steps = steps.len(), "Flow initialized");

        self.definitions = steps;
        self.session = Some(session);
        self.persist();
        Ok(())
    }

    /// Shallow-merges `data` into the current step's payload.
    pub fn update_step_data(&mut self, data: StepData) -> Result<(), FlowError> {
        let session = self.running_mut()?;
        let index = session.current_index;
        session.steps[index].data.extend(data);
        self.touch_and_persist();
        Ok(())
    }

    pub fn complete_current_step(&mut self) -> Result<(), FlowError> {
        let session = self.running_mut()?;
        let index = session.current_index;
        let step_id = session.steps[index].id.clone();
        let data = session.steps[index].data.clone();

        let validator = self
            .definitions
            .iter()
            .find(|d| d.id == step_id)
            .and_then(|d| d.validator.clone());
        if let Some(validator) = validator {
            if let Err(reason) = validator(&data) {
                debug!(step = %step_id, %reason, "Step validation failed");
                return Err(FlowError::Validation(reason));
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.steps[index].completed = true;
        }
        self.touch_and_persist();
        Ok(())
    }

    pub fn advance(&mut self) -> Result<Advance, FlowError> {
        let session = self.running_mut()?;
        let index = session.current_index;
        let current = &session.steps[index];

        if !current.is_satisfied() {
            return Err(FlowError::StepIncomplete(current.id.clone()));
        }

        let outcome = if index + 1 < session.steps.len() {
            let missing = session.missing_dependencies(index + 1);
            if !missing.is_empty() {
                return Err(FlowError::DependenciesUnmet {
                    step: session.steps[index + 1].id.clone(),
                    missing,
                });
            }
            session.current_index = index + 1;
            Advance::Moved {
                index: index + 1,
                step_id: session.steps[index + 1].id.clone(),
            }
        } else {
            session.completed = true;
            info!(flow = %session.flow, session_id = %session.id, "Flow completed");
            Advance::Completed
        };

        if outcome == Advance::Completed {
            self.archive_completed();
        } else {
            self.touch_and_persist();
        }
        Ok(outcome)
    }

    /// Steps back one. The step being left keeps its completion.
    pub fn retreat(&mut self) -> Result<usize, FlowError> {
        let session = self.running_mut()?;
        if session.current_index == 0 {
            return Err(FlowError::AtFirstStep);
        }
        session.current_index -= 1;
        let index = session.current_index;
        self.touch_and_persist();
        Ok(index)
    }

    pub fn jump_to(&mut self, step_id: &str) -> Result<(), FlowError> {
        let session = self.running_mut()?;
        let target = session
            .index_of(step_id)
            .ok_or_else(|| FlowError::UnknownStep(step_id.to_string()))?;

        if let Some(blocking) = session.steps[..target].iter().find(|s| !s.is_satisfied()) {
            return Err(FlowError::StepIncomplete(blocking.id.clone()));
        }
        let missing = session.missing_dependencies(target);
        if !missing.is_empty() {
            return Err(FlowError::DependenciesUnmet {
                step: step_id.to_string(),
                missing,
            });
        }

        session.current_index = target;
        self.touch_and_persist();
        Ok(())
    }

    pub fn progress(&self) -> FlowProgress {
        let Some(session) = &self.session else {
            return FlowProgress::default();
        };

        let total = session.steps.len();
        let done = session.completed_count();
        let index = session.current_index;
        let next = session.steps.get(index + 1);

        let can_proceed = !session.completed
            && session.current_step().is_satisfied()
            && next.map_or(true, |_| session.missing_dependencies(index + 1).is_empty());

        FlowProgress {
            total_steps: total,
            completed_steps: done,
            percent: (done * 100 / total) as u8,
            can_proceed,
            next_step_id: next.map(|s| s.id.clone()),
            previous_step_id: index.checked_sub(1).map(|i| session.steps[i].id.clone()),
        }
    }

    /// Archives the current session and returns to `NotStarted`.
    pub fn reset(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        info!(flow = %self.flow, session_id = %session.id, "Flow reset, archiving session");
        self.persistence.schedule_save(&self.archive_key(session.id), &session);
        self.persistence.schedule_clear(&self.storage_key());
    }

    /// A finished wizard leaves the active key: the session moves to its
    /// archive key and stays readable in memory until the next `initialize`.
    fn archive_completed(&mut self) {
        let now = self.clock.now();
        if let Some(session) = self.session.as_mut() {
            session.metadata.last_modified = now;
        }
        let Some(session) = &self.session else {
            return;
        };
        self.persistence.schedule_save(&self.archive_key(session.id), session);
        self.persistence.schedule_clear(&self.storage_key());
    }

    pub fn state(&self) -> FlowState {
        match &self.session {
            None => FlowState::NotStarted,
            Some(s) if s.completed => FlowState::Completed,
            Some(_) => FlowState::Running,
        }
    }

    pub fn current_step(&self) -> Option<&FlowStep> {
        self.session.as_ref().map(|s| s.current_step())
    }

    pub fn step_data(&self, step_id: &str) -> Option<&StepData> {
        let session = self.session.as_ref()?;
        session.steps.iter().find(|s| s.id == step_id).map(|s| &s.data)
    }

    pub fn session(&self) -> Option<&FlowSession> {
        self.session.as_ref()
    }

    fn running_mut(&mut self) -> Result<&mut FlowSession, FlowError> {
        match self.session.as_mut() {
            None => Err(FlowError::NotStarted),
            Some(s) if s.completed => Err(FlowError::AlreadyCompleted),
            Some(s) => Ok(s),
        }
    }

    fn touch_and_persist(&mut self) {
        let now = self.clock.now();
        if let Some(session) = self.session.as_mut() {
            session.metadata.last_modified = now;
        }
        self.persist();
    }

    fn persist(&self) {
        if let Some(session) = &self.session {
            self.persistence.schedule_save(&self.storage_key(), session);
        }
    }
}
