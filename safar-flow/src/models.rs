use chrono::{DateTime, Utc};
use safar_shared::{IntegrityError, PersistedRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub type StepData = serde_json::Map<String, serde_json::Value>;

/// Gate run by `complete_current_step`. `Err` carries the reason shown to the
/// shopper.
pub type StepValidator = Arc<dyn Fn(&StepData) -> Result<(), String> + Send + Sync>;

/// Wizard step as declared in code. Validators live here because they are
/// never persisted.
#[derive(Clone)]
pub struct StepDefinition {
    pub id: String,
    pub name: String,
    pub required: bool,
    pub depends_on: Vec<String>,
    pub validator: Option<StepValidator>,
}

impl StepDefinition {
    pub fn required(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            required: true,
            depends_on: Vec::new(),
            validator: None,
        }
    }

    pub fn optional(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(id, name)
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&StepData) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("required", &self.required)
            .field("depends_on", &self.depends_on)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowStep {
    pub id: String,
    pub name: String,
    pub required: bool,
    pub completed: bool,
    #[serde(default)]
    pub data: StepData,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl FlowStep {
    pub fn from_definition(def: &StepDefinition) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            required: def.required,
            completed: false,
            data: StepData::new(),
            depends_on: def.depends_on.clone(),
        }
    }

    /// Whether the wizard may move past this step.
    pub fn is_satisfied(&self) -> bool {
        !self.required || self.completed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowMetadata {
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_tag: Option<String>,
}

/// One run of a purchase wizard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowSession {
    pub id: Uuid,
    pub flow: String,
    pub steps: Vec<FlowStep>,
    pub current_index: usize,
    pub completed: bool,
    pub metadata: FlowMetadata,
}

impl FlowSession {
    pub fn current_step(&self) -> &FlowStep {
        &self.steps[self.current_index]
    }

    pub fn index_of(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    /// Dependencies of the step at `index` that are not completed yet.
    pub fn missing_dependencies(&self, index: usize) -> Vec<String> {
        self.steps[index]
            .depends_on
            .iter()
            .filter(|dep| !self.steps.iter().any(|s| &s.id == *dep && s.completed))
            .cloned()
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.completed).count()
    }
}

impl PersistedRecord for FlowSession {
    fn validate(&self) -> Result<(), IntegrityError> {
        if self.flow.is_empty() {
            return Err(IntegrityError::MissingField("flow"));
        }
        if self.steps.is_empty() {
            return Err(IntegrityError::MissingField("steps"));
        }
        if self.current_index >= self.steps.len() {
            return Err(IntegrityError::Malformed(format!(
                "currentIndex {} out of range for {} steps",
                self.current_index,
                self.steps.len()
            )));
        }

        let mut ids = HashSet::new();
        for step in &self.steps {
            if !ids.insert(step.id.as_str()) {
                return Err(IntegrityError::Malformed(format!("duplicate step {}", step.id)));
            }
        }
        for step in &self.steps {
            if let Some(dep) = step.depends_on.iter().find(|d| !ids.contains(d.as_str())) {
                return Err(IntegrityError::Malformed(format!(
                    "step {} depends on unknown step {}",
                    step.id, dep
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    NotStarted,
    Running,
    Completed,
}

/// Derived view for the wizard header.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FlowProgress {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub percent: u8,
    pub can_proceed: bool,
    pub next_step_id: Option<String>,
    pub previous_step_id: Option<String>,
}
