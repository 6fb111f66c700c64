pub mod models;
pub mod orchestrator;

pub use models::{FlowMetadata, FlowProgress, FlowSession, FlowState, FlowStep, StepData, StepDefinition, StepValidator};
pub use orchestrator::{Advance, FlowError, FlowOrchestrator};
