use serde::{Deserialize, Serialize};

use crate::{ResourceUrn, StepOp, StepStatus};

/// Resource inputs or outputs, as reported by the engine.
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;

/// A snapshot of resource state attached to a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub inputs: Option<PropertyMap>,
    pub outputs: Option<PropertyMap>,
}

/// One planned step within a preview.
///
/// `inputs`/`outputs` describe the new state and are absent for deletes.
/// `old` is present whenever the resource already exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewStep {
    pub urn: ResourceUrn,
    pub resource_type: String,
    pub name: String,
    pub parent: Option<ResourceUrn>,
    pub op: StepOp,
    pub inputs: Option<PropertyMap>,
    pub outputs: Option<PropertyMap>,
    pub old: Option<StepState>,
}

/// One step of an executing operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationStep {
    pub urn: ResourceUrn,
    pub resource_type: String,
    pub name: String,
    pub parent: Option<ResourceUrn>,
    pub op: StepOp,
    pub status: StepStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Free-form engine output that does not describe a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub urn: Option<ResourceUrn>,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PreviewEvent {
    Step(PreviewStep),
    Diagnostic(Diagnostic),
    Done,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationEvent {
    Step(OperationStep),
    Diagnostic(Diagnostic),
    Done,
    Error(String),
}
