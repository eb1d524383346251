//! Decoding of the engine's JSON-lines event log.

use serde::Deserialize;
use strata_engine::{
    Diagnostic, OperationEvent, OperationStep, PreviewEvent, PreviewStep, PropertyMap,
    ResourceUrn, Severity, StepOp, StepState, StepStatus,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineEvent {
    #[serde(default)]
    pub sequence: u64,
    pub diagnostic_event: Option<DiagnosticEvent>,
    pub resource_pre_event: Option<ResourcePreEvent>,
    pub res_outputs_event: Option<ResOutputsEvent>,
    pub res_op_failed_event: Option<ResOpFailedEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnosticEvent {
    #[serde(default)]
    pub urn: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub ephemeral: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourcePreEvent {
    pub metadata: StepEventMetadata,
    #[serde(default)]
    pub planning: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResOutputsEvent {
    pub metadata: StepEventMetadata,
    #[serde(default)]
    pub planning: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResOpFailedEvent {
    pub metadata: StepEventMetadata,
    #[serde(default)]
    pub status: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepEventMetadata {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub urn: String,
    #[serde(default, rename = "type")]
    pub resource_type: String,
    pub old: Option<StepEventState>,
    pub new: Option<StepEventState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepEventState {
    #[serde(default)]
    pub parent: String,
    pub inputs: Option<PropertyMap>,
    pub outputs: Option<PropertyMap>,
}

impl StepEventMetadata {
    fn urn(&self) -> ResourceUrn {
        ResourceUrn::new(self.urn.clone())
    }

    fn name(&self) -> String {
        let urn = self.urn();
        urn.name().unwrap_or(urn.as_str()).to_owned()
    }

    fn parent(&self) -> Option<ResourceUrn> {
        [self.new.as_ref(), self.old.as_ref()]
            .into_iter()
            .flatten()
            .map(|state| state.parent.as_str())
            .find(|parent| !parent.is_empty())
            .map(ResourceUrn::from)
    }

    fn operation_step(&self, status: StepStatus, message: Option<String>) -> OperationStep {
        OperationStep {
            urn: self.urn(),
            resource_type: self.resource_type.clone(),
            name: self.name(),
            parent: self.parent(),
            op: StepOp::from_engine(&self.op),
            status,
            message,
        }
    }
}

impl DiagnosticEvent {
    fn severity(&self) -> Severity {
        match self.severity.as_str() {
            "debug" => Severity::Debug,
            "warning" => Severity::Warning,
            "error" => Severity::Error,
            _ => Severity::Info,
        }
    }

    fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            urn: (!self.urn.is_empty()).then(|| ResourceUrn::new(self.urn.clone())),
            severity: self.severity(),
            message: self.message.trim_end().to_owned(),
        }
    }
}

/// Decode one line of the event log. Blank lines decode to `None`.
pub fn decode_line(line: &str) -> Result<Option<EngineEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Events the executor can stream, decoded from engine events.
pub trait StreamEvent: Send + 'static {
    fn decode(event: &EngineEvent) -> Option<Self>
    where
        Self: Sized;

    fn done() -> Self;

    fn error(message: String) -> Self;
}

impl StreamEvent for PreviewEvent {
    fn decode(event: &EngineEvent) -> Option<Self> {
        if let Some(pre) = &event.resource_pre_event {
            let metadata = &pre.metadata;
            let new = metadata.new.as_ref();
            return Some(PreviewEvent::Step(PreviewStep {
                urn: metadata.urn(),
                resource_type: metadata.resource_type.clone(),
                name: metadata.name(),
                parent: metadata.parent(),
                op: StepOp::from_engine(&metadata.op),
                inputs: new.and_then(|state| state.inputs.clone()),
                outputs: new.and_then(|state| state.outputs.clone()),
                old: metadata.old.as_ref().map(|state| StepState {
                    inputs: state.inputs.clone(),
                    outputs: state.outputs.clone(),
                }),
            }));
        }
        diagnostic(event).map(PreviewEvent::Diagnostic)
    }

    fn done() -> Self {
        PreviewEvent::Done
    }

    fn error(message: String) -> Self {
        PreviewEvent::Error(message)
    }
}

impl StreamEvent for OperationEvent {
    fn decode(event: &EngineEvent) -> Option<Self> {
        if let Some(pre) = &event.resource_pre_event {
            return Some(OperationEvent::Step(
                pre.metadata.operation_step(StepStatus::Running, None),
            ));
        }
        if let Some(outputs) = &event.res_outputs_event {
            return Some(OperationEvent::Step(
                outputs.metadata.operation_step(StepStatus::Success, None),
            ));
        }
        if let Some(failed) = &event.res_op_failed_event {
            let message = format!("{} failed (status {})", failed.metadata.op, failed.status);
            return Some(OperationEvent::Step(
                failed
                    .metadata
                    .operation_step(StepStatus::Failed, Some(message)),
            ));
        }
        diagnostic(event).map(OperationEvent::Diagnostic)
    }

    fn done() -> Self {
        OperationEvent::Done
    }

    fn error(message: String) -> Self {
        OperationEvent::Error(message)
    }
}

fn diagnostic(event: &EngineEvent) -> Option<Diagnostic> {
    event
        .diagnostic_event
        .as_ref()
        .filter(|diagnostic| !diagnostic.ephemeral)
        .map(DiagnosticEvent::to_diagnostic)
}

/// Message of an error diagnostic, used to explain a failed exit.
pub fn error_message(event: &EngineEvent) -> Option<String> {
    diagnostic(event)
        .filter(|diagnostic| diagnostic.severity == Severity::Error)
        .map(|diagnostic| diagnostic.message)
        .filter(|message| !message.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BUCKET: &str = "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::assets";
    const STACK: &str = "urn:pulumi:dev::shop::pulumi:pulumi:Stack::shop-dev";

    fn line(value: serde_json::Value) -> EngineEvent {
        decode_line(&value.to_string()).unwrap().unwrap()
    }

    #[test]
    fn test_decode_blank_line() {
        assert!(decode_line("   ").unwrap().is_none());
    }

    #[test]
    fn test_preview_update_step_carries_old_and_new() {
        let event = line(json!({
            "sequence": 3,
            "resourcePreEvent": {
                "metadata": {
                    "op": "update",
                    "urn": BUCKET,
                    "type": "aws:s3/bucket:Bucket",
                    "old": { "parent": STACK, "inputs": { "acl": "private" }, "outputs": { "acl": "private" } },
                    "new": { "parent": STACK, "inputs": { "acl": "public-read" } }
                },
                "planning": true
            }
        }));

        let Some(PreviewEvent::Step(step)) = PreviewEvent::decode(&event) else {
            panic!("expected a step");
        };

        assert_eq!(step.op, StepOp::Update);
        assert_eq!(step.name, "assets");
        assert_eq!(step.parent, Some(ResourceUrn::from(STACK)));
        assert_eq!(step.inputs.unwrap()["acl"], json!("public-read"));
        assert_eq!(step.old.unwrap().inputs.unwrap()["acl"], json!("private"));
    }

    #[test]
    fn test_preview_delete_step_has_no_new_state() {
        let event = line(json!({
            "resourcePreEvent": {
                "metadata": {
                    "op": "delete",
                    "urn": BUCKET,
                    "type": "aws:s3/bucket:Bucket",
                    "old": { "parent": STACK, "inputs": { "acl": "private" } }
                }
            }
        }));

        let Some(PreviewEvent::Step(step)) = PreviewEvent::decode(&event) else {
            panic!("expected a step");
        };

        assert_eq!(step.op, StepOp::Delete);
        assert!(step.inputs.is_none());
        assert!(step.old.is_some());
    }

    #[test]
    fn test_operation_statuses() {
        let metadata = json!({ "op": "create", "urn": BUCKET, "type": "aws:s3/bucket:Bucket" });

        let pre = line(json!({ "resourcePreEvent": { "metadata": metadata.clone() } }));
        let outputs = line(json!({ "resOutputsEvent": { "metadata": metadata.clone() } }));
        let failed = line(json!({ "resOpFailedEvent": { "metadata": metadata, "status": 1 } }));

        let status = |event: &EngineEvent| match OperationEvent::decode(event) {
            Some(OperationEvent::Step(step)) => step.status,
            other => panic!("unexpected {other:?}"),
        };

        assert_eq!(status(&pre), StepStatus::Running);
        assert_eq!(status(&outputs), StepStatus::Success);
        assert_eq!(status(&failed), StepStatus::Failed);
    }

    #[test]
    fn test_diagnostics() {
        let event = line(json!({
            "diagnosticEvent": { "message": "quota exceeded\n", "severity": "error" }
        }));
        let ephemeral = line(json!({
            "diagnosticEvent": { "message": "...", "severity": "info", "ephemeral": true }
        }));

        assert_eq!(error_message(&event).as_deref(), Some("quota exceeded"));
        assert!(PreviewEvent::decode(&ephemeral).is_none());
    }

    #[test]
    fn test_unknown_events_are_skipped() {
        let event = line(json!({ "sequence": 1, "preludeEvent": { "config": {} } }));
        assert!(PreviewEvent::decode(&event).is_none());
        assert!(OperationEvent::decode(&event).is_none());
    }
}
