//! Folding streamed engine events into lifecycle state and display items.
//!
//! Everything here is pure: callers apply the returned deltas.

use strata_engine::{Diagnostic, OperationEvent, PreviewEvent, PreviewStep};

use crate::{
    item::{ItemStatus, ResourceItem},
    state::{InitState, OperationState},
};

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewEventResult {
    pub new_op_state: OperationState,
    /// Set when this event finishes the initial load.
    pub init_done: bool,
    pub has_error: bool,
    pub error: Option<String>,
    pub item: Option<ResourceItem>,
    pub diagnostic: Option<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationEventResult {
    pub new_op_state: OperationState,
    pub has_error: bool,
    pub error: Option<String>,
    pub done: bool,
    pub item: Option<ResourceItem>,
    pub diagnostic: Option<Diagnostic>,
}

/// The first event of any kind means the engine is running.
fn promote(current: OperationState) -> OperationState {
    match current {
        OperationState::Starting => OperationState::Running,
        other => other,
    }
}

pub fn process_preview_event(
    event: &PreviewEvent,
    current: OperationState,
    init_state: InitState,
) -> PreviewEventResult {
    let mut result = PreviewEventResult {
        new_op_state: promote(current),
        init_done: false,
        has_error: false,
        error: None,
        item: None,
        diagnostic: None,
    };
    let loading = init_state == InitState::LoadingResources;

    match event {
        PreviewEvent::Error(message) => {
            result.new_op_state = OperationState::Error;
            result.has_error = true;
            result.error = Some(message.clone());
            result.init_done = loading;
        }
        PreviewEvent::Done => {
            result.new_op_state = OperationState::Complete;
            result.init_done = loading;
        }
        PreviewEvent::Step(step) => result.item = Some(preview_item(step)),
        PreviewEvent::Diagnostic(diagnostic) => result.diagnostic = Some(diagnostic.clone()),
    }
    result
}

/// A delete has no new state, so it shows the state being removed. Any
/// other step falls back to the old state field by field.
fn preview_item(step: &PreviewStep) -> ResourceItem {
    let old = step.old.as_ref();
    let old_inputs = old.and_then(|old| old.inputs.clone());
    let old_outputs = old.and_then(|old| old.outputs.clone());

    let (inputs, outputs) = match old {
        Some(old) if step.op == strata_engine::StepOp::Delete => {
            (old.inputs.clone(), old.outputs.clone())
        }
        _ => (
            step.inputs.clone().or_else(|| old_inputs.clone()),
            step.outputs.clone().or_else(|| old_outputs.clone()),
        ),
    };

    ResourceItem {
        urn: step.urn.clone(),
        resource_type: step.resource_type.clone(),
        name: step.name.clone(),
        parent: step.parent.clone(),
        op: step.op,
        status: ItemStatus::None,
        inputs,
        outputs,
        old_inputs,
        old_outputs,
        ..Default::default()
    }
}

pub fn process_operation_event(
    event: &OperationEvent,
    current: OperationState,
) -> OperationEventResult {
    let mut result = OperationEventResult {
        new_op_state: promote(current),
        has_error: false,
        error: None,
        done: false,
        item: None,
        diagnostic: None,
    };

    match event {
        OperationEvent::Error(message) => {
            result.new_op_state = OperationState::Error;
            result.has_error = true;
            result.error = Some(message.clone());
        }
        // Accepted even while cancelling.
        OperationEvent::Done => {
            result.new_op_state = OperationState::Complete;
            result.done = true;
        }
        OperationEvent::Step(step) if !step.urn.is_empty() => {
            result.item = Some(ResourceItem {
                urn: step.urn.clone(),
                resource_type: step.resource_type.clone(),
                name: step.name.clone(),
                parent: step.parent.clone(),
                op: step.op,
                status: step.status.into(),
                message: step.message.clone(),
                ..Default::default()
            });
        }
        OperationEvent::Step(_) => {}
        OperationEvent::Diagnostic(diagnostic) => result.diagnostic = Some(diagnostic.clone()),
    }
    result
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strata_engine::{
        OperationStep, PropertyMap, ResourceUrn, Severity, StepOp, StepState, StepStatus,
    };

    use super::*;

    fn props(value: serde_json::Value) -> PropertyMap {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn old(inputs: Option<PropertyMap>, outputs: Option<PropertyMap>) -> Option<StepState> {
        Some(StepState { inputs, outputs })
    }

    fn preview_events() -> Vec<PreviewEvent> {
        vec![
            PreviewEvent::Step(PreviewStep {
                urn: "urn:a".into(),
                ..Default::default()
            }),
            PreviewEvent::Diagnostic(Diagnostic {
                urn: None,
                severity: Severity::Info,
                message: "hello".into(),
            }),
            PreviewEvent::Done,
            PreviewEvent::Error("boom".into()),
        ]
    }

    fn operation_events() -> Vec<OperationEvent> {
        vec![
            OperationEvent::Step(OperationStep {
                urn: "urn:a".into(),
                resource_type: String::new(),
                name: "a".into(),
                parent: None,
                op: StepOp::Create,
                status: StepStatus::Running,
                message: None,
            }),
            OperationEvent::Diagnostic(Diagnostic {
                urn: None,
                severity: Severity::Warning,
                message: "careful".into(),
            }),
            OperationEvent::Done,
            OperationEvent::Error("boom".into()),
        ]
    }

    #[test]
    fn test_delete_shows_old_state() {
        let cases = [
            (None, None),
            (Some(props(json!({ "acl": "public" }))), None),
            (None, Some(props(json!({ "arn": "new" })))),
        ];
        for (inputs, outputs) in cases {
            let old_inputs = Some(props(json!({ "acl": "private" })));
            let old_outputs = Some(props(json!({ "arn": "old" })));
            let step = PreviewStep {
                urn: "urn:bucket".into(),
                op: StepOp::Delete,
                inputs,
                outputs,
                old: old(old_inputs.clone(), old_outputs.clone()),
                ..Default::default()
            };

            let result = process_preview_event(
                &PreviewEvent::Step(step),
                OperationState::Running,
                InitState::Complete,
            );

            let item = result.item.unwrap();
            assert_eq!(item.inputs, old_inputs);
            assert_eq!(item.outputs, old_outputs);
        }
    }

    #[test]
    fn test_missing_fields_fall_back_to_old_state() {
        let step = PreviewStep {
            urn: "urn:fn".into(),
            op: StepOp::Update,
            inputs: Some(props(json!({ "mem": 256 }))),
            old: old(
                Some(props(json!({ "mem": 128 }))),
                Some(props(json!({ "arn": "arn:fn" }))),
            ),
            ..Default::default()
        };

        let item = process_preview_event(
            &PreviewEvent::Step(step),
            OperationState::Running,
            InitState::Complete,
        )
        .item
        .unwrap();

        assert_eq!(item.inputs, Some(props(json!({ "mem": 256 }))));
        assert_eq!(item.outputs, Some(props(json!({ "arn": "arn:fn" }))));
    }

    #[test]
    fn test_old_state_is_preserved() {
        for op in StepOp::ALL {
            let old_inputs = Some(props(json!({ "mem": 128 })));
            let step = PreviewStep {
                urn: "urn:fn".into(),
                op,
                inputs: Some(props(json!({ "mem": 256 }))),
                old: old(old_inputs.clone(), None),
                ..Default::default()
            };

            let item = process_preview_event(
                &PreviewEvent::Step(step),
                OperationState::Running,
                InitState::Complete,
            )
            .item
            .unwrap();

            assert_eq!(item.old_inputs, old_inputs, "{op}");
            assert_eq!(item.old_outputs, None, "{op}");
        }
    }

    #[test]
    fn test_starting_promotes_to_running() {
        for event in preview_events() {
            if matches!(event, PreviewEvent::Done | PreviewEvent::Error(_)) {
                continue;
            }
            for init_state in InitState::ALL {
                let result = process_preview_event(&event, OperationState::Starting, init_state);
                assert_eq!(result.new_op_state, OperationState::Running, "{event:?}");
            }
        }
        for event in operation_events() {
            if matches!(event, OperationEvent::Done | OperationEvent::Error(_)) {
                continue;
            }
            let result = process_operation_event(&event, OperationState::Starting);
            assert_eq!(result.new_op_state, OperationState::Running, "{event:?}");
        }
    }

    #[test]
    fn test_init_done_only_while_loading_resources() {
        for init_state in InitState::ALL {
            for op_state in OperationState::ALL {
                for event in preview_events() {
                    let terminal = matches!(event, PreviewEvent::Done | PreviewEvent::Error(_));
                    let result = process_preview_event(&event, op_state, init_state);
                    assert_eq!(
                        result.init_done,
                        terminal && init_state == InitState::LoadingResources,
                        "{init_state:?} {op_state:?} {event:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_done_completes_a_cancelling_operation() {
        let result = process_operation_event(&OperationEvent::Done, OperationState::Cancelling);
        assert_eq!(result.new_op_state, OperationState::Complete);
        assert!(result.done);
        assert!(!result.has_error);
    }

    #[test]
    fn test_error_from_any_state() {
        for op_state in OperationState::ALL {
            let result =
                process_operation_event(&OperationEvent::Error("boom".into()), op_state);
            assert_eq!(result.new_op_state, OperationState::Error);
            assert_eq!(result.error.as_deref(), Some("boom"));
        }
    }

    #[test]
    fn test_operation_step_without_urn_has_no_item() {
        let step = OperationStep {
            urn: ResourceUrn::default(),
            resource_type: String::new(),
            name: String::new(),
            parent: None,
            op: StepOp::Same,
            status: StepStatus::Running,
            message: None,
        };
        let result = process_operation_event(&OperationEvent::Step(step), OperationState::Running);
        assert!(result.item.is_none());
    }

    #[test]
    fn test_operation_status_mapping() {
        for (status, expected) in [
            (StepStatus::Pending, ItemStatus::Pending),
            (StepStatus::Running, ItemStatus::Running),
            (StepStatus::Success, ItemStatus::Success),
            (StepStatus::Failed, ItemStatus::Failed),
        ] {
            let step = OperationStep {
                urn: "urn:a".into(),
                resource_type: String::new(),
                name: "a".into(),
                parent: None,
                op: StepOp::Update,
                status,
                message: None,
            };
            let item = process_operation_event(&OperationEvent::Step(step), OperationState::Running)
                .item
                .unwrap();
            assert_eq!(item.status, expected);
        }
    }

    #[test]
    fn test_preview_stream_with_create_and_update() {
        let stream = [
            PreviewEvent::Step(PreviewStep {
                urn: "urn:bucket".into(),
                name: "bucket".into(),
                op: StepOp::Create,
                inputs: Some(props(json!({ "acl": "private" }))),
                ..Default::default()
            }),
            PreviewEvent::Step(PreviewStep {
                urn: "urn:func".into(),
                name: "func".into(),
                op: StepOp::Update,
                inputs: Some(props(json!({ "mem": 256 }))),
                old: old(Some(props(json!({ "mem": 128 }))), None),
                ..Default::default()
            }),
            PreviewEvent::Done,
        ];

        let mut op_state = OperationState::Starting;
        let mut items = Vec::new();
        for event in &stream {
            let result = process_preview_event(event, op_state, InitState::Complete);
            op_state = result.new_op_state;
            items.extend(result.item);
        }

        assert_eq!(op_state, OperationState::Complete);
        assert_eq!(items.len(), 2);
        let update = &items[1];
        assert_eq!(update.old_inputs.as_ref().unwrap()["mem"], json!(128));
        assert_eq!(update.inputs.as_ref().unwrap()["mem"], json!(256));
    }

    #[test]
    fn test_preview_error_while_loading_resources() {
        let result = process_preview_event(
            &PreviewEvent::Error("quota exceeded".into()),
            OperationState::Starting,
            InitState::LoadingResources,
        );

        assert_eq!(result.new_op_state, OperationState::Error);
        assert!(result.init_done);
        assert!(result.has_error);
        assert!(result.item.is_none());
    }
}
