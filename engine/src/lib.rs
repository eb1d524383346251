mod event;
mod kind;
mod options;
mod stack;
mod traits;
mod urn;

pub use crate::event::{
    Diagnostic, OperationEvent, OperationStep, PreviewEvent, PreviewStep, PropertyMap, Severity,
    StepState,
};
pub use crate::kind::{OperationKind, StepOp, StepStatus};
pub use crate::options::OperationOptions;
pub use crate::stack::{
    CommandResult, HistoryEntry, ProjectInfo, ResourceInfo, StackInfo, WhoAmI, WorkspaceInfo,
};
pub use crate::traits::{
    AuthenticateResult, EngineError, OperationExecutor, PluginProvider, StackInitializer,
    StackReader, StateMutator,
};
pub use crate::urn::ResourceUrn;
