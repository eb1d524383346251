use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// An operation that mutates a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Up,
    Refresh,
    Destroy,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Up,
        OperationKind::Refresh,
        OperationKind::Destroy,
    ];

    pub fn command(self) -> &'static str {
        match self {
            OperationKind::Up => "up",
            OperationKind::Refresh => "refresh",
            OperationKind::Destroy => "destroy",
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// What a step does to a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOp {
    Create,
    Update,
    Delete,
    #[default]
    Same,
    Replace,
    Refresh,
}

impl StepOp {
    pub const ALL: [StepOp; 6] = [
        StepOp::Create,
        StepOp::Update,
        StepOp::Delete,
        StepOp::Same,
        StepOp::Replace,
        StepOp::Refresh,
    ];

    /// Map an engine op name onto the display ops.
    ///
    /// Replacement sub-steps collapse into `Replace`, reads and imports count
    /// as creations of state, unknown names are treated as `Same`.
    pub fn from_engine(op: &str) -> Self {
        match op {
            "create" | "import" | "read" => StepOp::Create,
            "update" => StepOp::Update,
            "delete" | "discard" => StepOp::Delete,
            "replace" | "create-replacement" | "delete-replaced" | "import-replacement"
            | "read-replacement" | "discard-replaced" => StepOp::Replace,
            "refresh" => StepOp::Refresh,
            _ => StepOp::Same,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            StepOp::Create => "+",
            StepOp::Update => "~",
            StepOp::Delete => "-",
            StepOp::Same => " ",
            StepOp::Replace => "+-",
            StepOp::Refresh => "r",
        }
    }
}

impl Display for StepOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepOp::Create => "create",
            StepOp::Update => "update",
            StepOp::Delete => "delete",
            StepOp::Same => "same",
            StepOp::Replace => "replace",
            StepOp::Refresh => "refresh",
        };
        f.write_str(label)
    }
}

/// Progress of one step during an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
}
