use std::{path::PathBuf, time::Duration};

use strata_engine::ResourceUrn;

use crate::message::AuthPurpose;

/// Which credentials to drop before authenticating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidate {
    Nothing,
    Context,
    All,
}

/// Who asked for the stack list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackListFor {
    Init,
    Selector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub resource_type: String,
    pub name: String,
    pub id: String,
    pub parent: Option<ResourceUrn>,
}

/// Side effects requested by the update loop. Each one answers with at
/// most one message, except the waits, which deliver the next stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CheckWorkspace {
        workdir: PathBuf,
    },
    Authenticate {
        workdir: PathBuf,
        program_name: String,
        stack: Option<String>,
        purpose: AuthPurpose,
        invalidate: Invalidate,
        /// Busy-lock ticket, echoed back in the reply.
        ticket: u64,
    },
    FetchStacks {
        workdir: PathBuf,
        purpose: StackListFor,
    },
    FetchWorkspaces {
        cwd: PathBuf,
        workdir: PathBuf,
    },
    FetchProjectInfo {
        workdir: PathBuf,
    },
    FetchWhoAmI {
        workdir: PathBuf,
    },
    LoadResources {
        workdir: PathBuf,
        stack: String,
        during_init: bool,
    },
    FetchHistory {
        workdir: PathBuf,
        stack: String,
        page_size: usize,
        page: usize,
    },
    InitStack {
        workdir: PathBuf,
        name: String,
    },
    BulkStateDelete {
        workdir: PathBuf,
        stack: String,
        urns: Vec<ResourceUrn>,
    },
    SetProtect {
        workdir: PathBuf,
        stack: String,
        urn: ResourceUrn,
        protect: bool,
    },
    Import {
        workdir: PathBuf,
        stack: String,
        request: ImportRequest,
    },
    CopyToClipboard(String),
    /// Deliver the next event of the open preview stream.
    WaitPreview,
    /// Deliver the next event of the open execution stream.
    WaitOperation,
    ExpireToast {
        id: u64,
        after: Duration,
    },
    CancelTimeout {
        generation: u64,
        after: Duration,
    },
}
