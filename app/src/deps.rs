use std::sync::Arc;

use strata_engine::{
    OperationExecutor, PluginProvider, StackInitializer, StackReader, StateMutator,
};

pub trait Clipboard: Send + Sync {
    fn copy(&self, text: &str) -> Result<(), String>;
}

/// The app's collaborators, injected so tests can substitute fakes.
#[derive(Clone)]
pub struct Dependencies {
    pub executor: Arc<dyn OperationExecutor>,
    pub reader: Arc<dyn StackReader>,
    pub mutator: Arc<dyn StateMutator>,
    pub initializer: Arc<dyn StackInitializer>,
    pub plugins: Arc<dyn PluginProvider>,
    pub clipboard: Arc<dyn Clipboard>,
}
