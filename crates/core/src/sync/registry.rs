//! Executor registry: operation kind -> remote executor

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::ports::OperationExecutor;

/// Registry of per-kind executors supplied by feature modules.
///
/// Registration happens at startup; lookups happen on every dispatch. An
/// operation whose kind has no registered executor can never succeed and is
/// dead-lettered by the engine.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn OperationExecutor>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the executor for an operation kind, replacing any previous
    /// registration.
    pub fn register(&self, kind: impl Into<String>, executor: Arc<dyn OperationExecutor>) {
        let kind = kind.into();
        let mut executors = self.write_lock();
        if executors.insert(kind.clone(), executor).is_some() {
            warn!(kind = %kind, "replacing previously registered executor");
        }
    }

    /// Look up the executor for an operation kind.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn OperationExecutor>> {
        self.read_lock().get(kind).cloned()
    }

    /// Registered kinds, for diagnostics.
    pub fn kinds(&self) -> Vec<String> {
        self.read_lock().keys().cloned().collect()
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn OperationExecutor>>> {
        match self.executors.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_lock(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn OperationExecutor>>> {
        match self.executors.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tideline_domain::QueuedOperation;

    use super::*;
    use crate::sync::DispatchError;

    struct NoopExecutor;

    #[async_trait]
    impl OperationExecutor for NoopExecutor {
        async fn execute(&self, _op: &QueuedOperation) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = ExecutorRegistry::new();
        registry.register("journal.create", Arc::new(NoopExecutor));

        assert!(registry.get("journal.create").is_some());
        assert!(registry.get("journal.delete").is_none());
        assert_eq!(registry.kinds(), vec!["journal.create".to_string()]);
    }

    #[test]
    fn re_registration_replaces_executor() {
        let registry = ExecutorRegistry::new();
        registry.register("meals.update", Arc::new(NoopExecutor));
        registry.register("meals.update", Arc::new(NoopExecutor));

        assert_eq!(registry.kinds().len(), 1);
    }
}
