use super::TaskContext;
use ostk_common::{Parameters, Records};
use std::collections::BTreeMap;

/// A blocking data-retrieval operation run inside a worker process.
///
/// Return `Ok(Some(records))` with rows, `Ok(None)` (or empty records) when
/// there is nothing to return, and `Err` on failure. Panics are caught and
/// reported as failures.
pub trait Operation: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn run(&self, parameters: &Parameters, ctx: &TaskContext) -> anyhow::Result<Option<Records>>;
}

/// Operations a worker can run, by name.
#[derive(Default)]
pub struct OperationRegistry {
    operations: BTreeMap<String, Box<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation, replacing any previous one with the same name.
    pub fn register(&mut self, operation: impl Operation + 'static) -> &mut Self {
        self.operations
            .insert(operation.name().to_string(), Box::new(operation));
        self
    }

    pub fn with(mut self, operation: impl Operation + 'static) -> Self {
        self.register(operation);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Operation> {
        self.operations.get(name).map(|op| op.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Operation> {
        self.operations.values().map(|op| op.as_ref())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Operation for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn run(&self, _: &Parameters, _: &TaskContext) -> anyhow::Result<Option<Records>> {
            Ok(None)
        }
    }

    #[test]
    fn lookup_by_name() {
        let registry = OperationRegistry::new().with(Named("b")).with(Named("a"));
        assert_eq!(registry.len(), 2);
        assert!(registry.get("a").is_some());
        assert!(registry.get("c").is_none());
        let names: Vec<_> = registry.iter().map(|op| op.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
