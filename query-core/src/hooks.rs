//! The Hook Pipeline (spec §4.8, read-path only): before-select hooks may
//! adjust the parsed request before it reaches a connector; after-select
//! hooks run once against the raw page and may transform records in place
//! (JSON parsing, timestamp coercion). Hooks are composable, run in
//! registration order, and any error aborts the operation — there is no
//! partial-success result for a failed hook.
//!
//! Per the design notes on hooks without mutable globals, a [`HookRegistry`]
//! is built once by its owner and treated as immutable afterwards; there is
//! no dynamic registration API here.

use query_connector::QueryArguments;
use query_structure::Record;

use crate::error::CoreError;

pub type BeforeSelectHook = Box<dyn Fn(&mut QueryArguments) -> Result<(), CoreError> + Send + Sync>;
pub type AfterSelectHook = Box<dyn Fn(&mut [Record]) -> Result<(), CoreError> + Send + Sync>;

#[derive(Default)]
pub struct HookRegistry {
    before_select: Vec<BeforeSelectHook>,
    after_select: Vec<AfterSelectHook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_before_select(&mut self, hook: BeforeSelectHook) {
        self.before_select.push(hook);
    }

    pub fn register_after_select(&mut self, hook: AfterSelectHook) {
        self.after_select.push(hook);
    }

    pub fn run_before_select(&self, args: &mut QueryArguments) -> Result<(), CoreError> {
        for hook in &self.before_select {
            hook(args)?;
        }
        Ok(())
    }

    pub fn run_after_select(&self, records: &mut [Record]) -> Result<(), CoreError> {
        for hook in &self.after_select {
            hook(records)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_connector::{MetaRequest, Pagination};
    use query_structure::Value;

    fn args() -> QueryArguments {
        QueryArguments {
            table_name: "user".to_string(),
            fields: ["id"].iter().map(|s| s.to_string()).collect(),
            filter: None,
            sort: vec![],
            pagination: Pagination { page: 1, limit: 20 },
            meta: MetaRequest::default(),
            deep: Default::default(),
            debug_mode: false,
        }
    }

    #[test]
    fn before_select_hooks_run_in_registration_order() {
        let mut registry = HookRegistry::new();
        registry.register_before_select(Box::new(|a| {
            a.pagination.limit = 5;
            Ok(())
        }));
        registry.register_before_select(Box::new(|a| {
            a.pagination.limit *= 2;
            Ok(())
        }));

        let mut a = args();
        registry.run_before_select(&mut a).unwrap();
        assert_eq!(a.pagination.limit, 10);
    }

    #[test]
    fn an_erroring_hook_aborts_without_running_the_rest() {
        let mut registry = HookRegistry::new();
        registry.register_after_select(Box::new(|_| Err(CoreError::hook("boom"))));
        registry.register_after_select(Box::new(|records| {
            records[0].insert("touched".to_string(), Value::Boolean(true));
            Ok(())
        }));

        let mut records = vec![Record::new()];
        let result = registry.run_after_select(&mut records);
        assert!(result.is_err());
        assert!(!records[0].contains_key("touched"));
    }
}
