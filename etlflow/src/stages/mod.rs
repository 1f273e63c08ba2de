//! Action trait and implementations.
//!
//! Actions are the units of work wrapped by pipeline stages. Every
//! extraction, transform, load or query collaborator implements [`Action`],
//! so the engine only ever sees record streams and classified errors.

use crate::context::{ActionContext, StageInputs};
use crate::core::{RecordStream, StageKind};
use crate::errors::ActionError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// The outcome of one action invocation.
///
/// `Ok(None)` is a void success (loads, queries, commands).
pub type ActionResult = Result<Option<RecordStream>, ActionError>;

/// Trait for stage actions.
///
/// An action consumes the named output streams of its stage's dependencies
/// and produces zero or one stream, or fails with exactly one classified
/// error. Actions must not hand back partial output on failure.
#[async_trait]
pub trait Action: Send + Sync + Debug {
    /// Executes the action.
    ///
    /// # Arguments
    ///
    /// * `inputs` - Output streams of the stage's dependencies
    /// * `ctx` - The run and attempt the invocation belongs to
    async fn execute(&self, inputs: &StageInputs, ctx: &ActionContext) -> ActionResult;

    /// The kind of work this action performs, for reporting.
    fn kind(&self) -> StageKind {
        StageKind::Transform
    }
}

/// A simple function-based action.
pub struct FnAction<F>
where
    F: Fn(&StageInputs, &ActionContext) -> ActionResult + Send + Sync,
{
    label: String,
    kind: StageKind,
    func: F,
}

impl<F> FnAction<F>
where
    F: Fn(&StageInputs, &ActionContext) -> ActionResult + Send + Sync,
{
    /// Creates a new function-based action.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            kind: StageKind::Transform,
            func,
        }
    }

    /// Sets the reported kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }
}

impl<F> Debug for FnAction<F>
where
    F: Fn(&StageInputs, &ActionContext) -> ActionResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAction")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .finish()
    }
}

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: Fn(&StageInputs, &ActionContext) -> ActionResult + Send + Sync,
{
    async fn execute(&self, inputs: &StageInputs, ctx: &ActionContext) -> ActionResult {
        (self.func)(inputs, ctx)
    }

    fn kind(&self) -> StageKind {
        self.kind
    }
}

/// An async function-based action.
///
/// The function receives owned copies of the inputs and context so the
/// returned future can be `'static`.
pub struct AsyncFnAction<F, Fut>
where
    F: Fn(StageInputs, ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = ActionResult> + Send,
{
    label: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnAction<F, Fut>
where
    F: Fn(StageInputs, ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = ActionResult> + Send,
{
    /// Creates a new async function-based action.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnAction<F, Fut>
where
    F: Fn(StageInputs, ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = ActionResult> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnAction")
            .field("label", &self.label)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> Action for AsyncFnAction<F, Fut>
where
    F: Fn(StageInputs, ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = ActionResult> + Send,
{
    async fn execute(&self, inputs: &StageInputs, ctx: &ActionContext) -> ActionResult {
        (self.func)(inputs.clone(), ctx.clone()).await
    }
}

/// An action that does nothing and produces no stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAction;

#[async_trait]
impl Action for NoOpAction {
    async fn execute(&self, _inputs: &StageInputs, _ctx: &ActionContext) -> ActionResult {
        Ok(None)
    }
}

/// An action that always emits a copy of the same stream.
#[derive(Debug, Clone)]
pub struct ConstantAction {
    stream: RecordStream,
}

impl ConstantAction {
    /// Creates a constant source.
    #[must_use]
    pub fn new(stream: RecordStream) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl Action for ConstantAction {
    async fn execute(&self, _inputs: &StageInputs, _ctx: &ActionContext) -> ActionResult {
        Ok(Some(self.stream.clone()))
    }

    fn kind(&self) -> StageKind {
        StageKind::Extract
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Schema, Value};
    use std::collections::HashMap;

    fn one_row() -> RecordStream {
        RecordStream::from_rows(Schema::text(["id"]).unwrap(), vec![vec![Value::text("1")]]).unwrap()
    }

    #[tokio::test]
    async fn test_fn_action() {
        let action = FnAction::new("count", |inputs: &StageInputs, _ctx: &ActionContext| {
            let n = inputs.require("src")?.len();
            let schema = Schema::new(vec![crate::core::Field::number("n")])?;
            Ok(Some(RecordStream::from_rows(schema, vec![vec![Value::Number(n as f64)]])?))
        })
        .with_kind(StageKind::Query);

        let inputs = StageInputs::permissive(HashMap::from([("src".to_string(), one_row())]), "count");
        let out = action
            .execute(&inputs, &ActionContext::detached("count"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(out.rows()[0][0].as_f64(), Some(1.0));
        assert_eq!(action.kind(), StageKind::Query);
    }

    #[tokio::test]
    async fn test_async_fn_action() {
        let action = AsyncFnAction::new("echo", |_inputs, ctx: ActionContext| async move {
            if ctx.attempt() == 1 {
                Ok(None)
            } else {
                Err(ActionError::other("unexpected attempt"))
            }
        });

        let result = action
            .execute(&StageInputs::root("echo"), &ActionContext::detached("echo"))
            .await;
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_noop_and_constant_actions() {
        let ctx = ActionContext::detached("s");
        let inputs = StageInputs::root("s");

        assert!(tokio_test::block_on(NoOpAction.execute(&inputs, &ctx)).unwrap().is_none());

        let constant = ConstantAction::new(one_row());
        let out = tokio_test::block_on(constant.execute(&inputs, &ctx)).unwrap().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(constant.kind(), StageKind::Extract);
    }
}
