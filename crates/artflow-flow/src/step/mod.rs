//! Steps: named units of work.
//!
//! A [`Step`] wraps a function together with its declared [`Signature`] and
//! bound arguments:
//! - [`step`]: wraps an async function
//! - [`step_fn`]: wraps a synchronous function
//! - [`step_stream`]: wraps a function returning a stream of records

mod arguments;
mod products;
mod signature;

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, Stream};
use serde_json::Value;

pub use self::arguments::Arguments;
pub use self::products::{Extent, IntoProducts, ProductStream, Products};
pub use self::signature::Signature;
use crate::error::FlowResult;
use crate::record::Record;

/// A function wrapped by a step.
///
/// Implemented for async closures `Fn(Arguments) -> impl Future<Output =
/// anyhow::Result<impl IntoProducts>>`.
pub trait StepFunction: Send + Sync + 'static {
    /// Invokes the function.
    fn call(&self, args: Arguments) -> BoxFuture<'static, anyhow::Result<Products>>;
}

impl<F, Fut, R> StepFunction for F
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    R: IntoProducts,
{
    fn call(&self, args: Arguments) -> BoxFuture<'static, anyhow::Result<Products>> {
        (self)(args)
            .map(|result| result.map(IntoProducts::into_products))
            .boxed()
    }
}

struct SyncFunction<F>(F);

impl<F, R> StepFunction for SyncFunction<F>
where
    F: Fn(Arguments) -> anyhow::Result<R> + Send + Sync + 'static,
    R: IntoProducts,
{
    fn call(&self, args: Arguments) -> BoxFuture<'static, anyhow::Result<Products>> {
        let result = (self.0)(args).map(IntoProducts::into_products);
        futures::future::ready(result).boxed()
    }
}

struct StreamFunction<F>(F);

impl<F, S> StepFunction for StreamFunction<F>
where
    F: Fn(Arguments) -> S + Send + Sync + 'static,
    S: Stream<Item = anyhow::Result<Record>> + Send + 'static,
{
    fn call(&self, args: Arguments) -> BoxFuture<'static, anyhow::Result<Products>> {
        let products = Products::from_stream((self.0)(args));
        futures::future::ready(Ok(products)).boxed()
    }
}

/// A named unit of work.
///
/// Steps are immutable once composed into a flow and hold no per-run state;
/// the same step may be invoked concurrently for different records.
#[derive(Clone)]
pub struct Step {
    name: String,
    signature: Signature,
    bound: Record,
    function: Arc<dyn StepFunction>,
}

impl Step {
    /// Creates a step wrapping the given function.
    pub fn new(name: impl Into<String>, function: impl StepFunction) -> Self {
        Self {
            name: name.into(),
            signature: Signature::default(),
            bound: Record::new(),
            function: Arc::new(function),
        }
    }

    /// Declares fields that must be present in incoming records.
    pub fn require<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signature = self.signature.with_required(fields);
        self
    }

    /// Declares fields passed to the function when present.
    pub fn optional<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signature = self.signature.with_optional(fields);
        self
    }

    /// Passes every visible field to the function.
    pub fn variadic(mut self) -> Self {
        self.signature = self.signature.with_variadic(true);
        self
    }

    /// Binds a fixed argument, passed with every invocation.
    ///
    /// Bound arguments take precedence over record fields of the same name.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bound.insert(name, value);
        self
    }

    /// Returns the step name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Returns the bound arguments.
    pub fn bound(&self) -> &Record {
        &self.bound
    }

    /// Resolves the arguments for the given visible fields.
    pub(crate) fn resolve(&self, fields: &Record) -> FlowResult<Arguments> {
        self.signature.resolve(&self.name, fields, &self.bound)
    }

    /// Invokes the wrapped function.
    pub(crate) fn call(&self, args: Arguments) -> BoxFuture<'static, anyhow::Result<Products>> {
        self.function.call(args)
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

/// Creates a step wrapping an async function.
pub fn step<F, Fut, R>(name: impl Into<String>, function: F) -> Step
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    R: IntoProducts,
{
    Step::new(name, function)
}

/// Creates a step wrapping a synchronous function.
pub fn step_fn<F, R>(name: impl Into<String>, function: F) -> Step
where
    F: Fn(Arguments) -> anyhow::Result<R> + Send + Sync + 'static,
    R: IntoProducts,
{
    Step::new(name, SyncFunction(function))
}

/// Creates a step wrapping a function that returns a stream of records.
pub fn step_stream<F, S>(name: impl Into<String>, function: F) -> Step
where
    F: Fn(Arguments) -> S + Send + Sync + 'static,
    S: Stream<Item = anyhow::Result<Record>> + Send + 'static,
{
    Step::new(name, StreamFunction(function))
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use serde_json::json;

    use super::*;
    use crate::record;

    #[tokio::test]
    async fn async_step_produces_record() {
        let double = step("double", |args: Arguments| async move {
            let x: i64 = args.get("x")?;
            Ok(record! { "y" => x * 2 })
        })
        .require(["x"]);

        let args = double.resolve(&record! { "x" => 3 }).unwrap();
        let products: Vec<Record> = double
            .call(args)
            .await
            .unwrap()
            .into_stream()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(products, [record! { "y" => 6 }]);
    }

    #[tokio::test]
    async fn sync_step_with_bound_argument() {
        let scale = step_fn("scale", |args: Arguments| {
            let x: f64 = args.get("x")?;
            let factor: f64 = args.get("factor")?;
            Ok(record! { "x" => x * factor })
        })
        .require(["x"])
        .bind("factor", 1.5);

        assert_eq!(scale.bound().get("factor"), Some(&json!(1.5)));

        let args = scale.resolve(&record! { "x" => 2.0 }).unwrap();
        let products: Vec<Record> = scale
            .call(args)
            .await
            .unwrap()
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(products, [record! { "x" => 3.0 }]);
    }

    #[tokio::test]
    async fn stream_step_yields_many() {
        let expand = step_stream("expand", |args: Arguments| {
            let n: i64 = args.get("n").unwrap_or(0);
            futures::stream::iter((0..n).map(|i| Ok(record! { "i" => i })))
        })
        .require(["n"]);

        let args = expand.resolve(&record! { "n" => 3 }).unwrap();
        let products: Vec<Record> = expand
            .call(args)
            .await
            .unwrap()
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(products.len(), 3);
    }

    #[test]
    fn resolve_reports_missing_field() {
        let judge = step_fn("judge", |_args: Arguments| Ok(None::<Record>)).require(["metric"]);
        let error = judge.resolve(&record! { "x" => 1 }).unwrap_err();
        assert_eq!(error.step(), Some("judge"));
    }
}
