//! Explicit interception registry.
//!
//! Functions are registered with a [`Declaration`] and a body. Registration
//! picks the wrapper once, from the declaration: a [`BlockingCall`] for
//! blocking functions and a [`SuspendingCall`] for suspendable ones. Each
//! dispatched call is classified from its arguments and checked against the
//! wrapper before the body runs.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use timed::{Argument, Declaration, Dispatch, InterceptedCall, Interceptor, MemorySink, Step};
//!
//! let sink = Arc::new(MemorySink::new());
//! let mut interceptor = Interceptor::<Value, String>::new(sink.clone());
//!
//! interceptor
//!     .register_blocking(Declaration::blocking("demo::Math::double").timed(), |args| {
//!         let n = args.first().and_then(Value::as_i64).ok_or("expected a number")?;
//!         Ok(json!(n * 2))
//!     })
//!     .unwrap();
//!
//! let call = InterceptedCall::new("demo::Math::double", vec![Argument::value(21)]);
//! match interceptor.dispatch(call).unwrap() {
//!     Dispatch::Returned(outcome) => assert_eq!(outcome, Ok(json!(42))),
//!     other => panic!("unexpected {:?}", other),
//! }
//! assert_eq!(sink.len(), 1);
//! ```

use crate::classify::{classify, Argument, CallShape, InterceptedCall};
use crate::config::{DoubleResumptionPolicy, TimingConfig};
use crate::error::{TimedError, TimedResult};
use crate::handle::{BoxedHandle, Continuation};
use crate::marker::Declaration;
use crate::signature::Signature;
use crate::sink::SharedSink;
use crate::suspend::{settle, Invocation, ProxyHandle, Step};
use crate::timing::{time_blocking_with, CallTimer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Body of a blocking function.
pub type BlockingBody<T, E> = Box<dyn Fn(Vec<Value>) -> Result<T, E> + Send + Sync>;

/// Body of a suspendable function. The handle it receives is the one to
/// resume if it returns [`Step::Suspended`].
pub type SuspendingBody<T, E> = Box<dyn Fn(Vec<Value>, BoxedHandle<T, E>) -> Step<T, E> + Send + Sync>;

/// Result of dispatching an intercepted call.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch<T, E> {
    /// A synchronous call returned this outcome.
    Returned(Result<T, E>),
    /// A suspending call finished; its handle already holds the outcome.
    Completed,
    /// A suspending call suspended; its handle will receive the outcome.
    Suspended,
}

impl<T, E> From<Invocation> for Dispatch<T, E> {
    fn from(invocation: Invocation) -> Self {
        match invocation {
            Invocation::Completed => Dispatch::Completed,
            Invocation::Suspended => Dispatch::Suspended,
        }
    }
}

/// A registered function behind its wrapper.
pub trait TimedCall<T, E>: Send + Sync {
    /// The declaration this wrapper was built from.
    fn declaration(&self) -> &Declaration;

    /// The call shape this wrapper handles.
    fn shape(&self) -> CallShape;

    /// Check whether calls are being timed.
    fn is_timed(&self) -> bool;

    /// Invoke the body with the leading values and the trailing handle, if any.
    fn call(&self, arguments: Vec<Value>, resumption: Option<BoxedHandle<T, E>>) -> TimedResult<Dispatch<T, E>>;
}

/// Wrapper for blocking functions.
pub struct BlockingCall<T, E> {
    declaration: Declaration,
    sink: Option<SharedSink>,
    body: BlockingBody<T, E>,
}

impl<T, E> BlockingCall<T, E> {
    /// Wrap `body`. With no sink the body runs untimed.
    pub fn new(declaration: Declaration, sink: Option<SharedSink>, body: BlockingBody<T, E>) -> Self {
        Self { declaration, sink, body }
    }
}

impl<T, E> TimedCall<T, E> for BlockingCall<T, E> {
    fn declaration(&self) -> &Declaration {
        &self.declaration
    }

    fn shape(&self) -> CallShape {
        CallShape::Synchronous
    }

    fn is_timed(&self) -> bool {
        self.sink.is_some()
    }

    fn call(&self, arguments: Vec<Value>, resumption: Option<BoxedHandle<T, E>>) -> TimedResult<Dispatch<T, E>> {
        if resumption.is_some() {
            return Err(TimedError::ShapeMismatch {
                signature: self.declaration.signature.clone(),
                reason: "blocking function called with a resumption handle".to_string(),
            });
        }

        let outcome = match &self.sink {
            Some(sink) => time_blocking_with(self.declaration.signature.clone(), sink.clone(), || {
                (self.body)(arguments)
            }),
            None => (self.body)(arguments),
        };

        Ok(Dispatch::Returned(outcome))
    }
}

impl<T, E> fmt::Debug for BlockingCall<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingCall")
            .field("declaration", &self.declaration)
            .field("timed", &self.sink.is_some())
            .finish()
    }
}

/// Wrapper for suspendable functions.
pub struct SuspendingCall<T, E> {
    declaration: Declaration,
    sink: Option<SharedSink>,
    policy: DoubleResumptionPolicy,
    body: SuspendingBody<T, E>,
}

impl<T, E> SuspendingCall<T, E> {
    /// Wrap `body`. With no sink the body runs untimed.
    pub fn new(
        declaration: Declaration,
        sink: Option<SharedSink>,
        policy: DoubleResumptionPolicy,
        body: SuspendingBody<T, E>,
    ) -> Self {
        Self {
            declaration,
            sink,
            policy,
            body,
        }
    }
}

impl<T, E> TimedCall<T, E> for SuspendingCall<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn declaration(&self) -> &Declaration {
        &self.declaration
    }

    fn shape(&self) -> CallShape {
        CallShape::Suspending
    }

    fn is_timed(&self) -> bool {
        self.sink.is_some()
    }

    fn call(&self, arguments: Vec<Value>, resumption: Option<BoxedHandle<T, E>>) -> TimedResult<Dispatch<T, E>> {
        let signature = &self.declaration.signature;
        let original = resumption.ok_or_else(|| TimedError::ShapeMismatch {
            signature: signature.clone(),
            reason: "suspendable function called without a trailing resumption handle".to_string(),
        })?;

        let timer = self
            .sink
            .as_ref()
            .map(|sink| CallTimer::start(signature.clone(), sink.clone()));
        let proxy = ProxyHandle::new(signature.clone(), timer, original, self.policy);
        let invocation = settle(proxy, |proxy| (self.body)(arguments, Box::new(proxy)))?;

        Ok(invocation.into())
    }
}

impl<T, E> fmt::Debug for SuspendingCall<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspendingCall")
            .field("declaration", &self.declaration)
            .field("timed", &self.sink.is_some())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Registry of intercepted functions.
pub struct Interceptor<T, E> {
    calls: HashMap<Signature, Box<dyn TimedCall<T, E>>>,
    sink: SharedSink,
    config: TimingConfig,
}

impl<T, E> Interceptor<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create an interceptor recording to `sink` with default settings.
    pub fn new(sink: SharedSink) -> Self {
        Self::with_config(sink, TimingConfig::default())
    }

    /// Create an interceptor recording to `sink`.
    pub fn with_config(sink: SharedSink, config: TimingConfig) -> Self {
        Self {
            calls: HashMap::new(),
            sink,
            config,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Register a blocking function.
    ///
    /// Registering the same signature again replaces the earlier entry.
    pub fn register_blocking<F>(&mut self, declaration: Declaration, body: F) -> TimedResult<()>
    where
        F: Fn(Vec<Value>) -> Result<T, E> + Send + Sync + 'static,
    {
        if declaration.is_suspendable() {
            return Err(TimedError::ShapeMismatch {
                signature: declaration.signature,
                reason: "suspendable declaration registered with a blocking body".to_string(),
            });
        }

        let sink = self.sink_for(&declaration);
        let signature = declaration.signature.clone();
        self.insert(signature, Box::new(BlockingCall::new(declaration, sink, Box::new(body))));
        Ok(())
    }

    /// Register a suspendable function.
    ///
    /// Registering the same signature again replaces the earlier entry.
    pub fn register_suspending<F>(&mut self, declaration: Declaration, body: F) -> TimedResult<()>
    where
        F: Fn(Vec<Value>, BoxedHandle<T, E>) -> Step<T, E> + Send + Sync + 'static,
    {
        if !declaration.is_suspendable() {
            return Err(TimedError::ShapeMismatch {
                signature: declaration.signature,
                reason: "blocking declaration registered with a suspending body".to_string(),
            });
        }

        let sink = self.sink_for(&declaration);
        let signature = declaration.signature.clone();
        let call = SuspendingCall::new(declaration, sink, self.config.double_resumption, Box::new(body));
        self.insert(signature, Box::new(call));
        Ok(())
    }

    /// Look up the declaration registered for `signature`.
    pub fn declaration(&self, signature: &Signature) -> TimedResult<&Declaration> {
        self.calls
            .get(signature)
            .map(|call| call.declaration())
            .ok_or_else(|| TimedError::UnknownFunction(signature.clone()))
    }

    /// Check whether `signature` is registered.
    pub fn is_registered(&self, signature: &Signature) -> bool {
        self.calls.contains_key(signature)
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Classify and route an intercepted call.
    ///
    /// Business outcomes come back inside [`Dispatch`]; the outer `Err` is
    /// reserved for misuse of the interception layer itself.
    pub fn dispatch(&self, call: InterceptedCall<T, E>) -> TimedResult<Dispatch<T, E>> {
        let target = self
            .calls
            .get(call.signature())
            .ok_or_else(|| TimedError::UnknownFunction(call.signature().clone()))?;

        let shape = classify(target.declaration(), call.arguments());
        if shape != target.shape() {
            return Err(TimedError::ShapeMismatch {
                signature: call.signature().clone(),
                reason: format!("call classified as {:?} but registered as {:?}", shape, target.shape()),
            });
        }

        tracing::trace!(
            target: "timed",
            signature = %call.signature(),
            shape = ?shape,
            timed = target.is_timed(),
            "dispatching intercepted call"
        );

        let (_, arguments, resumption) = call.into_parts()?;
        target.call(arguments, resumption)
    }

    /// Dispatch a call and wait for its outcome.
    ///
    /// Suspendable functions receive a fresh continuation as their trailing
    /// argument; the returned future resolves when that continuation is
    /// resumed. If the function never resumes it, the future never resolves.
    /// A function that resumes more than once still resolves to its first
    /// outcome.
    pub async fn dispatch_async(&self, signature: impl Into<Signature>, arguments: Vec<Value>) -> TimedResult<Result<T, E>> {
        let signature = signature.into();
        let suspendable = self.declaration(&signature)?.is_suspendable();

        let mut args: Vec<Argument<T, E>> = arguments.into_iter().map(Argument::Value).collect();
        let (continuation, resumed) = Continuation::channel();
        if suspendable {
            args.push(Argument::resumption(continuation));
        }

        match self.dispatch(InterceptedCall::new(signature, args)) {
            Ok(Dispatch::Returned(outcome)) => Ok(outcome),
            Ok(Dispatch::Completed | Dispatch::Suspended) => Ok(resumed.await),
            // The proxy already logged the extra resumption; the first outcome stands.
            Err(TimedError::DoubleResumption { .. }) if suspendable => Ok(resumed.await),
            Err(e) => Err(e),
        }
    }

    fn sink_for(&self, declaration: &Declaration) -> Option<SharedSink> {
        (declaration.is_timed() && self.config.enabled).then(|| self.sink.clone())
    }

    fn insert(&mut self, signature: Signature, call: Box<dyn TimedCall<T, E>>) {
        if self.calls.insert(signature.clone(), call).is_some() {
            tracing::debug!(target: "timed", signature = %signature, "replaced registered function");
        }
    }
}

impl<T, E> fmt::Debug for Interceptor<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("registered", &self.calls.len())
            .field("sink", &self.sink)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ResumptionHandle;
    use crate::sink::MemorySink;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    type Registry = Interceptor<Value, String>;

    fn number(args: &[Value]) -> Result<i64, String> {
        args.first()
            .and_then(Value::as_i64)
            .ok_or_else(|| "expected a number".to_string())
    }

    fn registry(sink: Arc<MemorySink>, config: TimingConfig) -> Registry {
        let mut registry = Registry::with_config(sink, config);

        registry
            .register_blocking(Declaration::blocking("demo::Math::double").timed(), |args| {
                Ok(json!(number(&args)? * 2))
            })
            .unwrap();

        registry
            .register_blocking(Declaration::blocking("demo::Math::untimed"), |_| Ok(json!("plain")))
            .unwrap();

        registry
            .register_suspending(Declaration::suspendable("demo::Math::later").timed(), |args, handle| {
                let n = match number(&args) {
                    Ok(n) => n,
                    Err(e) => return Step::failure(e),
                };
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(20));
                    handle.resume_with_value(json!(n + 1)).unwrap();
                });
                Step::Suspended
            })
            .unwrap();

        registry
            .register_suspending(Declaration::suspendable("demo::Math::now").timed(), |args, _handle| {
                match number(&args) {
                    Ok(n) => Step::value(json!(n)),
                    Err(e) => Step::failure(e),
                }
            })
            .unwrap();

        registry
    }

    #[test]
    fn test_dispatch_blocking() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink.clone(), TimingConfig::default());

        let call = InterceptedCall::new("demo::Math::double", vec![Argument::value(4)]);
        assert_eq!(registry.dispatch(call).unwrap(), Dispatch::Returned(Ok(json!(8))));
        assert_eq!(sink.records_for(&"demo::Math::double".into()).len(), 1);
    }

    #[test]
    fn test_blocking_failure_passes_through() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink.clone(), TimingConfig::default());

        let call = InterceptedCall::new("demo::Math::double", vec![Argument::value("four")]);
        assert_eq!(
            registry.dispatch(call).unwrap(),
            Dispatch::Returned(Err("expected a number".to_string()))
        );
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_unmarked_function_not_timed() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink.clone(), TimingConfig::default());

        let call = InterceptedCall::new("demo::Math::untimed", vec![]);
        assert_eq!(registry.dispatch(call).unwrap(), Dispatch::Returned(Ok(json!("plain"))));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_disabled_config_times_nothing() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink.clone(), TimingConfig::new().with_enabled(false));

        let call = InterceptedCall::new("demo::Math::double", vec![Argument::value(1)]);
        assert_eq!(registry.dispatch(call).unwrap(), Dispatch::Returned(Ok(json!(2))));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_unknown_function() {
        let registry = registry(Arc::new(MemorySink::new()), TimingConfig::default());
        let err = registry
            .dispatch(InterceptedCall::new("demo::Math::missing", vec![]))
            .unwrap_err();
        assert!(matches!(err, TimedError::UnknownFunction(_)));
    }

    #[test]
    fn test_shape_mismatch() {
        let registry = registry(Arc::new(MemorySink::new()), TimingConfig::default());

        // Suspendable function without its trailing handle.
        let err = registry
            .dispatch(InterceptedCall::new("demo::Math::later", vec![Argument::value(1)]))
            .unwrap_err();
        assert!(matches!(err, TimedError::ShapeMismatch { .. }));

        // Blocking function handed a handle.
        let (continuation, _resumed) = Continuation::channel();
        let err = registry
            .dispatch(InterceptedCall::new(
                "demo::Math::double",
                vec![Argument::value(1), Argument::resumption(continuation)],
            ))
            .unwrap_err();
        assert!(matches!(err, TimedError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_register_rejects_wrong_body() {
        let mut registry = Registry::new(Arc::new(MemorySink::new()));

        let err = registry
            .register_blocking(Declaration::suspendable("demo::Math::bad"), |_| Ok(json!(null)))
            .unwrap_err();
        assert!(matches!(err, TimedError::ShapeMismatch { .. }));

        let err = registry
            .register_suspending(Declaration::blocking("demo::Math::bad"), |_, _| Step::Suspended)
            .unwrap_err();
        assert!(matches!(err, TimedError::ShapeMismatch { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispatch_suspending_completed_inline() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink.clone(), TimingConfig::default());
        let (continuation, resumed) = Continuation::channel();

        let call = InterceptedCall::new("demo::Math::now", vec![Argument::value(3), Argument::resumption(continuation)]);
        assert_eq!(registry.dispatch(call).unwrap(), Dispatch::Completed);
        assert_eq!(sink.len(), 1);

        use futures_util::FutureExt;
        assert_eq!(resumed.now_or_never(), Some(Ok(json!(3))));
    }

    #[tokio::test]
    async fn test_dispatch_async_suspended() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink.clone(), TimingConfig::default());

        let outcome = registry.dispatch_async("demo::Math::later", vec![json!(41)]).await.unwrap();
        assert_eq!(outcome, Ok(json!(42)));

        let durations = sink.durations_for(&"demo::Math::later".into());
        assert_eq!(durations.len(), 1);
        assert!(durations[0] >= Duration::from_millis(20), "suspended time counted, got {:?}", durations[0]);
    }

    #[tokio::test]
    async fn test_dispatch_async_blocking_and_failure() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink.clone(), TimingConfig::default());

        let doubled = registry.dispatch_async("demo::Math::double", vec![json!(5)]).await.unwrap();
        assert_eq!(doubled, Ok(json!(10)));

        let failed = registry.dispatch_async("demo::Math::now", vec![json!("x")]).await.unwrap();
        assert_eq!(failed, Err("expected a number".to_string()));

        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_async_keeps_first_outcome() {
        let sink = Arc::new(MemorySink::new());
        let mut registry = Registry::new(sink.clone());
        registry
            .register_suspending(Declaration::suspendable("demo::Math::twice").timed(), |_, handle| {
                handle.resume_with_value(json!("first")).unwrap();
                Step::value(json!("second"))
            })
            .unwrap();

        let outcome = registry.dispatch_async("demo::Math::twice", vec![]).await.unwrap();
        assert_eq!(outcome, Ok(json!("first")));
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_async_unknown() {
        let registry = registry(Arc::new(MemorySink::new()), TimingConfig::default());
        let err = registry.dispatch_async("demo::Math::missing", vec![]).await.unwrap_err();
        assert!(matches!(err, TimedError::UnknownFunction(_)));
    }
}
