//! Callback-style lookup routed through the interception registry

use serde_json::{json, Value};
use std::thread;
use std::time::Duration;
use timed::{Declaration, Interceptor, ResumptionHandle, SharedSink, Step, TimedResult, TimingConfig};

pub const LOOKUP: &str = "timed_demo::OrderBook::lookup";
pub const COUNT: &str = "timed_demo::OrderBook::count";

/// Build a registry with the order book functions.
pub fn registry(sink: SharedSink, config: TimingConfig) -> TimedResult<Interceptor<Value, String>> {
    let mut interceptor = Interceptor::with_config(sink, config);

    // Completes on a worker thread after the caller has been suspended.
    interceptor.register_suspending(Declaration::suspendable(LOOKUP).timed(), |args, handle| {
        let Some(id) = args.first().and_then(Value::as_u64) else {
            return Step::failure("order id must be a number".to_string());
        };

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(431));
            if let Err(e) = handle.resume_with_value(json!({ "id": id, "status": "shipped" })) {
                tracing::error!("failed to resume order lookup: {}", e);
            }
        });
        Step::Suspended
    })?;

    // Unmarked: dispatched without timing.
    interceptor.register_blocking(Declaration::blocking(COUNT), |_| Ok(json!(3)))?;

    Ok(interceptor)
}
