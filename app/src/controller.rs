//! Demo endpoints, each simulating 431 ms of work

use std::time::Duration;
use timed::timed;

const WORK: Duration = Duration::from_millis(431);

/// Downstream service called by the controller.
#[derive(Debug, Default)]
pub struct FooService;

impl FooService {
    timed! {
        pub async fn foo(&self) -> String {
            tokio::time::sleep(WORK).await;
            "foo service".to_string()
        }
    }
}

#[derive(Debug, Default)]
pub struct FooController {
    service: FooService,
}

impl FooController {
    pub fn new(service: FooService) -> Self {
        Self { service }
    }

    /// Same work as [`suspending`](Self::suspending), without the marker.
    pub async fn not_timed(&self) -> String {
        tokio::time::sleep(WORK).await;
        "not timed function".to_string()
    }

    timed! {
        pub fn regular(&self) -> String {
            std::thread::sleep(WORK);
            "regular function".to_string()
        }
    }

    timed! {
        pub async fn suspending(&self) -> String {
            tokio::time::sleep(WORK).await;
            "suspending function".to_string()
        }
    }

    timed! {
        pub async fn internal_function_call(&self) -> String {
            tokio::time::sleep(WORK).await;
            self.private_function().await
        }
    }

    timed! {
        pub async fn external_function_call(&self) -> String {
            tokio::time::sleep(WORK).await;
            self.service.foo().await
        }
    }

    timed! {
        async fn private_function(&self) -> String {
            tokio::time::sleep(WORK).await;
            "internal function call".to_string()
        }
    }
}
