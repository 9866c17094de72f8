//! Demo handlers registered by the binary.

use std::time::Duration;

use jobbox_engine::{FnHandler, HandlerRegistry};
use serde_json::Value;

pub fn registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .with(FnHandler::new("echo", |payload: Value| async move {
            tracing::info!(%payload, "echo");
            Ok(())
        }))
        .with(FnHandler::new("sleep", |payload: Value| async move {
            let seconds = payload.get("seconds").and_then(Value::as_u64).unwrap_or(1);
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            Ok(())
        }))
        .with(FnHandler::new("fail", |payload: Value| async move {
            let reason = payload
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("intentional failure");
            Err(reason.to_string())
        }))
}
