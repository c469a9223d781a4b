use serde_json::Value;
use std::time::Duration;
use tracing::Instrument;

use super::{FunctionRegistry, ValidationError, db, validate};
use crate::capability::{CallError, panic_message, resolve_callable};
use crate::types::{Args, FunctionDescriptor};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Function '{0}' not found in registry")]
    FunctionNotFound(String),
    #[error("module '{module}' not found at '{location}'")]
    ModuleNotFound { module: String, location: String },
    #[error("callable '{function}' not found in module '{module}'")]
    CallableNotFound { module: String, function: String },
    #[error("call mismatch for '{function}': {reason}")]
    CallMismatch { function: String, reason: String },
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("'{function}' did not finish within {after:?}")]
    Timeout { function: String, after: Duration },
    #[error("'{function}' panicked: {message}")]
    Panicked { function: String, message: String },
    #[error("{0}")]
    Failed(String),
}

impl FunctionRegistry {
    /// Validate `args`, load the owning module if needed, and run the function
    /// under the dispatch timeout. Every attempt is counted in the call stats.
    pub async fn dispatch(&self, descriptor: &FunctionDescriptor, args: Args) -> Result<Value, DispatchError> {
        let key = descriptor.search_key.as_str();
        tracing::debug!(function = key, "dispatching");

        let result = self.invoke(descriptor, &args).await;
        match &result {
            Ok(_) => tracing::debug!(function = key, "dispatch succeeded"),
            Err(e) => tracing::warn!(function = key, error = %e, "dispatch failed"),
        }
        self.record_call(key, &args, result.is_ok());
        result
    }

    /// [`dispatch`](Self::dispatch) by search key or bare function name.
    pub async fn dispatch_by_name(&self, name: &str, args: Args) -> Result<Value, DispatchError> {
        let descriptor = self
            .find_by_name(name)
            .ok_or_else(|| DispatchError::FunctionNotFound(name.to_string()))?;
        self.dispatch(descriptor, args).await
    }

    async fn invoke(&self, descriptor: &FunctionDescriptor, args: &Args) -> Result<Value, DispatchError> {
        validate::validate(descriptor, args)?;

        let module = self
            .host
            .load(&descriptor.module_name, &descriptor.module_path)
            .ok_or_else(|| DispatchError::ModuleNotFound {
                module: descriptor.module_name.clone(),
                location: descriptor.module_path.clone(),
            })?;
        let callable = resolve_callable(module.as_ref(), &descriptor.function_name).ok_or_else(|| {
            DispatchError::CallableNotFound {
                module: descriptor.module_name.clone(),
                function: descriptor.function_name.clone(),
            }
        })?;

        // Own task, so a panicking capability surfaces as a JoinError.
        let args = args.clone();
        let mut task = tokio::spawn(async move { callable.call(args).await }.in_current_span());
        match tokio::time::timeout(self.dispatch_timeout, &mut task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(CallError::Mismatch(reason)))) => Err(DispatchError::CallMismatch {
                function: descriptor.search_key.clone(),
                reason,
            }),
            Ok(Ok(Err(CallError::Failed(message)))) => Err(DispatchError::Failed(message)),
            Ok(Err(join)) => Err(DispatchError::Panicked {
                function: descriptor.search_key.clone(),
                message: panic_message(join),
            }),
            Err(_) => {
                task.abort();
                Err(DispatchError::Timeout {
                    function: descriptor.search_key.clone(),
                    after: self.dispatch_timeout,
                })
            }
        }
    }

    fn record_call(&self, key: &str, args: &Args, success: bool) {
        self.stats.record(key, args, success);
        if let Some(pool) = &self.pool {
            let pool = pool.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                if let Err(e) = db::record_call(&pool, &key, success).await {
                    tracing::warn!(function = %key, error = %e, "call stats not persisted");
                }
            });
        }
    }
}
