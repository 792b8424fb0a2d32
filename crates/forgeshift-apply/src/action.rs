//! Action contract and the retry/idempotency/dry-run base

use crate::context::ApplyContext;
use crate::result::ActionResult;
use forgeshift_client::GitHubClient;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

/// The plan-supplied identity and parameters of one action.
#[derive(Clone, Debug)]
pub struct ActionSpec {
    pub id: String,
    pub action_type: String,
    pub parameters: Value,
    pub idempotency_key: Option<String>,
}

impl ActionSpec {
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters[key].as_str()
    }

    pub fn require_str(&self, key: &str) -> Result<&str, String> {
        self.param_str(key)
            .ok_or_else(|| format!("missing required parameter: {key}"))
    }
}

/// One migration action on the destination forge.
#[async_trait::async_trait]
pub trait Action: Send + Sync {
    fn spec(&self) -> &ActionSpec;

    /// Perform the destination side effect.
    async fn execute(&self, client: &GitHubClient, ctx: &mut ApplyContext) -> ActionResult;

    /// Predict the outcome without performing it.
    async fn simulate(&self, client: &GitHubClient, ctx: &ApplyContext) -> ActionResult {
        let _ = (client, ctx);
        ActionResult::simulated(
            &self.spec().id,
            &self.spec().action_type,
            crate::result::SimulationOutcome::WouldExecute,
            format!("Would execute action: {}", self.spec().action_type),
            Value::Object(Default::default()),
        )
    }

    /// Undo a successful execution using its recorded rollback data.
    async fn rollback(
        &self,
        client: &GitHubClient,
        rollback_data: &Value,
    ) -> Result<(), String> {
        let _ = (client, rollback_data);
        Err(format!(
            "action type '{}' does not support rollback",
            self.spec().action_type
        ))
    }

    fn is_reversible(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Action({})", self.spec().action_type)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub dry_run: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            dry_run: false,
        }
    }
}

/// Run one action through the shared policy:
/// dry-run simulates; a recorded idempotency key replays the prior
/// result without re-executing; otherwise up to `max_retries` attempts
/// with async exponential backoff, recording the result on success.
pub async fn execute_with_retry(
    action: &dyn Action,
    client: &GitHubClient,
    ctx: &mut ApplyContext,
    options: RetryOptions,
) -> ActionResult {
    let spec = action.spec();
    let started = std::time::Instant::now();

    if options.dry_run {
        info!(action = %spec.id, "simulating");
        let mut result = action.simulate(client, ctx).await;
        result.duration_seconds = started.elapsed().as_secs_f64();
        return result;
    }

    if let Some(key) = &spec.idempotency_key {
        if let Some(previous) = ctx.executed(key) {
            info!(action = %spec.id, key = %key, "already executed, replaying recorded result");
            return previous.clone();
        }
    }

    let mut last_error: Option<String> = None;
    for attempt in 0..options.max_retries {
        info!(
            action = %spec.id,
            attempt = attempt + 1,
            max = options.max_retries,
            "executing"
        );

        let mut result = action.execute(client, ctx).await;
        result.retry_count = attempt;
        result.duration_seconds = started.elapsed().as_secs_f64();

        if result.success {
            if let Some(key) = &spec.idempotency_key {
                ctx.record_executed(key, result.clone());
            }
            info!(action = %spec.id, "completed");
            return result;
        }

        last_error = result.error.clone();
        error!(
            action = %spec.id,
            attempt = attempt + 1,
            error = %last_error.as_deref().unwrap_or("unknown"),
            "attempt failed"
        );

        if attempt + 1 < options.max_retries {
            // Non-blocking sleep so the scheduler is never monopolized.
            let delay = options.base_delay * 2u32.pow(attempt + 1);
            info!(delay_secs = delay.as_secs_f64(), "retrying after backoff");
            tokio::time::sleep(delay).await;
        }
    }

    let mut result = ActionResult::failed(
        &spec.id,
        &spec.action_type,
        format!(
            "Failed after {} attempts: {}",
            options.max_retries,
            last_error.unwrap_or_else(|| "unknown error".to_string())
        ),
    );
    result.retry_count = options.max_retries;
    result.duration_seconds = started.elapsed().as_secs_f64();
    result
}
