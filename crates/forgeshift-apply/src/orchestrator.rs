//! Plan execution: strict order, abort-on-failure, reverse rollback

use crate::action::{execute_with_retry, Action, RetryOptions};
use crate::context::ApplyContext;
use crate::plan::ActionPlan;
use crate::registry::ActionRegistry;
use crate::result::ActionResult;
use forgeshift_client::GitHubClient;
use forgeshift_core::Result;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Clone, Debug)]
pub struct ApplyOptions {
    pub dry_run: bool,
    /// Default policy aborts on the first post-retry failure.
    pub continue_on_error: bool,
    /// Roll back executed actions when the run aborts.
    pub rollback_on_abort: bool,
    pub retry: RetryOptions,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            continue_on_error: false,
            rollback_on_abort: false,
            retry: RetryOptions::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplyReport {
    pub success: bool,
    pub dry_run: bool,
    pub results: Vec<ActionResult>,
    pub executed: usize,
    pub failed: usize,
    pub started_at: String,
    pub finished_at: String,
}

pub struct ApplyOrchestrator {
    client: GitHubClient,
    registry: ActionRegistry,
    cancel: CancellationToken,
}

impl ApplyOrchestrator {
    pub fn new(client: GitHubClient) -> Self {
        Self {
            client,
            registry: ActionRegistry::with_builtin_actions(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Execute a plan in strict order. Each action runs through the
    /// retry/idempotency base; a failure after retries aborts the run
    /// unless `continue_on_error` is set.
    pub async fn run(
        &self,
        plan: &ActionPlan,
        ctx: &mut ApplyContext,
        options: &ApplyOptions,
    ) -> Result<ApplyReport> {
        let started_at = forgeshift_core::util::now_iso();
        plan.validate(&self.registry)?;
        info!(
            actions = plan.len(),
            dry_run = options.dry_run,
            "starting apply run"
        );

        let mut results: Vec<ActionResult> = Vec::new();
        let mut executed_actions: Vec<(Box<dyn Action>, ActionResult)> = Vec::new();
        let mut failed = 0usize;
        let mut aborted = false;

        for planned in &plan.actions {
            if self.cancel.is_cancelled() {
                warn!("apply cancelled; remaining actions dropped");
                break;
            }

            let action = self.registry.build(planned.spec())?;
            let retry = RetryOptions {
                dry_run: options.dry_run,
                ..options.retry
            };
            let result = execute_with_retry(action.as_ref(), &self.client, ctx, retry).await;

            let succeeded = result.success;
            results.push(result.clone());
            if succeeded {
                if !options.dry_run {
                    executed_actions.push((action, result));
                }
            } else {
                failed += 1;
                error!(action = %planned.id, "action failed after retries");
                if !options.continue_on_error {
                    aborted = true;
                    break;
                }
            }
        }

        if aborted && options.rollback_on_abort && !options.dry_run {
            self.rollback(&executed_actions).await;
        }

        let executed = results.iter().filter(|r| r.success).count();
        Ok(ApplyReport {
            success: failed == 0 && !aborted,
            dry_run: options.dry_run,
            results,
            executed,
            failed,
            started_at,
            finished_at: forgeshift_core::util::now_iso(),
        })
    }

    /// Reverse-order rollback of successfully executed actions.
    /// Outcomes are logged; rollback failures never cascade.
    pub async fn rollback(&self, executed: &[(Box<dyn Action>, ActionResult)]) {
        info!(count = executed.len(), "rolling back executed actions");
        for (action, result) in executed.iter().rev() {
            let spec = action.spec();
            if !action.is_reversible() {
                warn!(action = %spec.id, "not reversible, skipping rollback");
                continue;
            }
            let Some(rollback_data) = &result.rollback_data else {
                warn!(action = %spec.id, "no rollback data recorded, skipping");
                continue;
            };
            match action.rollback(&self.client, rollback_data).await {
                Ok(()) => info!(action = %spec.id, "rolled back"),
                Err(e) => error!(action = %spec.id, error = %e, "rollback failed"),
            }
        }
    }
}
