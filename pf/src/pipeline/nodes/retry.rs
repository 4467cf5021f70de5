//! Retry Coordinator - decides whether a failed node gets another attempt
//!
//! The coordinator only computes the decision and the backoff delay; the
//! orchestrator performs the wait so it can be cancelled.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::RetryConfig;
use crate::pipeline::error::PipelineError;
use crate::pipeline::node::{Node, NodeContext, NodeId};
use crate::pipeline::state::{PipelineState, StateUpdate};

/// Delay before retry number `attempt` (1-based): `min(base * 2^(attempt-1), max)`
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    config
        .base_delay()
        .saturating_mul(2u32.saturating_pow(exponent))
        .min(config.max_delay())
}

pub struct RetryCoordinator;

#[async_trait]
impl Node for RetryCoordinator {
    fn id(&self) -> NodeId {
        NodeId::RetryCoordinator
    }

    async fn execute(&self, state: &PipelineState, ctx: &NodeContext) -> Result<StateUpdate, PipelineError> {
        let attempt = state.retry_count + 1;
        let reason = state.last_error.as_deref().unwrap_or("unknown error");
        debug!(
            run_id = %state.run_id,
            attempt,
            max_retries = state.max_retries,
            failed_node = ?state.failed_node,
            "RetryCoordinator::execute: called"
        );

        let mut update = StateUpdate {
            bump_retry: true,
            ..StateUpdate::default()
        };

        if !state.error_retryable {
            warn!(run_id = %state.run_id, %reason, "RetryCoordinator: error is not retryable, giving up");
            update.retries_exhausted = true;
            return Ok(update);
        }
        if attempt > state.max_retries {
            warn!(run_id = %state.run_id, attempt, %reason, "RetryCoordinator: retries exhausted");
            update.retries_exhausted = true;
            return Ok(update);
        }

        let delay = backoff_delay(attempt, &ctx.config.retry);
        info!(run_id = %state.run_id, attempt, delay_ms = delay.as_millis() as u64, %reason, "RetryCoordinator: scheduling retry");
        update.clear_error = true;
        update.backoff = Some(delay);
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::llm::client::mock::MockLlmClient;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn ctx() -> NodeContext {
        NodeContext::new(Arc::new(MockLlmClient::failing()), PipelineConfig::default())
    }

    fn failed_state(retry_count: u32, retryable: bool) -> PipelineState {
        let mut state = PipelineState::new("run", "prompt", vec![], 50, 3);
        state.retry_count = retry_count;
        state.last_error = Some("timeout".to_string());
        state.failed_node = Some(NodeId::SectionGenerator);
        state.error_retryable = retryable;
        state
    }

    #[test]
    fn test_backoff_sequence() {
        let config = RetryConfig::default();
        let delays: Vec<u64> = (1..=6).map(|n| backoff_delay(n, &config).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10_000, 10_000]);
    }

    #[tokio::test]
    async fn test_schedules_retry() {
        let update = RetryCoordinator.execute(&failed_state(0, true), &ctx()).await.unwrap();
        assert!(update.bump_retry);
        assert!(update.clear_error);
        assert!(!update.retries_exhausted);
        assert_eq!(update.backoff, Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let update = RetryCoordinator.execute(&failed_state(3, true), &ctx()).await.unwrap();
        assert!(update.bump_retry);
        assert!(update.retries_exhausted);
        assert!(!update.clear_error);
        assert!(update.backoff.is_none());
    }

    #[tokio::test]
    async fn test_gives_up_on_fatal_error() {
        let update = RetryCoordinator.execute(&failed_state(0, false), &ctx()).await.unwrap();
        assert!(update.retries_exhausted);
        assert!(update.backoff.is_none());
    }

    #[tokio::test]
    async fn test_retry_count_stays_bounded() {
        let ctx = ctx();
        let mut state = failed_state(0, true);
        for _ in 0..10 {
            if state.retries_exhausted {
                break;
            }
            let update = RetryCoordinator.execute(&state, &ctx).await.unwrap();
            state.apply(update);
            state.last_error = Some("timeout again".to_string());
            state.error_retryable = true;
        }
        assert!(state.retries_exhausted);
        assert_eq!(state.retry_count, state.max_retries + 1);
    }

    proptest! {
        #[test]
        fn prop_backoff_monotonic_and_capped(base in 1u64..5_000, extra in 0u64..60_000, attempt in 1u32..64) {
            let config = RetryConfig { base_delay_ms: base, max_delay_ms: base + extra };
            let current = backoff_delay(attempt, &config);
            let next = backoff_delay(attempt + 1, &config);
            prop_assert!(next >= current);
            prop_assert!(next <= config.max_delay());
        }
    }
}
