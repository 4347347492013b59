use async_trait::async_trait;
use relaycore::{FlowScope, HandlerError, InvokeError, Message, NodeHandler, NodeSpec, SharedContext};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Retry policy for a decorated handler.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Retry decorator around any node handler.
///
/// The traversal engine never retries on its own; when a deployment wants
/// retries, it wraps the transport here. Only transient transport failures
/// are retried — a business-logic rejection or a context failure comes back
/// unchanged on the first attempt.
pub struct RetryingHandler {
    inner: Arc<dyn NodeHandler>,
    policy: RetryPolicy,
}

impl RetryingHandler {
    pub fn new(inner: Arc<dyn NodeHandler>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn retryable(error: &HandlerError) -> bool {
        matches!(
            error,
            HandlerError::Invoke(
                InvokeError::TransportUnavailable { .. } | InvokeError::Timeout { .. }
            )
        )
    }
}

#[async_trait]
impl NodeHandler for RetryingHandler {
    fn kind(&self) -> &str {
        self.inner.kind()
    }

    async fn handle(
        &self,
        node: &NodeSpec,
        msg: Message,
        scope: &FlowScope,
        ctx: &dyn SharedContext,
    ) -> Result<Vec<Message>, HandlerError> {
        let mut delay = Duration::from_millis(self.policy.delay_ms);
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.inner.handle(node, msg.clone(), scope, ctx).await {
                Ok(outputs) => return Ok(outputs),
                Err(e) if attempt < attempts && Self::retryable(&e) => {
                    tracing::warn!(
                        node_id = %node.id,
                        attempt,
                        error = %e,
                        "invocation failed, retrying"
                    );
                    sleep(delay).await;
                    delay = delay.mul_f64(self.policy.backoff_multiplier);
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("retry loop always returns")
    }
}
