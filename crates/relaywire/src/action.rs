use crate::Invoker;
use async_trait::async_trait;
use relaycore::{FlowScope, HandlerError, InvokeError, Message, NodeHandler, NodeSpec, SharedContext};
use serde::Serialize;
use serde_json::json;
use tokio::time::Duration;

/// Configuration for the action-invocation transport.
#[derive(Debug, Clone)]
pub struct ActionConfig {
    /// Base URL of the execution platform, e.g. `https://openwhisk.local`.
    pub base_url: String,
    pub namespace: String,
    /// Basic-auth credentials, `user:key` form used by the platform CLI.
    pub auth: Option<(String, String)>,
    pub timeout: Duration,
}

impl ActionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            namespace: "_".to_string(),
            auth: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_auth(mut self, user: impl Into<String>, key: impl Into<String>) -> Self {
        self.auth = Some((user.into(), key.into()));
        self
    }
}

/// The platform call document: one blocking call per invocation, result
/// requested inline, the node spec and message passed as parameters.
#[derive(Debug, Serialize)]
pub struct ActionCall {
    pub name: String,
    pub blocking: bool,
    pub result: bool,
    pub params: serde_json::Value,
}

impl ActionCall {
    pub fn for_node(node: &NodeSpec, msg: &Message) -> Self {
        Self {
            name: node.kind.clone(),
            blocking: true,
            result: true,
            params: json!({
                "msg": msg.to_value(),
                "node": node,
            }),
        }
    }
}

/// Action-invocation transport: stateless, no persistent connection, one
/// blocking call-and-return per node invocation.
pub struct ActionInvoker {
    client: reqwest::Client,
    config: ActionConfig,
}

impl ActionInvoker {
    pub fn new(config: ActionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn action_url(&self, call: &ActionCall) -> String {
        format!(
            "{}/api/v1/namespaces/{}/actions/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.namespace,
            call.name
        )
    }

    fn failed(action: &str, reason: impl ToString) -> InvokeError {
        InvokeError::ActionFailed {
            action: action.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Invoker for ActionInvoker {
    /// Whatever the platform reports — timeout, cold-start error,
    /// application exception, unparseable result — is one uniform
    /// invocation failure.
    async fn invoke(&self, node: &NodeSpec, msg: Message) -> Result<Message, InvokeError> {
        let call = ActionCall::for_node(node, &msg);
        let url = self.action_url(&call);

        let mut request = self
            .client
            .post(&url)
            .query(&[("blocking", call.blocking), ("result", call.result)])
            .timeout(self.config.timeout)
            .json(&call.params);
        if let Some((user, key)) = &self.config.auth {
            request = request.basic_auth(user, Some(key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::failed(&call.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::failed(
                &call.name,
                format!("platform returned {}: {}", status, body),
            ));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Self::failed(&call.name, e))?;
        Message::from_value(value)
            .ok_or_else(|| Self::failed(&call.name, "result is not a JSON object"))
    }
}

#[async_trait]
impl NodeHandler for ActionInvoker {
    fn kind(&self) -> &str {
        "remote.action"
    }

    async fn handle(
        &self,
        node: &NodeSpec,
        msg: Message,
        _scope: &FlowScope,
        _ctx: &dyn SharedContext,
    ) -> Result<Vec<Message>, HandlerError> {
        let reply = self.invoke(node, msg).await?;
        Ok(vec![reply])
    }
}
