use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::instance::{InstanceIdentity, Notification};

/// One line sent by a launching process to the primary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpcRequest {
    /// Registered message name ("WM_SHOWFIRSTINSTANCE|CustomRP") or a query like "status"
    pub command: String,
    #[serde(default)]
    pub args: Value,
}

impl IpcRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Value::Null,
        }
    }

    /// Payload-less notification addressed to `identity`
    pub fn notification(identity: &InstanceIdentity, notification: Notification) -> Self {
        Self::new(identity.message_name(notification))
    }
}

/// Reply line from the primary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpcResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            result: None,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
        }
    }

    /// Fold into a `Result`, with `Value::Null` standing in for an empty success
    pub fn into_result(self) -> Result<Value, String> {
        if self.success {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "request failed without a message".to_string()))
        }
    }
}
