use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FlockError {
    #[error("\"hosts\" cannot have empty value")]
    EmptyExpression,

    #[error("Inventory parse error at line {line}: {reason}")]
    InventoryParse { line: usize, reason: String },

    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication setup failed: {0}")]
    AuthSetup(String),

    #[error("SSH connection failed: {0}")]
    Connection(String),

    #[error("Command execution failed: {0}")]
    Execution(String),

    #[error("File transfer failed: {0}")]
    Transfer(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("message exists for host {0}")]
    DuplicateHost(String),

    #[error("message not exists for host {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("SSH error: {0}")]
    Ssh2(String),
}

impl FlockError {
    /// 去掉分类前缀后的原因文本，作为主机结果里的失败信息
    pub fn reason(&self) -> String {
        match self {
            FlockError::AuthSetup(reason)
            | FlockError::Connection(reason)
            | FlockError::Execution(reason)
            | FlockError::Transfer(reason)
            | FlockError::Inventory(reason)
            | FlockError::Config(reason)
            | FlockError::Io(reason)
            | FlockError::Ssh2(reason) => reason.clone(),
            other => other.to_string(),
        }
    }

    /// 是否只影响单个主机（不会中止整次运行）
    pub fn is_task_local(&self) -> bool {
        matches!(
            self,
            FlockError::AuthSetup(_)
                | FlockError::Connection(_)
                | FlockError::Execution(_)
                | FlockError::Transfer(_)
                | FlockError::Cancelled
                | FlockError::Io(_)
                | FlockError::Ssh2(_)
        )
    }
}

impl From<std::io::Error> for FlockError {
    fn from(error: std::io::Error) -> Self {
        FlockError::Io(error.to_string())
    }
}

impl From<ssh2::Error> for FlockError {
    fn from(error: ssh2::Error) -> Self {
        FlockError::Ssh2(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strips_category() {
        let err = FlockError::Connection("dial tcp 10.0.0.9:22: i/o timeout".to_string());
        assert_eq!(err.reason(), "dial tcp 10.0.0.9:22: i/o timeout");
        assert!(err.to_string().starts_with("SSH connection failed"));
    }

    #[test]
    fn test_task_local_classification() {
        assert!(FlockError::Execution("boom".into()).is_task_local());
        assert!(FlockError::Cancelled.is_task_local());
        assert!(!FlockError::EmptyExpression.is_task_local());
        assert!(!FlockError::DuplicateHost("a".into()).is_task_local());
    }
}
