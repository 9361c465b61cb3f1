use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::FlockError;

pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_USER: &str = "root";

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_user() -> String {
    DEFAULT_USER.to_string()
}

/// 单台主机的连接参数
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostParams {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_passphrase: Option<String>,
}

impl HostParams {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for HostParams {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            user: default_user(),
            password: None,
            private_key_path: None,
            private_key_passphrase: None,
        }
    }
}

// 密码和私钥口令不进日志
impl fmt::Debug for HostParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key_path", &self.private_key_path)
            .field(
                "private_key_passphrase",
                &self.private_key_passphrase.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

/// 一次运行中选中的目标主机
///
/// `params` 为 `None` 表示该主机名没有出现在 inventory 中，
/// 分发时会直接产生 Warning 结果，不做任何网络操作。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: String,
    params: Option<HostParams>,
}

impl Target {
    pub fn new(host: impl Into<String>, params: Option<HostParams>) -> Self {
        Self {
            host: host.into(),
            params,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn params(&self) -> Option<&HostParams> {
        self.params.as_ref()
    }

    pub fn is_known(&self) -> bool {
        self.params.is_some()
    }
}

/// 按主机名去重的目标集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    targets: BTreeMap<String, Target>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入目标；同名主机已存在时保持原样并返回 false
    pub fn insert(&mut self, target: Target) -> bool {
        if self.targets.contains_key(target.host()) {
            return false;
        }
        self.targets.insert(target.host.clone(), target);
        true
    }

    pub fn contains(&self, host: &str) -> bool {
        self.targets.contains_key(host)
    }

    pub fn get(&self, host: &str) -> Option<&Target> {
        self.targets.get(host)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn hosts(&self) -> Vec<&str> {
        self.targets.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }
}

impl FromIterator<Target> for TargetSet {
    fn from_iter<I: IntoIterator<Item = Target>>(iter: I) -> Self {
        let mut set = TargetSet::new();
        for target in iter {
            set.insert(target);
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Failed,
    Warning,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Success => "SUCCESS",
            Status::Failed => "FAILED",
            Status::Warning => "WARNING",
        };
        f.pad(label)
    }
}

/// 主机结果携带的信息：正常输出或失败原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Message {
    Output(String),
    Failure(String),
}

impl Message {
    pub fn text(&self) -> &str {
        match self {
            Message::Output(text) | Message::Failure(text) => text,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Message::Failure(_))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

pub const UNMATCHED_HOST_MESSAGE: &str = "host pattern did not match any inventory entry";

/// 单台主机一次执行的最终结果，创建后不可修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    host: String,
    status: Status,
    changed: bool,
    message: Message,
    elapsed: Duration,
    finished_at: DateTime<Utc>,
}

impl Outcome {
    pub fn success(host: impl Into<String>, output: String, changed: bool, elapsed: Duration) -> Self {
        Self::build(host, Status::Success, changed, Message::Output(output), elapsed)
    }

    pub fn failed(host: impl Into<String>, error: &FlockError, elapsed: Duration) -> Self {
        Self::build(
            host,
            Status::Failed,
            false,
            Message::Failure(error.reason()),
            elapsed,
        )
    }

    pub fn warning(host: impl Into<String>, elapsed: Duration) -> Self {
        Self::build(
            host,
            Status::Warning,
            false,
            Message::Failure(UNMATCHED_HOST_MESSAGE.to_string()),
            elapsed,
        )
    }

    fn build(
        host: impl Into<String>,
        status: Status,
        changed: bool,
        message: Message,
        elapsed: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            status,
            changed,
            message,
            elapsed,
            finished_at: Utc::now(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// 从本次运行开始到该结果产生的时间
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// 忽略计时字段比较两个结果
    pub fn same_result(&self, other: &Outcome) -> bool {
        self.host == other.host
            && self.status == other.status
            && self.changed == other.changed
            && self.message == other.message
    }
}

/// 文件推送参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSpec {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub buffer_size: usize,
}

/// 分发给每台主机的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Command(String),
    Transfer(TransferSpec),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Command(cmd) => write!(f, "command '{}'", cmd),
            Action::Transfer(spec) => write!(
                f,
                "copy {} -> {}",
                spec.local_path.display(),
                spec.remote_path
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub bytes_transferred: u64,
    pub changed: bool,
    pub message: String,
}
