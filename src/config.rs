use crate::error::FlockError;
use crate::inventory::DEFAULT_HOST_FILE;
use crate::ssh::DEFAULT_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_FORKS: usize = 15;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 3;

/// 运行参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// hosts 文件路径
    pub inventory: PathBuf,
    /// 同时打开的会话数上限，0 表示不限制
    pub forks: usize,
    pub connect_timeout_secs: u64,
    /// 整次运行的截止时间，未设置时不限制
    pub run_timeout_secs: Option<u64>,
    pub transfer_buffer_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inventory: PathBuf::from(DEFAULT_HOST_FILE),
            forks: DEFAULT_FORKS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            run_timeout_secs: None,
            transfer_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按扩展名加载：`.json` 为 JSON，其余按 YAML 解析
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FlockError> {
        let is_json = path
            .as_ref()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_file(path)
        } else {
            Self::from_yaml_file(path)
        }
    }

    /// 从YAML文件加载配置
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, FlockError> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| FlockError::Config(format!("Failed to read config file: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| FlockError::Config(format!("Failed to parse YAML: {}", e)))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, FlockError> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| FlockError::Config(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| FlockError::Config(format!("Failed to parse JSON: {}", e)))
    }

    /// 保存配置到YAML文件
    pub fn save_to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), FlockError> {
        let yaml_content = serde_yaml::to_string(self)
            .map_err(|e| FlockError::Config(format!("Failed to serialize to YAML: {}", e)))?;

        std::fs::write(path, yaml_content)
            .map_err(|e| FlockError::Config(format!("Failed to write file: {}", e)))
    }

    /// 保存配置到JSON文件
    pub fn save_to_json<P: AsRef<Path>>(&self, path: P) -> Result<(), FlockError> {
        let json_content = serde_json::to_string_pretty(self)
            .map_err(|e| FlockError::Config(format!("Failed to serialize to JSON: {}", e)))?;

        std::fs::write(path, json_content)
            .map_err(|e| FlockError::Config(format!("Failed to write file: {}", e)))
    }

    /// 连接超时；配置为 0 时使用默认值，拨号和握手必须有上限
    pub fn connect_timeout(&self) -> Duration {
        match self.connect_timeout_secs {
            0 => Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}
