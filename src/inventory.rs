//! 类似 ansible `/etc/ansible/hosts` 的主机清单
//!
//! 支持三种来源：INI 风格的 hosts 文件、YAML、JSON。

use crate::error::FlockError;
use crate::types::HostParams;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_GROUP: &str = "default";
pub const DEFAULT_HOST_FILE: &str = "/etc/flock/ssh/hosts";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    hosts: BTreeMap<String, HostParams>,
    #[serde(default)]
    groups: BTreeMap<String, BTreeSet<String>>,
    #[serde(skip)]
    source: Option<PathBuf>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按扩展名选择格式加载清单文件
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, FlockError> {
        let path = path.as_ref();
        let mut inventory = match extension_of(path).as_deref() {
            Some("yml") | Some("yaml") => Self::from_yaml_file(path)?,
            Some("json") => Self::from_json_file(path)?,
            _ => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    FlockError::Inventory(format!(
                        "Failed to read host file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::parse(&content)?
            }
        };
        inventory.source = Some(path.to_path_buf());
        debug!(
            "Loaded inventory {} ({} hosts, {} groups)",
            path.display(),
            inventory.hosts.len(),
            inventory.groups.len()
        );
        Ok(inventory)
    }

    /// 重新读取加载时使用的文件
    pub fn reload(&mut self) -> Result<(), FlockError> {
        let source = self.source.clone().ok_or_else(|| {
            FlockError::Inventory("inventory was not loaded from a file".to_string())
        })?;
        *self = Self::load_file(source)?;
        Ok(())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// 解析 hosts 文件文本
    ///
    /// ```text
    /// # 注释
    /// 192.168.100.1
    /// [web]
    /// host=192.168.100.2, port=2222, user=deploy, privatekey=/root/.ssh/id_rsa
    /// ```
    pub fn parse(content: &str) -> Result<Self, FlockError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut inventory = Self::new();
        let mut group = DEFAULT_GROUP.to_string();

        for (index, raw) in content.lines().enumerate() {
            let row = index + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
                group = line[1..line.len() - 1].trim().to_string();
                if group.is_empty() {
                    return Err(FlockError::InventoryParse {
                        line: row,
                        reason: "group name is empty".to_string(),
                    });
                }
                if inventory.groups.contains_key(&group) {
                    return Err(FlockError::InventoryParse {
                        line: row,
                        reason: format!("group {} exists", group),
                    });
                }
                inventory.groups.insert(group.clone(), BTreeSet::new());
                continue;
            }

            let params = parse_host_line(line, row)?;
            if !inventory.insert_host(&group, params) {
                warn!("Host on line {} already defined in group '{}', keeping first definition", row, group);
            }
        }

        Ok(inventory)
    }

    /// 从YAML文件加载清单
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, FlockError> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| FlockError::Inventory(format!("Failed to read inventory file: {}", e)))?;

        let inventory: Self = serde_yaml::from_str(&content)
            .map_err(|e| FlockError::Inventory(format!("Failed to parse YAML: {}", e)))?;
        inventory.validate()?;
        Ok(inventory)
    }

    /// 从JSON文件加载清单
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, FlockError> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| FlockError::Inventory(format!("Failed to read inventory file: {}", e)))?;

        let inventory: Self = serde_json::from_str(&content)
            .map_err(|e| FlockError::Inventory(format!("Failed to parse JSON: {}", e)))?;
        inventory.validate()?;
        Ok(inventory)
    }

    /// 保存清单到YAML文件
    pub fn save_to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), FlockError> {
        let yaml_content = serde_yaml::to_string(self)
            .map_err(|e| FlockError::Inventory(format!("Failed to serialize to YAML: {}", e)))?;

        std::fs::write(path, yaml_content)
            .map_err(|e| FlockError::Inventory(format!("Failed to write file: {}", e)))
    }

    /// 保存清单到JSON文件
    pub fn save_to_json<P: AsRef<Path>>(&self, path: P) -> Result<(), FlockError> {
        let json_content = serde_json::to_string_pretty(self)
            .map_err(|e| FlockError::Inventory(format!("Failed to serialize to JSON: {}", e)))?;

        std::fs::write(path, json_content)
            .map_err(|e| FlockError::Inventory(format!("Failed to write file: {}", e)))
    }

    fn validate(&self) -> Result<(), FlockError> {
        for (name, params) in &self.hosts {
            if name.is_empty() || params.host.is_empty() {
                return Err(FlockError::Inventory("host name is empty".to_string()));
            }
            if name != &params.host {
                return Err(FlockError::Inventory(format!(
                    "host key '{}' does not match host '{}'",
                    name, params.host
                )));
            }
        }
        for (group, members) in &self.groups {
            if let Some(missing) = members.iter().find(|h| !self.hosts.contains_key(*h)) {
                return Err(FlockError::Inventory(format!(
                    "group '{}' references unknown host '{}'",
                    group, missing
                )));
            }
        }
        Ok(())
    }

    /// 加入分组并记录主机；同一分组重复出现时返回 false
    fn insert_host(&mut self, group: &str, params: HostParams) -> bool {
        let members = self.groups.entry(group.to_string()).or_default();
        if !members.insert(params.host.clone()) {
            return false;
        }
        // 主机出现在多个分组时，以第一次定义为准
        self.hosts.entry(params.host.clone()).or_insert(params);
        true
    }

    pub fn add_group(&mut self, group: &str) -> Result<(), FlockError> {
        if group.is_empty() {
            return Err(FlockError::Inventory("group is empty".to_string()));
        }
        if self.groups.contains_key(group) {
            return Err(FlockError::Inventory(format!("group {} exists", group)));
        }
        self.groups.insert(group.to_string(), BTreeSet::new());
        Ok(())
    }

    /// 添加主机到指定组，组名为空时使用 default 组
    pub fn add_host(&mut self, group: &str, params: HostParams) -> Result<(), FlockError> {
        if params.host.is_empty() {
            return Err(FlockError::Inventory("host is empty".to_string()));
        }
        let group = if group.is_empty() { DEFAULT_GROUP } else { group };
        if group != DEFAULT_GROUP && !self.groups.contains_key(group) {
            return Err(FlockError::Inventory(format!("group {} not exists", group)));
        }
        let host = params.host.clone();
        if !self.insert_host(group, params) {
            return Err(FlockError::Inventory(format!(
                "host {} exists in group {}",
                host, group
            )));
        }
        Ok(())
    }

    /// 从所有分组中删除主机
    pub fn remove_host(&mut self, host: &str) -> Result<HostParams, FlockError> {
        let params = self
            .hosts
            .remove(host)
            .ok_or_else(|| FlockError::Inventory(format!("host {} not exists", host)))?;
        for members in self.groups.values_mut() {
            members.remove(host);
        }
        Ok(params)
    }

    /// 删除分组；只属于该分组的主机一并删除
    pub fn remove_group(&mut self, group: &str) -> Result<(), FlockError> {
        let members = self
            .groups
            .remove(group)
            .ok_or_else(|| FlockError::Inventory(format!("group {} not exists", group)))?;
        for host in members {
            if !self.groups.values().any(|m| m.contains(&host)) {
                self.hosts.remove(&host);
            }
        }
        Ok(())
    }

    pub fn list_hosts(&self) -> BTreeSet<String> {
        self.hosts.keys().cloned().collect()
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    pub fn group_exists(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn group_hosts(&self, group: &str) -> BTreeSet<String> {
        self.groups.get(group).cloned().unwrap_or_default()
    }

    /// 主机所属的全部分组
    pub fn groups_of(&self, host: &str) -> Vec<&str> {
        self.groups
            .iter()
            .filter(|(_, members)| members.contains(host))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn host_params(&self, host: &str) -> Option<&HostParams> {
        self.hosts.get(host)
    }

    pub fn host_exists(&self, host: &str) -> bool {
        self.hosts.contains_key(host)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// 解析一行主机定义：`10.0.0.1` 或 `host=10.0.0.1, port=22, user=root`
fn parse_host_line(line: &str, row: usize) -> Result<HostParams, FlockError> {
    let mut params = HostParams::default();

    for item in line.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let Some((key, value)) = item.split_once('=') else {
            params.host = item.to_string();
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "host" => params.host = value.to_string(),
            "port" => {
                params.port = value.parse().map_err(|_| FlockError::InventoryParse {
                    line: row,
                    reason: format!("invalid port '{}'", value),
                })?;
            }
            "user" | "username" => {
                if !value.is_empty() {
                    params.user = value.to_string();
                }
            }
            "passwd" | "password" => params.password = non_empty(value),
            "privatekey" => params.private_key_path = non_empty(value).map(PathBuf::from),
            "passparse" => params.private_key_passphrase = non_empty(value),
            other => warn!("Ignoring unknown host key '{}' on line {}", other, row),
        }
    }

    if params.host.is_empty() {
        return Err(FlockError::InventoryParse {
            line: row,
            reason: "host line has no host name".to_string(),
        });
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\u{feff}# managed hosts
10.0.0.1
; legacy entries
[web]
host=a, port=2222, user=deploy, passwd=pa=ss
b
[db]
host=c, privatekey=/root/.ssh/id_rsa, passparse=123456
a
";

    #[test]
    fn test_parse_groups_and_defaults() {
        let inventory = Inventory::parse(SAMPLE).unwrap();

        assert_eq!(inventory.group_names(), vec!["db", "default", "web"]);
        assert_eq!(
            inventory.group_hosts("web").into_iter().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(inventory.group_hosts(DEFAULT_GROUP).len(), 1);
        assert_eq!(inventory.len(), 4);

        let a = inventory.host_params("a").unwrap();
        assert_eq!(a.port, 2222);
        assert_eq!(a.user, "deploy");
        assert_eq!(a.password.as_deref(), Some("pa=ss"));

        let b = inventory.host_params("b").unwrap();
        assert_eq!(b.port, 22);
        assert_eq!(b.user, "root");
        assert!(b.password.is_none());

        let c = inventory.host_params("c").unwrap();
        assert_eq!(
            c.private_key_path.as_deref(),
            Some(Path::new("/root/.ssh/id_rsa"))
        );
        assert_eq!(c.private_key_passphrase.as_deref(), Some("123456"));
    }

    #[test]
    fn test_host_in_multiple_groups_keeps_first_definition() {
        let inventory = Inventory::parse(SAMPLE).unwrap();
        // a 在 db 组中再次出现（无参数），仍保留 web 组中的定义
        assert_eq!(inventory.host_params("a").unwrap().port, 2222);
        assert_eq!(inventory.groups_of("a"), vec!["db", "web"]);
    }

    #[test]
    fn test_duplicate_group_header_is_error() {
        let err = Inventory::parse("[web]\na\n[web]\nb\n").unwrap_err();
        assert_eq!(
            err,
            FlockError::InventoryParse {
                line: 3,
                reason: "group web exists".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_port_reports_line() {
        let err = Inventory::parse("a\nhost=b, port=ssh\n").unwrap_err();
        assert!(matches!(err, FlockError::InventoryParse { line: 2, .. }));
    }

    #[test]
    fn test_host_line_without_host_is_error() {
        let err = Inventory::parse("port=22, user=root\n").unwrap_err();
        assert!(matches!(err, FlockError::InventoryParse { line: 1, .. }));
    }

    #[test]
    fn test_add_and_remove() {
        let mut inventory = Inventory::new();
        inventory.add_host("", HostParams::new("x")).unwrap();
        assert!(inventory.group_exists(DEFAULT_GROUP));
        assert!(inventory.add_host("", HostParams::new("x")).is_err());
        assert!(inventory.add_host("missing", HostParams::new("y")).is_err());

        inventory.add_group("ops").unwrap();
        inventory.add_host("ops", HostParams::new("y")).unwrap();
        inventory.add_host("ops", HostParams::new("x")).unwrap();

        inventory.remove_group(DEFAULT_GROUP).unwrap();
        // x 仍在 ops 组中
        assert!(inventory.host_exists("x"));

        inventory.remove_host("x").unwrap();
        assert!(!inventory.host_exists("x"));
        assert_eq!(inventory.group_hosts("ops").len(), 1);
        assert!(inventory.remove_host("x").is_err());
    }

    #[test]
    fn test_yaml_round_trip_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let yaml_path = dir.path().join("inventory.yml");

        let original = Inventory::parse(SAMPLE).unwrap();
        original.save_to_yaml(&yaml_path).unwrap();

        let mut loaded = Inventory::load_file(&yaml_path).unwrap();
        assert_eq!(loaded.list_hosts(), original.list_hosts());
        assert_eq!(loaded.source(), Some(yaml_path.as_path()));

        std::fs::write(&yaml_path, "hosts:\n  z:\n    host: z\ngroups:\n  g: [z]\n").unwrap();
        loaded.reload().unwrap();
        assert_eq!(loaded.list_hosts().into_iter().collect::<Vec<_>>(), vec!["z"]);
        assert_eq!(loaded.host_params("z").unwrap().user, "root");
    }

    #[test]
    fn test_json_validation_rejects_unknown_member() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("inventory.json");
        std::fs::write(
            &json_path,
            r#"{"hosts": {"a": {"host": "a"}}, "groups": {"web": ["a", "ghost"]}}"#,
        )
        .unwrap();

        let err = Inventory::load_file(&json_path).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_reload_without_source_fails() {
        assert!(Inventory::new().reload().is_err());
    }
}
