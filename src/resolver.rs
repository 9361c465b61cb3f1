use crate::error::FlockError;
use crate::inventory::Inventory;
use crate::types::{Target, TargetSet};
use regex::Regex;
use tracing::debug;

/// 把主机表达式展开成目标集合
///
/// 表达式以逗号分隔，每一项可以是：
/// - `*`：inventory 中的全部主机
/// - 含 `*` 的模式：只锚定开头，`10*` 匹配 `10.0.0.1`，不匹配 `x10`；
///   除 `*` 外的字符都按字面匹配，`.` 不是正则任意字符，`10.0*` 不会匹配 `10a0b`
/// - 组名：该组的全部主机
/// - 其他：按字面主机名加入，即使 inventory 中不存在
pub struct HostResolver<'a> {
    inventory: &'a Inventory,
}

impl<'a> HostResolver<'a> {
    pub fn new(inventory: &'a Inventory) -> Self {
        Self { inventory }
    }

    pub fn resolve(&self, expression: &str) -> Result<TargetSet, FlockError> {
        if expression.trim().is_empty() {
            return Err(FlockError::EmptyExpression);
        }

        let mut targets = TargetSet::new();
        let mut tokens = 0usize;

        for token in expression.split(',').map(str::trim) {
            if token.is_empty() {
                continue;
            }
            tokens += 1;

            if token == "*" {
                for host in self.inventory.list_hosts() {
                    self.add(&mut targets, host);
                }
            } else if token.contains('*') {
                let pattern = wildcard_pattern(token)?;
                for host in self.inventory.list_hosts() {
                    if pattern.is_match(&host) {
                        self.add(&mut targets, host);
                    }
                }
            } else if self.inventory.group_exists(token) {
                for host in self.inventory.group_hosts(token) {
                    self.add(&mut targets, host);
                }
            } else {
                self.add(&mut targets, token.to_string());
            }
        }

        if tokens == 0 {
            return Err(FlockError::EmptyExpression);
        }

        debug!(
            "Resolved '{}' to {} target(s): {:?}",
            expression,
            targets.len(),
            targets.hosts()
        );
        Ok(targets)
    }

    fn add(&self, targets: &mut TargetSet, host: String) {
        let params = self.inventory.host_params(&host).cloned();
        targets.insert(Target::new(host, params));
    }
}

/// `web*01` -> `^web.*01`
fn wildcard_pattern(token: &str) -> Result<Regex, FlockError> {
    let body = token
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}", body))
        .map_err(|e| FlockError::Inventory(format!("invalid host pattern '{}': {}", token, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> Inventory {
        Inventory::parse("[web]\na\nb\n[db]\nc\n[lan]\n10.0.0.1\n10.0.0.2\n10a0b\nx10\n").unwrap()
    }

    fn hosts(set: &TargetSet) -> Vec<&str> {
        set.hosts()
    }

    #[test]
    fn test_resolve_group() {
        let inventory = inventory();
        let resolver = HostResolver::new(&inventory);
        assert_eq!(hosts(&resolver.resolve("web").unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_resolve_all() {
        let inventory = Inventory::parse("[web]\na\nb\n[db]\nc\n").unwrap();
        let resolver = HostResolver::new(&inventory);
        assert_eq!(hosts(&resolver.resolve("*").unwrap()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_resolve_literals() {
        let inventory = inventory();
        let resolver = HostResolver::new(&inventory);
        let set = resolver.resolve(" a , c ").unwrap();
        assert_eq!(hosts(&set), vec!["a", "c"]);
        assert!(set.iter().all(Target::is_known));
    }

    #[test]
    fn test_resolve_empty_expression() {
        let inventory = inventory();
        let resolver = HostResolver::new(&inventory);
        assert_eq!(resolver.resolve(""), Err(FlockError::EmptyExpression));
        assert_eq!(resolver.resolve("  "), Err(FlockError::EmptyExpression));
        assert_eq!(resolver.resolve(" , ,"), Err(FlockError::EmptyExpression));
    }

    #[test]
    fn test_wildcard_is_prefix_anchored() {
        let inventory = inventory();
        let resolver = HostResolver::new(&inventory);
        assert_eq!(
            hosts(&resolver.resolve("10*").unwrap()),
            vec!["10.0.0.1", "10.0.0.2", "10a0b"]
        );
        // 点按字面匹配，不当作正则任意字符
        assert_eq!(
            hosts(&resolver.resolve("10.0*").unwrap()),
            vec!["10.0.0.1", "10.0.0.2"]
        );
        assert!(resolver.resolve("x1*").unwrap().contains("x10"));
    }

    #[test]
    fn test_unknown_literal_is_kept_without_params() {
        let inventory = inventory();
        let resolver = HostResolver::new(&inventory);
        let set = resolver.resolve("ghost,a").unwrap();
        assert_eq!(hosts(&set), vec!["a", "ghost"]);
        assert!(!set.get("ghost").unwrap().is_known());
        assert!(set.get("a").unwrap().is_known());
    }

    #[test]
    fn test_overlapping_tokens_are_deduplicated() {
        let inventory = inventory();
        let resolver = HostResolver::new(&inventory);
        let set = resolver.resolve("a,web,*,a*,b").unwrap();
        let names = hosts(&set);
        let mut unique = names.clone();
        unique.dedup();
        assert_eq!(names, unique);
        assert_eq!(set.len(), inventory.len());
    }
}
