use crate::error::FlockError;
use crate::types::{Outcome, Status};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// 线程安全的主机结果集合
///
/// 每台主机最多一条记录；所有读写互斥，锁只在 map 操作期间持有。
#[derive(Debug, Default)]
pub struct ResultAggregator {
    entries: RwLock<HashMap<String, Outcome>>,
    total_elapsed: RwLock<Option<Duration>>,
}

/// 某一时刻结果集合的快照，用于输出报告
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<Outcome>,
    pub total_elapsed: Option<Duration>,
    pub successful: Vec<String>,
    pub failed: Vec<String>,
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn success_rate(&self) -> f32 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.successful.len() as f32 / self.outcomes.len() as f32
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Outcome>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Outcome>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 插入新结果；主机已有结果时返回 `DuplicateHost`，原记录不变
    pub fn insert(&self, outcome: Outcome) -> Result<(), FlockError> {
        let mut entries = self.write();
        if entries.contains_key(outcome.host()) {
            return Err(FlockError::DuplicateHost(outcome.host().to_string()));
        }
        entries.insert(outcome.host().to_string(), outcome);
        Ok(())
    }

    /// 覆盖已有结果；主机不存在时返回 `NotFound`
    pub fn replace(&self, outcome: Outcome) -> Result<(), FlockError> {
        let mut entries = self.write();
        match entries.get_mut(outcome.host()) {
            Some(slot) => {
                *slot = outcome;
                Ok(())
            }
            None => Err(FlockError::NotFound(outcome.host().to_string())),
        }
    }

    pub fn remove(&self, host: &str) -> Result<Outcome, FlockError> {
        self.write()
            .remove(host)
            .ok_or_else(|| FlockError::NotFound(host.to_string()))
    }

    /// 清空所有结果，不重置总耗时
    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn get(&self, host: &str) -> Option<Outcome> {
        self.read().get(host).cloned()
    }

    pub fn contains(&self, host: &str) -> bool {
        self.read().contains_key(host)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// 按主机名排序的全部结果
    pub fn outcomes(&self) -> Vec<Outcome> {
        let mut outcomes: Vec<Outcome> = self.read().values().cloned().collect();
        outcomes.sort_by(|a, b| a.host().cmp(b.host()));
        outcomes
    }

    pub fn count(&self, status: Status) -> usize {
        self.read().values().filter(|o| o.status() == status).count()
    }

    pub fn total_elapsed(&self) -> Option<Duration> {
        *self
            .total_elapsed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 只由分发器在所有任务结束后调用
    pub(crate) fn record_total_elapsed(&self, elapsed: Duration) {
        *self
            .total_elapsed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(elapsed);
    }

    pub fn report(&self) -> RunReport {
        let outcomes = self.outcomes();
        let hosts_with = |status: Status| {
            outcomes
                .iter()
                .filter(|o| o.status() == status)
                .map(|o| o.host().to_string())
                .collect::<Vec<_>>()
        };
        RunReport {
            successful: hosts_with(Status::Success),
            failed: hosts_with(Status::Failed),
            warnings: hosts_with(Status::Warning),
            total_elapsed: self.total_elapsed(),
            outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ok(host: &str, out: &str) -> Outcome {
        Outcome::success(host, out.to_string(), false, Duration::from_millis(1))
    }

    #[test]
    fn test_insert_duplicate_keeps_first() {
        let stack = ResultAggregator::new();
        stack.insert(ok("a", "first")).unwrap();

        let err = stack.insert(ok("a", "second")).unwrap_err();
        assert_eq!(err, FlockError::DuplicateHost("a".to_string()));
        assert_eq!(stack.get("a").unwrap().message().text(), "first");
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_replace_missing_host_leaves_state_unchanged() {
        let stack = ResultAggregator::new();
        stack.insert(ok("a", "first")).unwrap();

        let err = stack.replace(ok("b", "x")).unwrap_err();
        assert_eq!(err, FlockError::NotFound("b".to_string()));
        assert_eq!(stack.len(), 1);
        assert!(!stack.contains("b"));

        stack.replace(ok("a", "second")).unwrap();
        assert_eq!(stack.get("a").unwrap().message().text(), "second");
    }

    #[test]
    fn test_remove_and_clear() {
        let stack = ResultAggregator::new();
        stack.insert(ok("a", "1")).unwrap();
        stack.insert(ok("b", "2")).unwrap();

        assert_eq!(stack.remove("a").unwrap().host(), "a");
        assert!(matches!(stack.remove("a"), Err(FlockError::NotFound(_))));

        stack.record_total_elapsed(Duration::from_secs(2));
        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.total_elapsed(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_report_classification() {
        let stack = ResultAggregator::new();
        stack.insert(ok("b", "2")).unwrap();
        stack.insert(ok("a", "1")).unwrap();
        stack
            .insert(Outcome::failed(
                "c",
                &FlockError::Connection("refused".into()),
                Duration::ZERO,
            ))
            .unwrap();
        stack.insert(Outcome::warning("d", Duration::ZERO)).unwrap();

        let report = stack.report();
        assert_eq!(report.successful, vec!["a", "b"]);
        assert_eq!(report.failed, vec!["c"]);
        assert_eq!(report.warnings, vec!["d"]);
        assert_eq!(report.success_rate(), 0.5);
        assert!(report.has_failures());
        assert_eq!(stack.count(Status::Success), 2);
        assert!(report.total_elapsed.is_none());
    }

    #[test]
    fn test_concurrent_inserts_accept_exactly_one_per_host() {
        let stack = Arc::new(ResultAggregator::new());
        let mut handles = Vec::new();
        for worker in 0..8 {
            let stack = stack.clone();
            handles.push(std::thread::spawn(move || {
                let mut accepted = 0;
                for host in 0..50 {
                    let outcome = ok(&format!("h{}", host), &format!("w{}", worker));
                    if stack.insert(outcome).is_ok() {
                        accepted += 1;
                    }
                }
                accepted
            }));
        }

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(accepted, 50);
        assert_eq!(stack.len(), 50);
    }
}
