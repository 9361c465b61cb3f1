use crate::aggregator::ResultAggregator;
use crate::config::Settings;
use crate::error::FlockError;
use crate::ssh::{AuthMethod, ConnectRequest, RemoteSession, SessionConnector, SessionGuard};
use crate::types::{Action, HostParams, Outcome, Target, TargetSet, TransferSpec};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 单台主机任务的生命周期
///
/// `Created → Authenticating → Connecting → Executing → Completed`，
/// 任一状态出错都直接进入 `Failed`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Authenticating,
    Connecting,
    Executing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// 最大并发会话数，0 表示不限制
    pub forks: usize,
    pub connect_timeout: Duration,
    pub run_timeout: Option<Duration>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        DispatchOptions::from(&Settings::default())
    }
}

impl From<&Settings> for DispatchOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            forks: settings.forks,
            connect_timeout: settings.connect_timeout(),
            run_timeout: settings.run_timeout(),
        }
    }
}

/// 并发分发器：每个目标一个任务，每个任务恰好产生一条结果
pub struct Dispatcher<C: SessionConnector> {
    connector: Arc<C>,
    results: Arc<ResultAggregator>,
    options: DispatchOptions,
    cancel: CancellationToken,
}

impl<C: SessionConnector> Dispatcher<C> {
    pub fn new(connector: C, options: DispatchOptions) -> Self {
        Self {
            connector: Arc::new(connector),
            results: Arc::new(ResultAggregator::new()),
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// 使用外部提供的结果集合
    pub fn with_results(mut self, results: Arc<ResultAggregator>) -> Self {
        self.results = results;
        self
    }

    pub fn results(&self) -> &Arc<ResultAggregator> {
        &self.results
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// 取消令牌；取消后进行中和之后的运行都会把剩余主机记为失败
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 在所有目标上执行命令
    pub async fn run(&self, targets: &TargetSet, command: &str) {
        self.dispatch(targets, Action::Command(command.to_string()))
            .await
    }

    /// 向所有目标推送文件
    pub async fn transfer(
        &self,
        targets: &TargetSet,
        local_path: impl Into<PathBuf>,
        remote_path: &str,
        buffer_size: usize,
    ) {
        let spec = TransferSpec {
            local_path: local_path.into(),
            remote_path: remote_path.to_string(),
            buffer_size,
        };
        self.dispatch(targets, Action::Transfer(spec)).await
    }

    /// 通用的并发执行入口，返回时所有任务都已结束并写入结果
    pub async fn dispatch(&self, targets: &TargetSet, action: Action) {
        let started = Instant::now();
        let run_token = self.cancel.child_token();

        let deadline = self.options.run_timeout.map(|limit| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!("Run timeout of {:?} reached, cancelling unfinished hosts", limit);
                token.cancel();
            })
        });

        let permits = match self.options.forks {
            0 => Semaphore::MAX_PERMITS,
            forks => forks,
        };
        let semaphore = Arc::new(Semaphore::new(permits));
        let action = Arc::new(action);

        info!(
            "Starting {} on {} hosts with max {} concurrent sessions",
            action,
            targets.len(),
            self.options.forks
        );

        let mut handles = Vec::with_capacity(targets.len());
        for target in targets.iter() {
            let worker = Worker {
                connector: self.connector.clone(),
                action: action.clone(),
                semaphore: semaphore.clone(),
                token: run_token.clone(),
                connect_timeout: self.options.connect_timeout,
                started,
            };
            let target = target.clone();
            let results = self.results.clone();
            let host = target.host().to_string();

            let handle = task::spawn(async move {
                let outcome = worker.execute(target).await;
                store(&results, outcome);
            });
            handles.push((host, handle));
        }

        // 等待所有任务完成
        for (host, handle) in handles {
            if let Err(e) = handle.await {
                error!(host = %host, "Worker task aborted: {}", e);
                let outcome = Outcome::failed(
                    host,
                    &FlockError::Execution(format!("worker aborted: {}", e)),
                    started.elapsed(),
                );
                store(&self.results, outcome);
            }
        }

        if let Some(deadline) = deadline {
            deadline.abort();
        }

        let total = started.elapsed();
        self.results.record_total_elapsed(total);
        info!(
            "Run completed in {:?}: {} outcome(s) recorded",
            total,
            self.results.len()
        );
    }
}

/// 重复写入说明该主机本次已经上报过，丢弃后来的结果
fn store(results: &ResultAggregator, outcome: Outcome) {
    let host = outcome.host().to_string();
    if let Err(e) = results.insert(outcome) {
        warn!(host = %host, "Dropping outcome: {}", e);
    }
}

struct Worker<C> {
    connector: Arc<C>,
    action: Arc<Action>,
    semaphore: Arc<Semaphore>,
    token: CancellationToken,
    connect_timeout: Duration,
    started: Instant,
}

impl<C: SessionConnector> Worker<C> {
    async fn execute(self, target: Target) -> Outcome {
        let host = target.host().to_string();

        let Some(params) = target.params().cloned() else {
            warn!(host = %host, "Could not match supplied host pattern");
            return Outcome::warning(host, self.started.elapsed());
        };

        // 获取信号量许可（限制并发数）
        let _permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return self.failed(&host, &FlockError::Cancelled),
            },
            _ = self.token.cancelled() => return self.failed(&host, &FlockError::Cancelled),
        };

        let connector = self.connector.clone();
        let action = self.action.clone();
        let token = self.token.clone();
        let connect_timeout = self.connect_timeout;
        let lifecycle_host = host.clone();

        // ssh2 是阻塞的，整个会话生命周期放到阻塞线程池里
        let blocking = task::spawn_blocking(move || {
            let mut lifecycle = Lifecycle::new(&lifecycle_host);
            let result = lifecycle.drive(&*connector, &params, &action, connect_timeout, &token);
            lifecycle.finish(&result);
            result
        });

        let result = tokio::select! {
            biased;
            joined = blocking => joined.unwrap_or_else(|e| {
                Err(FlockError::Execution(format!("worker panicked: {}", e)))
            }),
            _ = self.token.cancelled() => Err(FlockError::Cancelled),
        };

        match result {
            Ok(done) => Outcome::success(host, done.output, done.changed, self.started.elapsed()),
            Err(e) => self.failed(&host, &e),
        }
    }

    fn failed(&self, host: &str, error: &FlockError) -> Outcome {
        if error.is_task_local() {
            warn!(host = %host, "Task failed: {}", error);
        } else {
            error!(host = %host, "Task failed with unexpected error: {}", error);
        }
        Outcome::failed(host, error, self.started.elapsed())
    }
}

struct Completed {
    output: String,
    changed: bool,
}

struct Lifecycle<'a> {
    host: &'a str,
    state: TaskState,
}

impl<'a> Lifecycle<'a> {
    fn new(host: &'a str) -> Self {
        Self {
            host,
            state: TaskState::Created,
        }
    }

    fn enter(&mut self, next: TaskState) {
        debug!(host = %self.host, from = %self.state, to = %next, "Task state change");
        self.state = next;
    }

    fn finish(&mut self, result: &Result<Completed, FlockError>) {
        match result {
            Ok(_) => self.enter(TaskState::Completed),
            Err(_) => self.enter(TaskState::Failed),
        }
    }

    fn drive<C: SessionConnector>(
        &mut self,
        connector: &C,
        params: &HostParams,
        action: &Action,
        connect_timeout: Duration,
        token: &CancellationToken,
    ) -> Result<Completed, FlockError> {
        self.enter(TaskState::Authenticating);
        let auth = AuthMethod::from_params(params)?;
        checkpoint(token)?;

        self.enter(TaskState::Connecting);
        let request = ConnectRequest::new(params, auth, connect_timeout);
        let mut guard = SessionGuard::new(connector.connect(&request)?);
        checkpoint(token)?;

        self.enter(TaskState::Executing);
        // guard 离开作用域时关闭会话，成功和失败路径都一样
        match action {
            Action::Command(command) => {
                let output = guard.session().run(command)?;
                Ok(Completed {
                    output: String::from_utf8_lossy(&output).into_owned(),
                    changed: false,
                })
            }
            Action::Transfer(spec) => {
                let report = guard.session().transfer(
                    &spec.local_path,
                    &spec.remote_path,
                    spec.buffer_size,
                )?;
                Ok(Completed {
                    output: report.message,
                    changed: report.changed,
                })
            }
        }
    }
}

fn checkpoint(token: &CancellationToken) -> Result<(), FlockError> {
    if token.is_cancelled() {
        Err(FlockError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Executing.is_terminal());
        assert_eq!(TaskState::Authenticating.to_string(), "Authenticating");
    }

    #[test]
    fn test_options_from_settings() {
        let settings = Settings {
            forks: 0,
            connect_timeout_secs: 7,
            run_timeout_secs: Some(30),
            ..Settings::default()
        };
        let options = DispatchOptions::from(&settings);
        assert_eq!(options.forks, 0);
        assert_eq!(options.connect_timeout, Duration::from_secs(7));
        assert_eq!(options.run_timeout, Some(Duration::from_secs(30)));
        assert_eq!(DispatchOptions::default().connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_checkpoint() {
        let token = CancellationToken::new();
        assert!(checkpoint(&token).is_ok());
        token.cancel();
        assert_eq!(checkpoint(&token), Err(FlockError::Cancelled));
    }
}
