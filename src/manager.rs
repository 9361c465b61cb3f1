use crate::aggregator::{ResultAggregator, RunReport};
use crate::config::Settings;
use crate::dispatcher::{DispatchOptions, Dispatcher};
use crate::error::FlockError;
use crate::inventory::Inventory;
use crate::resolver::HostResolver;
use crate::ssh::{SessionConnector, SshConnector};
use crate::types::{HostParams, TargetSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 对外的入口：清单 + 分发器 + 运行参数
pub struct FlockManager<C: SessionConnector = SshConnector> {
    inventory: Inventory,
    dispatcher: Dispatcher<C>,
    settings: Settings,
}

impl FlockManager<SshConnector> {
    pub fn new(inventory: Inventory, settings: Settings) -> Self {
        Self::with_connector(inventory, settings, SshConnector)
    }

    /// 按配置中的路径加载清单
    pub fn from_settings(settings: Settings) -> Result<Self, FlockError> {
        let inventory = Inventory::load_file(&settings.inventory)?;
        Ok(Self::new(inventory, settings))
    }
}

impl<C: SessionConnector> FlockManager<C> {
    pub fn with_connector(inventory: Inventory, settings: Settings, connector: C) -> Self {
        let dispatcher = Dispatcher::new(connector, DispatchOptions::from(&settings));
        Self {
            inventory,
            dispatcher,
            settings,
        }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    pub fn results(&self) -> &Arc<ResultAggregator> {
        self.dispatcher.results()
    }

    pub fn clear_results(&self) {
        self.dispatcher.results().clear();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.dispatcher.cancellation_token()
    }

    pub fn resolve(&self, expression: &str) -> Result<TargetSet, FlockError> {
        HostResolver::new(&self.inventory).resolve(expression)
    }

    /// 在匹配的主机上执行命令
    ///
    /// 每次运行前清空上一次的结果，返回本次运行的报告。
    pub async fn execute_command(
        &self,
        expression: &str,
        command: &str,
    ) -> Result<RunReport, FlockError> {
        let targets = self.resolve(expression)?;
        info!("Executing `{}` on {} host(s)", command, targets.len());

        self.clear_results();
        self.dispatcher.run(&targets, command).await;
        Ok(self.report())
    }

    /// 向匹配的主机推送文件
    pub async fn copy_file(
        &self,
        expression: &str,
        local_path: impl Into<PathBuf>,
        remote_path: &str,
    ) -> Result<RunReport, FlockError> {
        let local_path = local_path.into();
        if !local_path.is_file() {
            return Err(FlockError::Transfer(format!(
                "local file {} not found",
                local_path.display()
            )));
        }

        let targets = self.resolve(expression)?;
        info!(
            "Copying {} to {} on {} host(s)",
            local_path.display(),
            remote_path,
            targets.len()
        );

        self.clear_results();
        self.dispatcher
            .transfer(
                &targets,
                local_path,
                remote_path,
                self.settings.transfer_buffer_size,
            )
            .await;
        Ok(self.report())
    }

    pub fn report(&self) -> RunReport {
        self.dispatcher.results().report()
    }

    /// 创建主机参数构建器
    pub fn host_builder() -> HostParamsBuilder {
        HostParamsBuilder::new()
    }
}

#[derive(Default)]
pub struct HostParamsBuilder {
    params: HostParams,
}

impl HostParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: HostParams::default(),
        }
    }

    pub fn host(mut self, host: &str) -> Self {
        self.params.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.params.port = port;
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.params.user = user.to_string();
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.params.password = Some(password.to_string());
        self
    }

    pub fn private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.private_key_path = Some(path.into());
        self
    }

    pub fn passphrase(mut self, passphrase: &str) -> Self {
        self.params.private_key_passphrase = Some(passphrase.to_string());
        self
    }

    pub fn build(self) -> HostParams {
        self.params
    }
}
