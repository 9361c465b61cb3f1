pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod inventory;
pub mod manager;
pub mod render;
pub mod resolver;
pub mod ssh;
pub mod types;
pub mod utils;


pub use aggregator::{ResultAggregator, RunReport};
pub use config::Settings;
pub use dispatcher::{DispatchOptions, Dispatcher, TaskState};
pub use error::FlockError;
pub use inventory::Inventory;
pub use manager::{FlockManager, HostParamsBuilder};
pub use resolver::HostResolver;
pub use ssh::{SessionConnector, SshClient, SshConnector};
pub use types::{
    Action, HostParams, Message, Outcome, Status, Target, TargetSet, TransferReport, TransferSpec,
};

// 便捷的重新导出
pub type Result<T> = std::result::Result<T, FlockError>;
