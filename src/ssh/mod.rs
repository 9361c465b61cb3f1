// SSH 会话层：连接、认证、命令执行、文件推送
mod client;
mod file_transfer;
mod hash;
pub(crate) mod keys;
mod session;

pub use client::{SshClient, SshConnector};
pub use file_transfer::DEFAULT_BUFFER_SIZE;
pub use hash::{FileHashInfo, calculate_local_file_hash};
pub use keys::PrivateKey;
pub use session::{AuthMethod, ConnectRequest, RemoteSession, SessionConnector, SessionGuard};
