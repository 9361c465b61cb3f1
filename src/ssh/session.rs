use crate::error::FlockError;
use crate::ssh::keys::PrivateKey;
use crate::types::{HostParams, TransferReport};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// 登录认证方式
#[derive(Clone)]
pub enum AuthMethod {
    Password(String),
    PrivateKey(PrivateKey),
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password(_) => f.write_str("Password(***)"),
            AuthMethod::PrivateKey(key) => f.debug_tuple("PrivateKey").field(key).finish(),
        }
    }
}

impl AuthMethod {
    /// 按主机参数注册认证方式：先密码，后密钥
    ///
    /// 密钥文件读取或解析失败时直接返回错误，不会再去连接。
    pub fn from_params(params: &HostParams) -> Result<Vec<AuthMethod>, FlockError> {
        let mut methods = Vec::new();
        if let Some(password) = params.password.as_deref().filter(|p| !p.is_empty()) {
            methods.push(AuthMethod::Password(password.to_string()));
        }
        if let Some(path) = params.private_key_path.as_deref() {
            let key = PrivateKey::load(path, params.private_key_passphrase.as_deref())?;
            methods.push(AuthMethod::PrivateKey(key));
        }
        Ok(methods)
    }
}

/// 建立连接所需的全部信息
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: Vec<AuthMethod>,
    pub timeout: Duration,
}

impl ConnectRequest {
    pub fn new(params: &HostParams, auth: Vec<AuthMethod>, timeout: Duration) -> Self {
        Self {
            host: params.host.clone(),
            port: params.port,
            user: params.user.clone(),
            auth,
            timeout,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 已认证的远程会话
///
/// 传输层是阻塞式的，调用方负责把它放到阻塞线程池里执行。
pub trait RemoteSession: Send {
    /// 执行命令，返回标准输出；失败时错误里带上远端标准错误
    fn run(&mut self, command: &str) -> Result<Vec<u8>, FlockError>;

    fn transfer(
        &mut self,
        local_path: &Path,
        remote_path: &str,
        buffer_size: usize,
    ) -> Result<TransferReport, FlockError>;

    /// 幂等
    fn close(&mut self);
}

pub trait SessionConnector: Send + Sync + 'static {
    type Session: RemoteSession + 'static;

    fn connect(&self, request: &ConnectRequest) -> Result<Self::Session, FlockError>;
}

/// 持有会话直到作用域结束，任何退出路径上都会关闭
pub struct SessionGuard<S: RemoteSession> {
    session: S,
}

impl<S: RemoteSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    pub fn session(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: RemoteSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.close();
    }
}
