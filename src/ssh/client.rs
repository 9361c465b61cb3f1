use crate::error::FlockError;
use crate::ssh::session::{AuthMethod, ConnectRequest, RemoteSession, SessionConnector};
use crate::types::TransferReport;
use ssh2::{Channel, Session};
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 基于 ssh2 的连接器
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl SessionConnector for SshConnector {
    type Session = SshClient;

    fn connect(&self, request: &ConnectRequest) -> Result<SshClient, FlockError> {
        SshClient::connect(request)
    }
}

/// SSH 客户端
pub struct SshClient {
    pub(super) session: Session,
    pub(super) host: String,
    closed: bool,
}

impl SshClient {
    /// 拨号、握手并认证，拨号和握手受 `request.timeout` 限制
    pub fn connect(request: &ConnectRequest) -> Result<Self, FlockError> {
        let address = request.address();
        let tcp = dial(request)?;

        // 禁用 Nagle 算法，减少小包延迟
        if let Err(e) = tcp.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", address, e);
        }

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.set_timeout(request.timeout.as_millis().min(u32::MAX as u128) as u32);

        session
            .handshake()
            .map_err(|e| FlockError::Connection(format!("ssh: handshake failed: {}", e)))?;

        authenticate(&session, request)?;

        // 连接建立后不再限制单次操作时长，远程命令可以运行任意久
        session.set_timeout(0);

        info!("Successfully connected to {}", address);

        Ok(Self {
            session,
            host: request.host.clone(),
            closed: false,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// 执行远程命令
    pub fn execute_command(&self, command: &str) -> Result<(i32, Vec<u8>, String), FlockError> {
        let mut channel = self.session.channel_session()?;
        channel.exec(command)?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // 两个流交替读取，任一流写满窗口都不会卡住远端进程
        self.session.set_blocking(false);
        let drained = drain_channel(&mut channel, &mut stdout, &mut stderr);
        self.session.set_blocking(true);
        drained?;

        channel.wait_close()?;
        let exit_code = channel.exit_status()?;
        let stderr = decode_stderr(&stderr);

        debug!(
            "Command '{}' on '{}' executed with exit code: {}",
            command, self.host, exit_code
        );

        Ok((exit_code, stdout, stderr))
    }
}

impl RemoteSession for SshClient {
    fn run(&mut self, command: &str) -> Result<Vec<u8>, FlockError> {
        let (exit_code, stdout, stderr) = self
            .execute_command(command)
            .map_err(|e| FlockError::Execution(e.reason()))?;
        if exit_code != 0 {
            let message = if stderr.is_empty() {
                format!("Process exited with status {}", exit_code)
            } else {
                stderr
            };
            return Err(FlockError::Execution(message));
        }
        Ok(stdout)
    }

    fn transfer(
        &mut self,
        local_path: &Path,
        remote_path: &str,
        buffer_size: usize,
    ) -> Result<TransferReport, FlockError> {
        self.push_file(local_path, remote_path, buffer_size)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.session.disconnect(None, "closing session", None) {
            debug!("Disconnect from {} failed: {}", self.host, e);
        }
    }
}

impl Drop for SshClient {
    fn drop(&mut self) {
        self.close();
    }
}

const DRAIN_IDLE: Duration = Duration::from_millis(5);

/// 非阻塞地读取 stdout 和 stderr，直到远端 EOF 且两个流都读空
fn drain_channel(
    channel: &mut Channel,
    stdout: &mut Vec<u8>,
    stderr: &mut Vec<u8>,
) -> Result<(), FlockError> {
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let mut progressed = read_available(&mut *channel, &mut buffer, stdout)?;
        progressed |= read_available(&mut channel.stderr(), &mut buffer, stderr)?;

        if !progressed {
            if channel.eof() {
                return Ok(());
            }
            std::thread::sleep(DRAIN_IDLE);
        }
    }
}

/// 远端错误输出可能不是 UTF-8，按有损方式解码以保留原始信息
fn decode_stderr(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn read_available(
    stream: &mut impl Read,
    buffer: &mut [u8],
    sink: &mut Vec<u8>,
) -> Result<bool, FlockError> {
    match stream.read(buffer) {
        Ok(0) => Ok(false),
        Ok(read) => {
            sink.extend_from_slice(&buffer[..read]);
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// 依次尝试解析出的每个地址，单个地址的连接时间不超过超时时间
fn dial(request: &ConnectRequest) -> Result<TcpStream, FlockError> {
    let address = request.address();
    let addrs = (request.host.as_str(), request.port)
        .to_socket_addrs()
        .map_err(|e| FlockError::Connection(format!("dial tcp {}: {}", address, e)))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, request.timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Dial {} ({}) failed: {}", address, addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(FlockError::Connection(match last_error {
        Some(e) => format!("dial tcp {}: {}", address, e),
        None => format!("dial tcp {}: no addresses resolved", address),
    }))
}

/// 按注册顺序尝试认证方式，直到通过
fn authenticate(session: &Session, request: &ConnectRequest) -> Result<(), FlockError> {
    if request.auth.is_empty() {
        return Err(FlockError::Connection(
            "ssh: no authentication method provided".to_string(),
        ));
    }

    let mut attempted = Vec::new();
    for method in &request.auth {
        let result = match method {
            AuthMethod::Password(password) => {
                attempted.push("password");
                session.userauth_password(&request.user, password)
            }
            AuthMethod::PrivateKey(key) => {
                attempted.push("publickey");
                session.userauth_pubkey_file(&request.user, None, key.path(), key.passphrase())
            }
        };
        if let Err(e) = result {
            debug!("Authentication attempt for {} failed: {}", request.host, e);
        }
        if session.authenticated() {
            return Ok(());
        }
    }

    Err(FlockError::Connection(format!(
        "ssh: handshake failed: ssh: unable to authenticate, attempted methods [{}]",
        attempted.join(" ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// 先给出一段数据，之后一直返回 WouldBlock
    struct Trickle(Option<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.take() {
                Some(data) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                None => Err(ErrorKind::WouldBlock.into()),
            }
        }
    }

    #[test]
    fn test_read_available_would_block_is_not_an_error() {
        let mut buffer = [0u8; 8];
        let mut sink = Vec::new();
        let mut stream = Trickle(Some(b"err".to_vec()));

        assert!(read_available(&mut stream, &mut buffer, &mut sink).unwrap());
        assert!(!read_available(&mut stream, &mut buffer, &mut sink).unwrap());
        assert_eq!(sink, b"err");
    }

    #[test]
    fn test_read_available_interleaves_streams() {
        let mut buffer = [0u8; 4];
        let mut stdout = Cursor::new(b"out-data".to_vec());
        let mut stderr = Cursor::new(b"err-data".to_vec());
        let (mut out, mut err) = (Vec::new(), Vec::new());

        // 每轮各读一块，较大的一个流不会独占读取
        loop {
            let mut progressed = read_available(&mut stdout, &mut buffer, &mut out).unwrap();
            progressed |= read_available(&mut stderr, &mut buffer, &mut err).unwrap();
            if !progressed {
                break;
            }
        }
        assert_eq!(out, b"out-data");
        assert_eq!(err, b"err-data");
    }

    #[test]
    fn test_read_available_propagates_errors() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(ErrorKind::ConnectionReset.into())
            }
        }
        let err = read_available(&mut Broken, &mut [0u8; 4], &mut Vec::new()).unwrap_err();
        assert!(matches!(err, FlockError::Io(_)));
    }

    #[test]
    fn test_non_utf8_stderr_is_kept() {
        let text = decode_stderr(b"ls: \xff\xfe: No such file");
        assert!(text.starts_with("ls: "));
        assert!(text.ends_with(": No such file"));
    }
}
