//! 私钥加载与预检
//!
//! 传输层在连接阶段才真正使用私钥；这里在拨号之前完整解码（必要时解密）私钥，
//! 让无法使用的私钥（文件不存在、内容损坏、加密但没给口令、口令错误）尽早失败。

use crate::error::FlockError;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Clone)]
pub struct PrivateKey {
    path: PathBuf,
    algorithm: String,
    encrypted: bool,
    passphrase: Option<String>,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("path", &self.path)
            .field("algorithm", &self.algorithm)
            .field("encrypted", &self.encrypted)
            .finish_non_exhaustive()
    }
}

impl PrivateKey {
    /// 读取并解码私钥文件
    ///
    /// # Errors
    /// 文件不可读、内容无法解码、私钥已加密但没有提供口令、或口令错误时返回 `AuthSetup`
    pub fn load(path: &Path, passphrase: Option<&str>) -> Result<Self, FlockError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlockError::AuthSetup(format!("open {}: {}", path.display(), e))
        })?;
        let passphrase = passphrase.filter(|p| !p.is_empty()).map(str::to_string);

        let (key, encrypted) = match russh::keys::decode_secret_key(&content, None) {
            Ok(key) => (key, false),
            Err(russh::keys::Error::KeyIsEncrypted) => {
                let Some(secret) = passphrase.as_deref() else {
                    return Err(FlockError::AuthSetup(
                        "ssh: this private key is passphrase protected".to_string(),
                    ));
                };
                let key = russh::keys::decode_secret_key(&content, Some(secret)).map_err(|e| {
                    FlockError::AuthSetup(format!(
                        "ssh: decrypt private key {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                (key, true)
            }
            Err(e) => {
                return Err(FlockError::AuthSetup(format!(
                    "ssh: parse private key {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let algorithm = key.algorithm().to_string();
        debug!(
            "Loaded private key {} ({}, encrypted: {})",
            path.display(),
            algorithm,
            encrypted
        );
        Ok(Self {
            path: path.to_path_buf(),
            algorithm,
            encrypted,
            passphrase,
        })
    }

    /// 交给 ssh2 做公钥认证时使用的路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }
}
