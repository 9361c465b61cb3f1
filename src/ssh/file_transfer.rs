use crate::error::FlockError;
use crate::ssh::client::SshClient;
use crate::ssh::hash::calculate_local_file_hash;
use crate::types::TransferReport;
use crate::utils::generate_remote_temp_path;
use ssh2::{RenameFlags, Sftp};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

impl SshClient {
    /// 通过 SFTP 推送文件
    ///
    /// 远端文件大小和 SHA256 都一致时不写入；否则先写到临时文件，
    /// 校验后再原子地移动到目标位置。
    pub fn push_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        buffer_size: usize,
    ) -> Result<TransferReport, FlockError> {
        let buffer_size = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            buffer_size
        };

        let local = calculate_local_file_hash(local_path, buffer_size)?;
        debug!(
            "Local file {} sha256 {} ({} bytes)",
            local_path.display(),
            local.hash,
            local.size
        );

        let sftp = self
            .session
            .sftp()
            .map_err(|e| FlockError::Transfer(format!("sftp: {}", e)))?;

        // 幂等性检查
        if let Ok(stat) = sftp.stat(Path::new(remote_path))
            && stat.size == Some(local.size)
            && self.remote_file_hash(remote_path)?.as_deref() == Some(local.hash.as_str())
        {
            info!("Remote file {} on {} unchanged, skipping transfer", remote_path, self.host);
            return Ok(TransferReport {
                bytes_transferred: 0,
                changed: false,
                message: format!("file unchanged (sha256: {})", local.hash),
            });
        }

        let temp_remote_path = generate_remote_temp_path(remote_path);
        let result = self.upload_and_swap(
            &sftp,
            local_path,
            &temp_remote_path,
            remote_path,
            buffer_size,
            &local.hash,
        );
        if result.is_err() {
            let _ = sftp.unlink(Path::new(&temp_remote_path));
        }
        let bytes_transferred = result?;

        info!(
            "File {} copied to {}:{} ({} bytes)",
            local_path.display(),
            self.host,
            remote_path,
            bytes_transferred
        );

        Ok(TransferReport {
            bytes_transferred,
            changed: true,
            message: format!(
                "transferred {} bytes (sha256: {})",
                bytes_transferred, local.hash
            ),
        })
    }

    fn upload_and_swap(
        &self,
        sftp: &Sftp,
        local_path: &Path,
        temp_remote_path: &str,
        remote_path: &str,
        buffer_size: usize,
        expected_hash: &str,
    ) -> Result<u64, FlockError> {
        let mut source = std::fs::File::open(local_path).map_err(|e| {
            FlockError::Transfer(format!("open {}: {}", local_path.display(), e))
        })?;
        let mut dest = sftp
            .create(Path::new(temp_remote_path))
            .map_err(|e| FlockError::Transfer(format!("create {}: {}", temp_remote_path, e)))?;

        let mut buffer = vec![0u8; buffer_size];
        let mut written = 0u64;
        loop {
            let read = source.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            dest.write_all(&buffer[..read])
                .map_err(|e| FlockError::Transfer(format!("write {}: {}", temp_remote_path, e)))?;
            written += read as u64;
        }
        drop(dest);

        // 远端有哈希命令时校验传输完整性
        if let Some(remote_hash) = self.remote_file_hash(temp_remote_path)?
            && remote_hash != expected_hash
        {
            return Err(FlockError::Transfer(format!(
                "sha256 mismatch after transfer: local {}, remote {}",
                expected_hash, remote_hash
            )));
        }

        sftp.rename(
            Path::new(temp_remote_path),
            Path::new(remote_path),
            Some(RenameFlags::OVERWRITE | RenameFlags::ATOMIC | RenameFlags::NATIVE),
        )
        .map_err(|e| FlockError::Transfer(format!("rename to {}: {}", remote_path, e)))?;

        Ok(written)
    }
}
