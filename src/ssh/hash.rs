use crate::error::FlockError;
use crate::ssh::client::SshClient;
use crate::utils::shell_quote;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHashInfo {
    pub hash: String,
    pub size: u64,
}

/// 按缓冲区大小分块计算本地文件的 SHA256
pub fn calculate_local_file_hash(
    local_path: &Path,
    buffer_size: usize,
) -> Result<FileHashInfo, FlockError> {
    let mut file = std::fs::File::open(local_path).map_err(|e| {
        FlockError::Transfer(format!("open {}: {}", local_path.display(), e))
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut size = 0u64;
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }

    Ok(FileHashInfo {
        hash: format!("{:x}", hasher.finalize()),
        size,
    })
}

impl SshClient {
    /// 获取远程文件的 SHA256；远端没有可用的哈希命令时返回 `None`
    pub(super) fn remote_file_hash(&self, remote_path: &str) -> Result<Option<String>, FlockError> {
        let quoted = shell_quote(remote_path);
        let hash_cmd = format!(
            "sha256sum {} 2>/dev/null || shasum -a 256 {} 2>/dev/null",
            quoted, quoted
        );
        let (exit_code, stdout, _stderr) = self.execute_command(&hash_cmd)?;
        if exit_code != 0 {
            return Ok(None);
        }

        Ok(String::from_utf8_lossy(&stdout)
            .split_whitespace()
            .next()
            .map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_local_hash_is_independent_of_buffer_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello flock\n").unwrap();

        let small = calculate_local_file_hash(file.path(), 3).unwrap();
        let large = calculate_local_file_hash(file.path(), 4096).unwrap();
        assert_eq!(small, large);
        assert_eq!(small.size, 12);
        assert_eq!(small.hash.len(), 64);
    }

    #[test]
    fn test_empty_file_hash() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let info = calculate_local_file_hash(file.path(), 0).unwrap();
        assert_eq!(
            info.hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(info.size, 0);
    }

    #[test]
    fn test_missing_local_file() {
        let err = calculate_local_file_hash(Path::new("/nonexistent/file"), 16).unwrap_err();
        assert!(matches!(err, FlockError::Transfer(_)));
    }
}
