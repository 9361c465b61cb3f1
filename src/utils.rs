/// 生成唯一的临时文件后缀
///
/// 使用纳秒级时间戳 + 随机数，并发推送同一目标文件时不会冲突。
pub fn generate_temp_suffix() -> String {
    let now = chrono::Utc::now();
    let timestamp = now.timestamp();
    let nanos = now.timestamp_subsec_nanos();
    let random_suffix: u32 = rand::random();

    format!("{}.{}.{}", timestamp, nanos, random_suffix)
}

/// 生成远程临时文件路径
///
/// ```
/// let temp_path = rs_flock::utils::generate_remote_temp_path("/etc/nginx/nginx.conf");
/// assert!(temp_path.starts_with("/etc/nginx/nginx.conf.tmp."));
/// ```
pub fn generate_remote_temp_path(base_path: &str) -> String {
    format!("{}.tmp.{}", base_path, generate_temp_suffix())
}

/// 用单引号包裹，供远程 shell 使用
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_temp_suffix_uniqueness() {
        let mut suffixes = HashSet::new();

        for _ in 0..1000 {
            let suffix = generate_temp_suffix();
            assert!(
                suffixes.insert(suffix.clone()),
                "Generated duplicate suffix: {}",
                suffix
            );
        }
    }

    #[test]
    fn test_remote_temp_path_format() {
        let base = "/etc/config.conf";
        let path = generate_remote_temp_path(base);
        assert!(path.starts_with("/etc/config.conf.tmp."));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
