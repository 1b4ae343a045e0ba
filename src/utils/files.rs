use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use super::{DocsiftError, DocsiftResult};

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid filename regex"));

/// 清理文件名：只保留字母数字和 `._-`，去掉前导点
pub fn secure_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let replaced = UNSAFE_CHARS.replace_all(base.trim(), "_");
    replaced.trim_start_matches('.').trim_matches('_').to_string()
}

/// 上传文件名: `<unix秒>_<清理后的文件名>`
pub fn upload_filename(original: &str, now: DateTime<Utc>) -> DocsiftResult<String> {
    let cleaned = secure_filename(original);
    if cleaned.is_empty() {
        return Err(DocsiftError::InvalidInput("未选择文件".to_string()));
    }
    Ok(format!("{}_{}", now.timestamp(), cleaned))
}

/// 派生文件名: `<prefix>_<时间戳>_<原文件名>`
pub fn derivative_filename(prefix: &str, original: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}_{}", prefix, now.format("%Y%m%d%H%M%S%6f"), original)
}

/// 校验上传文件的扩展名和大小
pub fn validate_upload(path: &Path, allowed_extensions: &[String], max_bytes: u64) -> DocsiftResult<()> {
    if !path.is_file() {
        return Err(DocsiftError::InvalidInput(format!("文件不存在: {}", path.display())));
    }

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !allowed_extensions.iter().any(|ext| ext.eq_ignore_ascii_case(&extension)) {
        return Err(DocsiftError::InvalidInput(format!(
            "文件类型无效，仅支持: {}",
            allowed_extensions.join(", ")
        )));
    }

    let size = std::fs::metadata(path)?.len();
    if size > max_bytes {
        return Err(DocsiftError::InvalidInput(format!(
            "文件过大: {} 字节，上限 {} MB",
            size,
            max_bytes / (1024 * 1024)
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn secure_filename_strips_paths_and_odd_chars() {
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("my report (final).pdf"), "my_report_final_.pdf");
        assert_eq!(secure_filename(".hidden.pdf"), "hidden.pdf");
    }

    #[test]
    fn derivative_names_keep_source_traceable() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        let name = derivative_filename("annotated", "1700000000_paper.pdf", now);
        assert_eq!(name, "annotated_20260301123005000000_1700000000_paper.pdf");
        assert_eq!(upload_filename("paper.pdf", now).unwrap(), format!("{}_paper.pdf", now.timestamp()));
    }

    #[test]
    fn validate_upload_rejects_wrong_extension_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, b"hello").unwrap();
        let allowed = vec!["pdf".to_string()];
        assert!(matches!(
            validate_upload(&txt, &allowed, 1024),
            Err(DocsiftError::InvalidInput(_))
        ));

        let pdf = dir.path().join("big.PDF");
        std::fs::write(&pdf, vec![0u8; 2048]).unwrap();
        assert!(matches!(
            validate_upload(&pdf, &allowed, 1024),
            Err(DocsiftError::InvalidInput(_))
        ));
        assert!(validate_upload(&pdf, &allowed, 4096).is_ok());

        let missing = dir.path().join("missing.pdf");
        assert!(validate_upload(&missing, &allowed, 4096).is_err());
    }
}
