use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::GuardrailsConfig;
use crate::workspace::is_ignored_dir;

/// 超过阈值的文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LongFile {
    pub path: PathBuf,
    pub lines: usize,
}

/// 文件长度护栏：扫描项目中过长的源文件
#[derive(Debug, Clone)]
pub struct ModularityGuardrails {
    pub threshold: usize,
    pub extensions: Vec<String>,
}

impl ModularityGuardrails {
    pub fn new(threshold: usize, extensions: Vec<String>) -> Self {
        Self {
            threshold,
            extensions,
        }
    }

    pub fn from_config(config: &GuardrailsConfig) -> Self {
        Self::new(config.file_length_threshold, config.extensions.clone())
    }

    /// 行数；读取失败按 0 计
    pub fn count_lines(&self, path: &Path) -> usize {
        match std::fs::File::open(path) {
            Ok(file) => BufReader::new(file).split(b'\n').count(),
            Err(e) => {
                warn!("cannot read {}: {}", path.display(), e);
                0
            }
        }
    }

    /// (是否超过阈值, 行数)
    pub fn check_file(&self, path: &Path) -> (bool, usize) {
        let lines = self.count_lines(path);
        (lines > self.threshold, lines)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    /// 递归扫描，按行数降序返回超长文件
    pub fn scan(&self, root: &Path) -> Vec<LongFile> {
        debug!(
            "scanning {} for files longer than {} lines",
            root.display(),
            self.threshold
        );
        let mut long_files: Vec<LongFile> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !(e.file_type().is_dir() && is_ignored_dir(e.file_name()))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.matches_extension(e.path()))
            .filter_map(|e| {
                let (exceeds, lines) = self.check_file(e.path());
                exceeds.then(|| LongFile {
                    path: e.path().to_path_buf(),
                    lines,
                })
            })
            .collect();
        long_files.sort_by(|a, b| b.lines.cmp(&a.lines).then_with(|| a.path.cmp(&b.path)));
        long_files
    }

    /// 把扫描结果渲染成建议文本
    pub fn suggest(&self, report: &[LongFile]) -> String {
        if report.is_empty() {
            return "No files exceeded the length threshold. Your project seems modular!".to_string();
        }
        let mut out = vec![
            "The following files are quite long and might benefit from refactoring:".to_string(),
        ];
        for file in report {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            out.push(format!("- {} ({} lines)", file.path.display(), file.lines));
            out.push(format!(
                "  Suggestion: split large functions or types in '{}' into smaller, focused modules.",
                name
            ));
        }
        out.join("\n")
    }
}
