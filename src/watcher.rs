use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::workspace::is_ignored_dir;

/// 同一文件在这段时间内的重复事件只报告一次
const DEBOUNCE: Duration = Duration::from_millis(500);

/// 按路径去抖动；过期条目在每次检查时清理
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    seen: HashMap<PathBuf, Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE)
    }
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// 窗口内第一次出现的路径返回 true
    pub fn admit(&mut self, path: &Path, now: Instant) -> bool {
        let window = self.window;
        self.seen.retain(|_, last| now.duration_since(*last) < window);
        if self.seen.contains_key(path) {
            return false;
        }
        self.seen.insert(path.to_path_buf(), now);
        true
    }

    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}

/// 正在运行的文件监视；drop 后停止
pub struct FileWatch {
    _watcher: RecommendedWatcher,
    changes: mpsc::Receiver<PathBuf>,
}

impl FileWatch {
    /// 递归监视 `root`，只上报扩展名匹配的文件（如 ".py"）
    pub fn start(root: &Path, extensions: Vec<String>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<PathBuf>(100);
        let watch_root = root.to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let Ok(event) = res else { return };
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                for path in event.paths {
                    if is_watched(&path, &watch_root, &extensions) {
                        let _ = tx.blocking_send(path);
                    }
                }
            },
            notify::Config::default(),
        )
        .wrap_err("failed to create file watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .wrap_err_with(|| format!("failed to watch {}", root.display()))?;
        debug!("watching {}", root.display());

        Ok(Self {
            _watcher: watcher,
            changes: rx,
        })
    }

    /// 下一个变更的文件；去抖动
    pub async fn next_change(&mut self, debouncer: &mut Debouncer) -> Option<PathBuf> {
        loop {
            let path = self.changes.recv().await?;
            if debouncer.admit(&path, Instant::now()) {
                return Some(path);
            }
        }
    }
}

/// 扩展名匹配且不在忽略目录中；只检查 `root` 以下的路径部分
pub fn is_watched(path: &Path, root: &Path, extensions: &[String]) -> bool {
    if path.is_dir() {
        return false;
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    if relative
        .components()
        .any(|c| is_ignored_dir(c.as_os_str()))
    {
        return false;
    }
    let name = path.to_string_lossy();
    extensions.iter().any(|ext| name.ends_with(ext.as_str()))
}

/// 变更提示
pub fn suggestion_for(path: &Path, root: &Path) -> String {
    let shown = path.strip_prefix(root).unwrap_or(path);
    format!(
        "Change detected in: {}\n   -> Proactive suggestion: consider running tests or refactoring this file.",
        shown.display()
    )
}

/// 监视模式：打印变更提示直到 Ctrl-C
pub async fn watch(root: &Path, extensions: Vec<String>) -> Result<()> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let mut watch = FileWatch::start(&root, extensions.clone())?;
    println!(
        "Giblet is now in watch mode, monitoring {} files under {}",
        extensions.join(", "),
        root.display()
    );
    println!("   (Press Ctrl+C to stop watching)");
    info!("watch mode started for {}", root.display());

    let mut debouncer = Debouncer::default();
    loop {
        tokio::select! {
            change = watch.next_change(&mut debouncer) => {
                match change {
                    Some(path) => println!("\n{}", suggestion_for(&path, &root)),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    println!("\nWatch mode stopped.");
    info!("watch mode stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec![".py".to_string()]
    }

    #[test]
    fn filters_by_extension_and_ignored_dirs() {
        let root = Path::new("/p");
        assert!(is_watched(Path::new("/p/core/agent.py"), root, &exts()));
        assert!(!is_watched(Path::new("/p/core/agent.rs"), root, &exts()));
        assert!(!is_watched(Path::new("/p/.venv/lib/site.py"), root, &exts()));
        assert!(!is_watched(Path::new("/p/__pycache__/x.py"), root, &exts()));
    }

    #[test]
    fn ignored_names_above_the_root_do_not_hide_changes() {
        let root = Path::new("/home/u/work/target/app");
        assert!(is_watched(Path::new("/home/u/work/target/app/main.py"), root, &exts()));
        assert!(!is_watched(Path::new("/home/u/work/target/app/target/gen.py"), root, &exts()));
        let venv_root = Path::new("/home/u/.venv/proj");
        assert!(is_watched(Path::new("/home/u/.venv/proj/core/x.py"), venv_root, &exts()));
    }

    #[test]
    fn debouncer_drops_repeats_and_prunes_expired_entries() {
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        let start = Instant::now();
        assert!(debouncer.admit(Path::new("a.py"), start));
        assert!(!debouncer.admit(Path::new("a.py"), start + Duration::from_millis(100)));
        assert!(debouncer.admit(Path::new("b.py"), start + Duration::from_millis(200)));
        assert_eq!(debouncer.tracked(), 2);

        let later = start + Duration::from_secs(2);
        assert!(debouncer.admit(Path::new("a.py"), later));
        assert_eq!(debouncer.tracked(), 1, "expired entries are removed");
    }

    #[test]
    fn suggestion_shows_relative_path() {
        let msg = suggestion_for(Path::new("/p/core/agent.py"), Path::new("/p"));
        assert!(msg.starts_with("Change detected in: core/agent.py"));
        assert!(msg.contains("running tests"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reports_modified_python_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let mut watch = FileWatch::start(&root, exts()).unwrap();
        // 给后端一点时间完成注册
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(root.join("notes.txt"), "ignored").unwrap();
        std::fs::write(root.join("main.py"), "print('hi')\n").unwrap();

        let mut debouncer = Debouncer::default();
        let changed = tokio::time::timeout(Duration::from_secs(5), watch.next_change(&mut debouncer))
            .await
            .expect("no change reported")
            .unwrap();
        assert_eq!(changed.file_name().unwrap(), "main.py");
    }
}
