//! provides logging helpers

use std::path::Path;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// initiate the global tracing subscriber
///
/// `level` is the default directive; `RUST_LOG` still takes precedence.
/// When `log_file` is set, logs are additionally written to a daily rolling
/// file next to it. The returned guard must be kept alive to flush that file.
pub fn init(level: LevelFilter, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter(level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (dir, file_name) = split_log_path(path);
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(env_filter(level));
            (Some(file_layer), Some(guard))
        }
        None => (None, None),
    };

    registry().with(fmt_layer).with(file_layer).init();

    guard
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

fn split_log_path(path: &Path) -> (PathBuf, PathBuf) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pfsense-controller.log"));
    (dir, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_log_path_keeps_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("controller.log");

        let (parent, name) = split_log_path(&path);

        assert_eq!(parent, dir.path());
        assert_eq!(name, PathBuf::from("controller.log"));
    }

    #[test]
    fn split_log_path_defaults_to_current_dir() {
        let (parent, name) = split_log_path(Path::new("controller.log"));

        assert_eq!(parent, PathBuf::from("."));
        assert_eq!(name, PathBuf::from("controller.log"));
    }
}
