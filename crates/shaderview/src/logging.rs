use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

#[derive(Debug, thiserror::Error)]
#[error("unable to open log file {path}: {source}")]
pub struct LogError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

/// Console and log-file output for one run.
///
/// Every event goes to stdout and to the log file, which is truncated when
/// the session opens and closed when it is dropped.
pub struct LogSession {
    path: PathBuf,
    dispatch: Dispatch,
}

impl LogSession {
    pub fn open(path: &Path) -> Result<Self, LogError> {
        let file = File::create(path).map_err(|source| LogError {
            path: path.to_path_buf(),
            source,
        })?;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(false).without_time())
            .with(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false)
                    .without_time(),
            );

        Ok(Self {
            path: path.to_path_buf(),
            dispatch: Dispatch::new(subscriber),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` with this session as the active subscriber.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn writes_events_to_file_without_ansi() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.log");

        {
            let session = LogSession::open(&path).unwrap();
            assert_eq!(session.path(), path.as_path());
            session.scope(|| {
                tracing::info!(answer = 42, "hello from the log");
                tracing::error!("something failed");
            });
        }

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("hello from the log"));
        assert!(contents.contains("answer=42"));
        assert!(contents.contains("ERROR"));
        assert!(!contents.contains('\u{1b}'));
    }

    #[test]
    fn truncates_previous_log() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.log");
        fs::write(&path, "stale line from an earlier run\n").unwrap();

        let session = LogSession::open(&path).unwrap();
        session.scope(|| tracing::info!("fresh"));
        drop(session);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("stale line"));
        assert!(contents.contains("fresh"));
    }

    #[test]
    fn unopenable_path_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing-dir").join("run.log");
        let err = LogSession::open(&path).err().unwrap();
        assert!(err.to_string().contains("missing-dir"));
    }
}
