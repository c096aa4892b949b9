//! Tracing subscriber setup for the installer.
//!
//! Events from this crate at debug level or above are appended to the log
//! file as `timestamp LEVEL target: message`. Events at or above the
//! verbosity-selected level are mirrored to stderr. Events from other crates
//! (the HTTP client, for instance) only reach either sink at warn or above.
//!
//! Call sites use the `log` facade; the subscriber installs the `tracing-log`
//! bridge so those records flow through the same layers.

use camino::Utf8Path;
use std::fs::{File, OpenOptions};
use std::io;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::{self, MakeWriter, time::ChronoUtc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

const CRATE_TARGET: &str = "envoy_ai_installer";

/// Target for records that belong in the log file but not on stderr, such as
/// the final run error that `main` already prints itself.
pub const FILE_ONLY_TARGET: &str = "envoy_ai_installer::outcome";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Map `-q`/`-v` flags to the stderr mirror level.
///
/// ```
/// use envoy_ai_installer::logging::stderr_level;
/// use tracing_subscriber::filter::LevelFilter;
///
/// assert_eq!(stderr_level(true, 3), LevelFilter::ERROR);
/// assert_eq!(stderr_level(false, 0), LevelFilter::WARN);
/// assert_eq!(stderr_level(false, 2), LevelFilter::DEBUG);
/// ```
#[must_use]
pub const fn stderr_level(quiet: bool, verbose: u8) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// This crate at `level`; everything else capped at warn.
fn targets(level: LevelFilter) -> Targets {
    Targets::new()
        .with_target(CRATE_TARGET, level)
        .with_default(level.min(LevelFilter::WARN))
}

/// Build the installer subscriber over arbitrary writers.
///
/// `file` receives timestamped lines at debug level and above; `stderr`
/// receives untimed lines at `stderr_level` and above.
pub fn subscriber<F, E>(
    file: Option<F>,
    stderr: E,
    stderr_level: LevelFilter,
) -> impl Subscriber + Send + Sync + 'static
where
    F: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
    E: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let file_layer = file.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_owned()))
            .with_filter(targets(LevelFilter::DEBUG))
    });
    let stderr_layer = fmt::layer()
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_filter(targets(stderr_level).with_target(FILE_ONLY_TARGET, LevelFilter::OFF));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
}

/// Open `path` for appending, creating parent directories as needed.
///
/// # Errors
///
/// Returns the underlying I/O error.
pub fn open_log_file(path: &Utf8Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the process-wide subscriber and the `log` bridge.
///
/// An unwritable log file degrades to stderr-only logging with a warning.
///
/// # Errors
///
/// Returns [`TryInitError`] when a global subscriber or logger is already
/// installed.
pub fn init(log_path: Option<&Utf8Path>, stderr_level: LevelFilter) -> Result<(), TryInitError> {
    let (file, open_failure) = match log_path.map(open_log_file) {
        Some(Ok(file)) => (Some(Mutex::new(file)), None),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };

    subscriber(file, io::stderr, stderr_level).try_init()?;

    if let (Some(path), Some(err)) = (log_path, open_failure) {
        log::warn!("cannot open log file {path}: {err}; logging to stderr only");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().expect("lock").clone()).expect("utf-8")
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for SharedBuf {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Run `emit` under a subscriber writing to in-memory sinks.
    fn capture(stderr_level: LevelFilter, emit: impl FnOnce()) -> (String, String) {
        let file = SharedBuf::default();
        let stderr = SharedBuf::default();
        tracing::subscriber::with_default(
            subscriber(Some(file.clone()), stderr.clone(), stderr_level),
            emit,
        );
        (file.text(), stderr.text())
    }

    #[rstest]
    #[case(false, 0, LevelFilter::WARN)]
    #[case(false, 1, LevelFilter::INFO)]
    #[case(false, 3, LevelFilter::TRACE)]
    #[case(false, 9, LevelFilter::TRACE)]
    #[case(true, 1, LevelFilter::ERROR)]
    fn verbosity_flags_select_the_mirror_level(
        #[case] quiet: bool,
        #[case] verbose: u8,
        #[case] expected: LevelFilter,
    ) {
        assert_eq!(stderr_level(quiet, verbose), expected);
    }

    #[test]
    fn file_lines_carry_timestamp_level_and_target() {
        let (file, _) = capture(LevelFilter::WARN, || {
            tracing::info!(target: "envoy_ai_installer::install", "installed eg");
        });

        let line = file.lines().next().expect("one line");
        let timestamp = line.split_whitespace().next().expect("timestamp");
        assert!(
            chrono::DateTime::parse_from_rfc3339(timestamp).is_ok(),
            "not RFC 3339: {line}"
        );
        assert!(line.contains("INFO"), "line: {line}");
        assert!(line.ends_with("envoy_ai_installer::install: installed eg"), "line: {line}");
    }

    #[test]
    fn file_gets_debug_while_stderr_respects_verbosity() {
        let (file, stderr) = capture(LevelFilter::WARN, || {
            tracing::debug!(target: "envoy_ai_installer::install", "fetching values");
            tracing::warn!(target: "envoy_ai_installer::install", "values unavailable");
        });

        assert!(file.contains("fetching values"));
        assert!(file.contains("values unavailable"));
        assert!(!stderr.contains("fetching values"));
        assert!(stderr.contains("WARN"));
        assert!(stderr.contains("values unavailable"));
    }

    #[test]
    fn foreign_targets_are_limited_to_warnings() {
        let (file, stderr) = capture(LevelFilter::TRACE, || {
            tracing::debug!(target: "ureq::pool", "connection pooled");
            tracing::warn!(target: "ureq::tls", "certificate expires soon");
        });

        assert!(!file.contains("connection pooled"));
        assert!(!stderr.contains("connection pooled"));
        assert!(file.contains("certificate expires soon"));
        assert!(stderr.contains("certificate expires soon"));
    }

    #[test]
    fn file_only_records_stay_off_stderr() {
        let (file, stderr) = capture(LevelFilter::TRACE, || {
            tracing::error!(target: FILE_ONLY_TARGET, "install step aieg failed");
        });

        assert!(file.contains("install step aieg failed"));
        assert!(stderr.is_empty(), "stderr: {stderr}");
    }

    #[test]
    fn quiet_mode_still_mirrors_errors() {
        let (_, stderr) = capture(LevelFilter::ERROR, || {
            tracing::warn!(target: "envoy_ai_installer::doctor", "redis absent");
            tracing::error!(target: "envoy_ai_installer::doctor", "cluster unreachable");
        });

        assert!(!stderr.contains("redis absent"));
        assert!(stderr.contains("cluster unreachable"));
    }

    #[test]
    fn log_file_parents_are_created_and_appended() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = Utf8Path::from_path(dir.path()).expect("utf-8 tempdir");
        let path = root.join("nested/logs/installer.log");

        {
            let mut file = open_log_file(&path).expect("open");
            writeln!(file, "first").expect("write");
        }
        {
            let mut file = open_log_file(&path).expect("reopen");
            writeln!(file, "second").expect("write");
        }

        let contents = std::fs::read_to_string(&path).expect("read");
        assert_eq!(contents, "first\nsecond\n");
    }
}
