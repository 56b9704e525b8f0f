use std::path::Path;

#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};

use starfall_platform::AppPaths;

/// Each run writes a fresh log; the previous run's log is kept under this
/// suffix so a failed update can still be diagnosed after a retry.
const ROTATED_SUFFIX: &str = "log.1";

/// Set up logging for one launcher run: a fresh file log in the data
/// directory, plus terminal output in debug builds. Failure to set up the
/// file log must never prevent a launch, so errors are swallowed here.
pub fn init_logging() {
    let Ok(paths) = AppPaths::new() else {
        return;
    };
    let _ = paths.ensure_dirs();
    let log_path = paths.log_file();
    rotate_previous_log(&log_path);

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("starfall")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        LevelFilter::Debug,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));
    if let Ok(file) = std::fs::File::create(&log_path) {
        loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));
    }

    let _ = CombinedLogger::init(loggers);
    log::info!("Logging to {}", log_path.display());
}

fn rotate_previous_log(log_path: &Path) {
    if log_path.exists() {
        let _ = std::fs::rename(log_path, log_path.with_extension(ROTATED_SUFFIX));
    }
}

#[cfg(test)]
mod tests {
    use super::rotate_previous_log;

    #[test]
    fn rotation_keeps_the_previous_run_log() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let log_path = temp.path().join("launcher.log");
        std::fs::write(&log_path, "previous run\n").expect("log should be written");

        rotate_previous_log(&log_path);

        assert!(!log_path.exists(), "the live log name must be free again");
        assert_eq!(
            std::fs::read_to_string(temp.path().join("launcher.log.1"))
                .expect("rotated log should exist"),
            "previous run\n"
        );
    }

    #[test]
    fn rotation_overwrites_only_the_oldest_log() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let log_path = temp.path().join("launcher.log");
        std::fs::write(&log_path, "run two\n").expect("log should be written");
        std::fs::write(temp.path().join("launcher.log.1"), "run one\n")
            .expect("old rotated log should be written");

        rotate_previous_log(&log_path);

        assert_eq!(
            std::fs::read_to_string(temp.path().join("launcher.log.1"))
                .expect("rotated log should exist"),
            "run two\n"
        );
    }

    #[test]
    fn rotation_without_a_previous_log_is_a_no_op() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        rotate_previous_log(&temp.path().join("launcher.log"));
        assert!(!temp.path().join("launcher.log.1").exists());
    }
}
