use std::path::{Path, PathBuf};

use log::LevelFilter;

pub const LOG_FILE_BASENAME: &str = "ont";
pub const LOG_FILE_SUFFIX: &str = "log";
pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_ROTATE_KEEP_FILES: usize = 10;
pub const LOG_ENV: &str = "ONT_LOG";
/// Level name mirrored to stderr, or `off`.
pub const LOG_STDERR_ENV: &str = "ONT_LOG_STDERR";

/// Kept apart from the state record so exports and backups never pick up log files.
pub fn log_directory(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

pub fn default_log_spec() -> &'static str {
    if cfg!(debug_assertions) {
        "warn,ont_dashboard_lib=debug,ont=debug"
    } else {
        "warn,ont_dashboard_lib=info,ont=info"
    }
}

/// `ONT_LOG`, then `RUST_LOG`, then the built-in default. Blank values are skipped.
pub fn log_spec_from(ont_log: Option<String>, rust_log: Option<String>) -> String {
    ont_log
        .filter(|value| !value.trim().is_empty())
        .or_else(|| rust_log.filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| default_log_spec().to_string())
}

/// stdout carries command output, so only stderr may mirror the log.
/// Unset or unparsable values fall back to `info` in debug builds and nothing in release.
pub fn stderr_mirror_from(value: Option<String>) -> LevelFilter {
    let fallback = if cfg!(debug_assertions) {
        LevelFilter::Info
    } else {
        LevelFilter::Off
    };
    value
        .and_then(|raw| raw.trim().parse::<LevelFilter>().ok())
        .unwrap_or(fallback)
}

#[cfg(all(feature = "app", not(test)))]
pub fn init_logging(data_dir: &Path) -> Result<(), flexi_logger::FlexiLoggerError> {
    use flexi_logger::{
        detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming, WriteMode,
    };

    let dir = log_directory(data_dir);
    std::fs::create_dir_all(&dir)?;

    let spec = log_spec_from(std::env::var(LOG_ENV).ok(), std::env::var("RUST_LOG").ok());
    let mirror = stderr_mirror_from(std::env::var(LOG_STDERR_ENV).ok());
    let duplicate = match mirror {
        LevelFilter::Off => Duplicate::None,
        LevelFilter::Error => Duplicate::Error,
        LevelFilter::Warn => Duplicate::Warn,
        LevelFilter::Info => Duplicate::Info,
        LevelFilter::Debug => Duplicate::Debug,
        LevelFilter::Trace => Duplicate::Trace,
    };

    Logger::try_with_str(&spec)?
        .log_to_file(
            FileSpec::default()
                .directory(&dir)
                .basename(LOG_FILE_BASENAME)
                .suffix(LOG_FILE_SUFFIX),
        )
        // One-shot commands exit right after printing; flush on every line.
        .write_mode(WriteMode::Direct)
        .format_for_files(detailed_format)
        .rotate(
            Criterion::Size(LOG_ROTATE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(LOG_ROTATE_KEEP_FILES),
        )
        .duplicate_to_stderr(duplicate)
        .start()?;

    install_panic_hook();

    log::info!(
        "logging: initialized dir={} spec={spec} stderr={mirror}",
        dir.display()
    );
    Ok(())
}

#[cfg(all(feature = "app", not(test)))]
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info: &std::panic::PanicHookInfo<'_>| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");
        let location = info
            .location()
            .map(|loc| loc.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        let thread = std::thread::current();
        let thread = thread.name().unwrap_or("<unnamed>");

        log::error!(
            "panic: thread={thread} location={location} payload={payload}\n{}",
            std::backtrace::Backtrace::force_capture()
        );
        default_hook(info);
    }));
}
