use env_logger::{Builder, Env};
use log::{debug, error, info};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Once;
use chrono::{Local, Utc};

static INIT: Once = Once::new();

// Keep only the latest log files
const MAX_LOG_FILES: usize = 10;

/// Initialize the logging system
pub fn init_logger(default_level: &str) {
    INIT.call_once(|| {
        let log_dir = get_log_dir();
        let log_file = get_log_file_path(&log_dir);

        let env = Env::default().filter_or("LOG_LEVEL", default_level);
        let mut builder = Builder::from_env(env);
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
        {
            Ok(file) => {
                builder
                    .target(env_logger::Target::Pipe(Box::new(FileAndStdout { file })))
                    .init();

                info!("Logging initialized: {}", log_file.display());
                debug!("Log level: {}", get_log_level(default_level));
                info!("Risk engine starting at {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
            }
            Err(e) => {
                eprintln!("Failed to open log file: {}", e);
                builder.init();
                error!("Failed to open log file, logging to stdout only: {}", e);
            }
        }

        if let Err(e) = clean_old_logs(&log_dir) {
            error!("Failed to clean old logs: {}", e);
        }
    });
}

/// Get the log directory path
fn get_log_dir() -> PathBuf {
    let path = env::var("LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs"));

    if !path.exists() {
        if let Err(e) = fs::create_dir_all(&path) {
            eprintln!("Failed to create log directory: {}", e);
        }
    }

    path
}

/// Get the log file path for the current run
fn get_log_file_path(log_dir: &Path) -> PathBuf {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    log_dir.join(format!("risk_engine_{}.log", timestamp))
}

fn get_log_level(default_level: &str) -> String {
    env::var("LOG_LEVEL").unwrap_or_else(|_| default_level.to_string())
}

/// Clean up old log files, newest first
fn clean_old_logs(log_dir: &Path) -> std::io::Result<()> {
    let mut log_files = Vec::new();

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|ext| ext == "log").unwrap_or(false) {
            let modified = fs::metadata(&path)?.modified()?;
            log_files.push((modified, path));
        }
    }

    log_files.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, file) in log_files.iter().skip(MAX_LOG_FILES) {
        debug!("Removing old log file: {}", file.display());
        fs::remove_file(file)?;
    }

    Ok(())
}

/// Custom writer that writes to both a file and stdout
struct FileAndStdout {
    file: File,
}

impl Write for FileAndStdout {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stdout().flush()?;
        self.file.flush()?;
        Ok(())
    }
}
