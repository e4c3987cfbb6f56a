use std::path::Path;

use tracing_core::{Level, LevelFilter};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, Layer};

use crate::error::{ExperimentError, Result};

/// If a global tracing subscriber is not already configured, set up logging to a file,
/// and add a panic hook pointing to it.
///
/// Returns `false` when another subscriber was already installed.
pub fn install_file_logger<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    let file_name = path.file_name().ok_or_else(|| {
        ExperimentError::InvalidConfig(format!(
            "the log path `{}` does not point to a file",
            path.display()
        ))
    })?;
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(directory).map_err(|err| ExperimentError::io(directory, err))?;

    let writer = tracing_appender::rolling::never(directory, file_name);
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(LevelFilter::INFO)
        .with_filter(filter_fn(|metadata| {
            // Backends are chatty at `info`.
            !matches!(
                metadata.module_path(),
                Some(module) if module.starts_with("wgpu") && *metadata.level() >= Level::INFO
            )
        }));

    if registry().with(layer).try_init().is_err() {
        return Ok(false);
    }

    update_panic_hook(path);
    Ok(true)
}

fn update_panic_hook(path: &Path) {
    let hook = std::panic::take_hook();
    let path = path.display().to_string();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {info}");
        eprintln!(
            "=== PANIC ===\nThe experiment stopped abruptly, the log is at => '{path}'\n============="
        );
        hook(info);
    }));
}
