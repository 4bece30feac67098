use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, MakeWriter, format::FmtSpan},
    prelude::*,
};

use crate::Cli;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Where and how `hpg` logs, resolved from the global CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl From<&Cli> for LogSettings {
    fn from(cli: &Cli) -> Self {
        Self {
            level: cli.log_level.as_tracing_level(),
            json: cli.log_json,
            file: cli.log_file.clone(),
        }
    }
}

impl LogSettings {
    /// Phase spans (`intra_procedural`, `inter_procedural`) report their timing on
    /// close, which only matters when debugging.
    fn span_events(&self) -> FmtSpan {
        if self.level >= Level::DEBUG {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::from_default_env().add_directive(self.level.into())
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(self.level >= Level::DEBUG)
            .with_span_events(self.span_events());
        if self.json {
            layer.json().boxed()
        } else {
            layer.with_ansi(ansi).boxed()
        }
    }
}

/// Installs the global subscriber. Logs go to stderr so graph output on
/// stdout stays clean; the returned guard must outlive the command when
/// logging to a file.
pub fn init_logging(cli: &Cli) -> Option<WorkerGuard> {
    let settings = LogSettings::from(cli);
    let filter = settings.filter();

    let (layer, guard) = match &settings.file {
        Some(path) => {
            let appender = tracing_appender::rolling::never(log_dir(path), log_file_name(path));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (settings.layer(writer, false), Some(guard))
        }
        None => {
            let ansi = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
            (settings.layer(std::io::stderr, ansi), None)
        }
    };

    tracing_subscriber::registry().with(layer).with(filter).init();
    guard
}

fn log_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn log_file_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("hpg.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(args: &[&str]) -> LogSettings {
        use clap::Parser;
        LogSettings::from(&Cli::try_parse_from(args).unwrap())
    }

    #[test]
    fn settings_follow_the_global_flags() {
        let settings = settings(&[
            "hpg",
            "parse",
            "app.js",
            "--log-level",
            "debug",
            "--log-json",
            "--log-file",
            "logs/hpg.log",
        ]);

        assert_eq!(settings.level, Level::DEBUG);
        assert!(settings.json);
        assert_eq!(settings.file, Some(PathBuf::from("logs/hpg.log")));
    }

    #[test]
    fn default_settings_log_warnings_to_stderr() {
        let settings = settings(&["hpg", "build", "."]);

        assert_eq!(settings.level, Level::WARN);
        assert!(!settings.json);
        assert!(settings.file.is_none());
    }

    #[test]
    fn span_timing_only_when_debugging() {
        assert_eq!(settings(&["hpg", "build", "."]).span_events(), FmtSpan::NONE);
        assert_eq!(
            settings(&["hpg", "build", ".", "--log-level", "trace"]).span_events(),
            FmtSpan::CLOSE
        );
    }

    #[test]
    fn bare_file_name_logs_to_current_directory() {
        assert_eq!(log_dir(Path::new("hpg.log")), Path::new("."));
        assert_eq!(log_dir(Path::new("/tmp/logs/run.log")), Path::new("/tmp/logs"));
    }

    #[test]
    fn log_file_name_uses_last_component() {
        assert_eq!(log_file_name(Path::new("/tmp/logs/run.log")), "run.log");
        assert_eq!(log_file_name(Path::new("/")), "hpg.log");
    }
}
