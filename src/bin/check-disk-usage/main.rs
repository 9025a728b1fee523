//! Check all mounted file systems for disk and inode usage
//!
//! Exits OK, WARNING or CRITICAL depending on the fullest mount in scope, or
//! writes one metric group per measurement with `--metrics`.

mod args;

use std::io::{self, Write};

use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use tabin_disk_usage::check::check_status;
use tabin_disk_usage::config::Settings;
use tabin_disk_usage::provider::ProcMounts;
use tabin_disk_usage::Status;

use crate::args::Args;

/// Plain-text log lines at the level `-v` asks for, unless `RUST_LOG` says
/// otherwise
fn subscriber<W>(verbose: u8, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .finish()
}

/// Diagnostics go to stderr so that stdout only ever carries the check output
#[cfg_attr(test, allow(dead_code))]
fn init_logging(verbose: u8) {
    let _ = tracing::subscriber::set_global_default(subscriber(verbose, io::stderr));
}

#[cfg_attr(test, allow(dead_code))]
fn load_settings(args: &Args) -> Result<Settings, String> {
    let base = match args.config {
        Some(ref path) => Settings::load(path).map_err(|e| e.to_string())?,
        None => Settings::default(),
    };
    Ok(base.merge(args.settings()))
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match load_settings(&args).and_then(|s| s.validate().map_err(|e| e.to_string())) {
        Ok(config) => config,
        Err(e) => {
            let _ = writeln!(io::stdout(), "{}: invalid configuration: {}", Status::Critical, e);
            Status::Critical.exit();
        }
    };

    let provider = ProcMounts::new(config.pseudo_fs_types.clone());
    let stdout = io::stdout();
    let status = check_status(&provider, &config, &mut stdout.lock());
    status.exit();
}

#[cfg(test)]
mod unit {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use super::subscriber;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn logs_are_plain_text() {
        let captured = Captured::default();
        let writer = captured.clone();
        tracing::subscriber::with_default(subscriber(1, move || writer.clone()), || {
            tracing::debug!("skipping /proc: pseudo filesystem");
            tracing::trace!("evaluation finished");
        });

        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("DEBUG"));
        assert!(text.contains("skipping /proc: pseudo filesystem"));
        assert!(!text.contains("evaluation finished"));
        assert!(!text.contains('\x1b'));
    }
}
