//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Default socket path when neither `--sockpath` nor `BBUS_SOCKPATH` is set.
pub const DEFAULT_SOCKPATH: &str = "/tmp/bbus.sock";

/// Environment variable consulted when `--sockpath` is absent.
pub const SOCKPATH_ENV: &str = "BBUS_SOCKPATH";

/// The busybus message bus daemon.
#[derive(Debug, Parser)]
#[command(name = "busybusd", version, about)]
pub struct Args {
    /// Unix domain socket path to listen on.
    ///
    /// Falls back to `BBUS_SOCKPATH`, then to `/tmp/bbus.sock`.
    #[arg(short = 's', long)]
    pub sockpath: Option<PathBuf>,
}

impl Args {
    /// Resolve the socket path to listen on, honoring the
    /// flag-over-environment-over-default precedence.
    #[must_use]
    pub fn resolve_sockpath(&self) -> PathBuf {
        self.sockpath
            .clone()
            .or_else(|| std::env::var_os(SOCKPATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKPATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_takes_precedence_over_default() {
        let args = Args { sockpath: Some(PathBuf::from("/tmp/custom.sock")) };
        assert_eq!(args.resolve_sockpath(), PathBuf::from("/tmp/custom.sock"));
    }

    #[test]
    fn falls_back_to_default_when_unset() {
        std::env::remove_var(SOCKPATH_ENV);
        let args = Args { sockpath: None };
        assert_eq!(args.resolve_sockpath(), PathBuf::from(DEFAULT_SOCKPATH));
    }
}
