//! Tracing subscriber setup
//!
//! RUST_LOG wins when set; otherwise the configured filter is used, raised by
//! the CLI verbosity count.

use tracing_subscriber::EnvFilter;

/// Map a `-v` count onto a filter directive
pub fn filter_for(base: &str, verbose: u8) -> String {
    match verbose {
        0 => base.to_string(),
        1 => "localai_router=debug,info".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber; a second call is a no-op
pub fn init(base_filter: &str, verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_for(base_filter, verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_for_verbosity() {
        assert_eq!(filter_for("warn", 0), "warn");
        assert!(filter_for("warn", 1).contains("debug"));
        assert_eq!(filter_for("warn", 3), "trace");
    }
}
