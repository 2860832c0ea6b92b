use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Installs the global subscriber for the `matnorm` binary.
///
/// Output goes to stderr so a report printed on stdout stays machine readable.
/// `default_filter` applies when `RUST_LOG` is not set; `LOG_COMPACT=1` drops
/// file and line locations from each event.
pub fn init_logging(default_filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| anyhow::anyhow!("invalid log filter {default_filter:?}: {e}"))?;
    let compact = crate::util::env::env_flag("LOG_COMPACT", false);

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(!compact)
        .with_line_number(!compact)
        .with_file(!compact)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_filter() {
        std::env::remove_var("RUST_LOG");
        let err = init_logging("matnorm=loud").unwrap_err();
        assert!(err.to_string().contains("invalid log filter"));
    }
}
