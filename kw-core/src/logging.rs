use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

// RUST_LOG, if it's set, wins over the --verbosity flag, so that a single misbehaving module can be
// turned up in a running deployment without editing its args
pub fn setup(verbosity: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity));
    tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW)
        .with_target(false)
        .with_env_filter(filter)
        .compact()
        .init();
}
