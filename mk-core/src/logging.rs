use tracing_subscriber::fmt::format::FmtSpan;

// Long-running processes (the `watch` command) want to know where a log line came from and
// when the per-context spans were opened.
pub fn setup(env_filter: &str) {
    tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .compact()
        .init();
}

// Short commands print their actual output on stdout, so logs always go to stderr.
pub fn setup_for_cli(env_filter: &str) {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .without_time()
        .compact()
        .init();
}
