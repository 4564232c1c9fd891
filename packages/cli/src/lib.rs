// ABOUTME: Library half of the taskweave command line tool
// ABOUTME: Collaborator wiring, task file loading, and subcommand implementations

pub mod app;
pub mod commands;
pub mod input;
pub mod tracker;

/// Structured logging to stderr, filtered by RUST_LOG (default `info`)
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
