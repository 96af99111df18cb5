//! # Tracing Setup
//!
//! Every pass runs inside a `reconcile` span carrying `kind` and `key`, so the
//! compact format shows which pair a line belongs to:
//!
//! ```text
//! INFO reconcile{kind="Service" key=default/hello}: Creating physical object pkey=vsync-host/hello-x-default-x-vsync
//! ```
//!
//! Filtering follows `RUST_LOG`, e.g. `RUST_LOG=vsync_framework=debug`.

/// Initializes the global subscriber. Later calls are ignored.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
