// SPDX-License-Identifier: CEPL-1.0
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

/// Logs a fatal error with its full cause chain and mirrors it to stderr,
/// so the message survives even when no subscriber is installed.
pub fn report_fatal(err: &anyhow::Error) {
    tracing::error!("fatal: {err:#}");
    eprintln!("texel: fatal error: {err:#}");
    for (depth, cause) in err.chain().skip(1).enumerate() {
        eprintln!("  {}: {cause}", depth + 1);
    }
}
