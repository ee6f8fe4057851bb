use std::io::Write;

/// Initialise logging for a process, tagging every line with `component`.
///
/// Defaults to the `info` level, `RUST_LOG` overrides it.
pub fn init(component: &'static str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(move |buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{component}] {}: {}",
                buf.timestamp(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
