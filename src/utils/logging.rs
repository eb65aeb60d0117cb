use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (usually
/// `server.log_level` from the config) applies to this crate and the vector
/// engine, with everything else at `warn`.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,tianqi={lvl},tianqi_vector={lvl},tower_http={lvl}",
            lvl = default_level
        ))
    });

    let builder = fmt().with_env_filter(filter).with_target(false);

    // A second init (e.g. from tests) is not an error worth surfacing
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}
