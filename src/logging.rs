use log::LevelFilter;

/// Install the process-wide logger. `RUST_LOG` wins over the verbosity flag.
pub fn init(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(default_level);
    if let Ok(spec) = std::env::var("RUST_LOG")
        && !spec.trim().is_empty()
    {
        builder.parse_filters(&spec);
    }
    builder.format_timestamp_secs().target(env_logger::Target::Stderr);

    // A second init (tests, repeated commands) is harmless.
    let _ = builder.try_init();
}
