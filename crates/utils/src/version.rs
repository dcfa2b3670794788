use std::sync::LazyLock;

/// Defines the application version.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    let sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown");
    let dirty = option_env!("VERGEN_GIT_DIRTY") == Some("true");
    format!(
        "{}-{}{}",
        env!("RELEASE_VERSION"),
        &sha[..sha.len().min(8)],
        if dirty { "-dirty" } else { "" }
    )
});
