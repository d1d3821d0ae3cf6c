
use tracing_subscriber::filter::Targets;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::layer::{Layer, SubscriberExt};

/// Library crates whose debug events are shown without a `RUST_LOG` override.
const PIPELINE_TARGETS: &[&str] = &["sanitize", "emoji", "render_md"];

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("Error parsing RUST_LOG env var into targets specifier")]
    InvalidLogEnv(#[source] tracing_subscriber::filter::ParseError),
    #[error("Setting tracing listener failed (setup_logger called twice?)")]
    SetFailed(#[source] tracing::subscriber::SetGlobalDefaultError),
}

/// `RUST_LOG` used when the env var is unset: everything from `crate_name`,
/// debug for the pipeline crates, warnings from the rest.
pub fn default_targets(crate_name: &str) -> String {
    let mut targets = format!("{}=trace", crate_name);
    for target in PIPELINE_TARGETS.iter().filter(|t| **t != crate_name) {
        targets.push_str(&format!(",{}=debug", target));
    }
    targets.push_str(",warn");
    targets
}

/// Install a tree-formatting subscriber writing to stderr, so stdout stays
/// free for output.
pub fn setup_logger(crate_name: &'static str) -> Result<(), LoggerError> {
    let env_targets = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| default_targets(crate_name));
    let env_filter = env_targets.parse::<Targets>().map_err(LoggerError::InvalidLogEnv)?;

    let subscriber = Registry::default()
        .with(tracing_tree::HierarchicalLayer::new(2)
            .with_writer(std::io::stderr)
            .with_targets(true)
            .with_bracketed_fields(true)
            .with_filter(env_filter)
        );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(LoggerError::SetFailed)?;

    debug!(targets = env_targets.as_str(), "logger installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_parse() {
        let targets = default_targets("cook");
        assert_eq!(targets, "cook=trace,sanitize=debug,emoji=debug,render_md=debug,warn");
        assert!(targets.parse::<Targets>().is_ok());
    }

    #[test]
    fn own_crate_is_listed_once() {
        assert_eq!(default_targets("emoji"), "emoji=trace,sanitize=debug,render_md=debug,warn");
    }
}
