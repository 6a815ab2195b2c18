//! Server startup: settings, engines and publisher wired into a dispatcher.

use anyhow::Context;
use tracing::info;

use conform_core::{Config, Settings};
use conform_dispatch::{publisher_from_config, Dispatcher};
use conform_model::ModelValidator;
use conform_rules::RuleValidator;

/// Load settings, build the configured engines, and initialise them.
///
/// Runs outside the async runtime: engine initialisation reads files and may
/// build a blocking HTTP client.
pub fn build_dispatcher(config: &Config) -> anyhow::Result<Dispatcher> {
    let path = &config.engine.settings_path;
    let settings = Settings::from_file(path)
        .with_context(|| format!("loading engine settings from {}", path.display()))?;
    info!(
        rule_event_types = settings.dispatch.rule_event_types.len(),
        model_event_types = settings.dispatch.model_event_types.len(),
        rule_dirs = settings.rules.dirs.len(),
        "engine settings loaded"
    );

    let publisher = publisher_from_config(&config.publish).context("building publisher")?;
    let mut dispatcher = Dispatcher::new(&settings, publisher);

    if !settings.dispatch.rule_event_types.is_empty() || !settings.rules.dirs.is_empty() {
        dispatcher = dispatcher.with_rule_engine(Box::new(RuleValidator::new(&settings)));
    }
    if !settings.dispatch.model_event_types.is_empty() {
        dispatcher = dispatcher.with_model_engine(Box::new(ModelValidator::new(&settings)));
    }

    dispatcher.initialise().context("initialising validation engines")?;
    Ok(dispatcher)
}
