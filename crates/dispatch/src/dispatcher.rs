//! Event classification, routing and best-effort failure records.
//!
//! Per event: received → {filtered | end-marker | dispatched} →
//! {succeeded | errored}. Every step is counted per source.

use std::collections::BTreeMap;

use conform_core::settings::DispatchSettings;
use conform_core::{
    parse_event, EntityExtractor, EventReader, Settings, ValidationError, ValidationResult,
    Validator, ViolationBuilder, ViolationType,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::counters::{Counter, CounterSnapshot, DispatchCounters, SourceCounters};
use crate::publisher::Publisher;

/// Category of the record built when an event could not be validated.
pub const CANNOT_VALIDATE: &str = "CANNOT_VALIDATE";

/// Outcome of one [`Dispatcher::execute`] call.
#[derive(Debug, Default)]
pub struct DispatchResult {
    /// Results that were (or would have been) published.
    pub results: Vec<ValidationResult>,
    /// Failure text when the event could not be validated.
    pub error: Option<String>,
}

impl DispatchResult {
    fn skipped() -> Self {
        Self::default()
    }

    fn failed(error: String) -> Self {
        Self {
            results: Vec::new(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Rule,
    Model,
}

/// Routes events to the rule or model engine and publishes the results.
pub struct Dispatcher {
    settings: DispatchSettings,
    reader: EventReader,
    rule_engine: Option<Box<dyn Validator>>,
    model_engine: Option<Box<dyn Validator>>,
    publisher: Box<dyn Publisher>,
    counters: DispatchCounters,
}

impl Dispatcher {
    pub fn new(settings: &Settings, publisher: Box<dyn Publisher>) -> Self {
        Self {
            settings: settings.dispatch.clone(),
            reader: EventReader::new(settings.event.clone()),
            rule_engine: None,
            model_engine: None,
            publisher,
            counters: DispatchCounters::new(settings.dispatch.sources.as_slice()),
        }
    }

    pub fn with_rule_engine(mut self, engine: Box<dyn Validator>) -> Self {
        self.rule_engine = Some(engine);
        self
    }

    pub fn with_model_engine(mut self, engine: Box<dyn Validator>) -> Self {
        self.model_engine = Some(engine);
        self
    }

    /// Initialise every configured engine. Must be called before the
    /// dispatcher is shared.
    pub fn initialise(&mut self) -> Result<(), ValidationError> {
        for engine in [&mut self.rule_engine, &mut self.model_engine]
            .into_iter()
            .flatten()
        {
            engine.initialise()?;
            info!(engine = engine.name(), "engine ready");
        }
        Ok(())
    }

    /// Validate one raw event received from `source`.
    pub fn execute(&self, raw: &str, source: &str) -> DispatchResult {
        let counters = self.counters.source(source);
        counters.incr(Counter::Total);

        let event = match parse_event(raw) {
            Ok(event) => event,
            Err(e) => {
                counters.incr(Counter::Errored);
                warn!(source, error = %e, "unparseable event");
                return DispatchResult::failed(e.to_string());
            }
        };

        let Some(event_type) = self.reader.event_type(&event) else {
            counters.incr(Counter::MissingType);
            debug!(source, "event without an event type ignored");
            return DispatchResult::skipped();
        };

        if self.settings.end_event_type.as_deref() == Some(event_type.as_str()) {
            counters.incr(Counter::End);
            info!(source, event_type = %event_type, "end of stream");
            return DispatchResult::skipped();
        }

        if let Some(reason) = self.filter_reason(&event) {
            counters.incr(Counter::Filtered);
            debug!(source, event_type = %event_type, reason = %reason, "event filtered");
            return DispatchResult::skipped();
        }

        let Some(route) = self.route(&event_type) else {
            counters.incr(Counter::Invalid);
            warn!(source, event_type = %event_type, "event type is not routed to any engine");
            return DispatchResult::skipped();
        };

        let engine = match route {
            Route::Rule => {
                counters.incr(Counter::Rule);
                self.rule_engine.as_deref()
            }
            Route::Model => {
                counters.incr(Counter::Model);
                self.model_engine.as_deref()
            }
        };

        let outcome = match engine {
            Some(engine) => engine.validate(&event, source),
            None => Err(ValidationError::NotInitialised(format!(
                "no {route:?} engine configured for event type '{event_type}'"
            ))),
        };

        match outcome {
            Ok(results) => {
                for result in &results {
                    self.publish(result);
                }
                DispatchResult {
                    results,
                    error: None,
                }
            }
            Err(e) => {
                error!(source, event_type = %event_type, error = %e, "validation failed");
                self.failure(&counters, &event, e.to_string())
            }
        }
    }

    /// Per-source counters.
    pub fn status_snapshot(&self) -> BTreeMap<String, CounterSnapshot> {
        self.counters.snapshot()
    }

    fn filter_reason(&self, event: &Value) -> Option<String> {
        if let (Some(expected), Some(domain)) = (&self.settings.domain, self.reader.domain(event)) {
            if &domain != expected {
                return Some(format!("domain '{domain}'"));
            }
        }
        let action = self.reader.action(event)?;
        self.settings
            .excluded_actions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&action))
            .then(|| format!("action '{action}'"))
    }

    fn route(&self, event_type: &str) -> Option<Route> {
        let listed = |types: &[String]| types.iter().any(|t| t == event_type);
        if listed(&self.settings.rule_event_types) {
            Some(Route::Rule)
        } else if listed(&self.settings.model_event_types) {
            Some(Route::Model)
        } else {
            None
        }
    }

    /// Best-effort record for an event that could not be validated. Without
    /// an extractable identity only the error text is returned.
    fn failure(&self, counters: &SourceCounters, event: &Value, error: String) -> DispatchResult {
        counters.incr(Counter::Errored);

        let entity = match self.reader.extract(event) {
            Ok(entity) => entity,
            Err(e) => {
                debug!(error = %e, "no entity identity for the failure record");
                return DispatchResult::failed(error);
            }
        };

        let violation = ViolationBuilder::for_entity(&entity)
            .category(CANNOT_VALIDATE)
            .severity("CRITICAL")
            .violation_type(ViolationType::None)
            .message(error.clone())
            .detail("exception", error.clone())
            .build();
        let result = ValidationResult::new(&entity, vec![violation]);
        self.publish(&result);

        DispatchResult {
            results: vec![result],
            error: Some(error),
        }
    }

    /// Failures are logged and never retried.
    fn publish(&self, result: &ValidationResult) {
        let json = match result.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "validation result not serializable");
                return;
            }
        };
        if let Err(e) = self.publisher.publish(&json) {
            warn!(error = %e, entity_type = result.entity_type(), "publish failed");
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
