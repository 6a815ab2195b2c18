//! Drives both engines through the dispatcher using the sample
//! configuration shipped under `config/`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use conform_core::{Settings, ViolationType};
use conform_dispatch::{CollectingPublisher, Dispatcher, OTHER_SOURCE};
use conform_model::ModelValidator;
use conform_rules::RuleValidator;
use serde_json::{json, Value};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn sample_settings() -> Settings {
    let root = workspace_root();
    let mut settings = Settings::from_file(root.join("config/conform.toml")).unwrap();
    settings.rules.dirs = settings.rules.dirs.iter().map(|d| root.join(d)).collect();
    settings.model.mapping_file = settings.model.mapping_file.as_ref().map(|p| root.join(p));
    settings.model.provider.dir = settings.model.provider.dir.as_ref().map(|p| root.join(p));
    settings
}

fn dispatcher() -> (Dispatcher, Arc<CollectingPublisher>) {
    let settings = sample_settings();
    let publisher = Arc::new(CollectingPublisher::new());
    let mut dispatcher = Dispatcher::new(&settings, Box::new(publisher.clone()))
        .with_rule_engine(Box::new(RuleValidator::new(&settings)))
        .with_model_engine(Box::new(ModelValidator::new(&settings)));
    dispatcher.initialise().unwrap();
    (dispatcher, publisher)
}

fn sample_event(name: &str) -> String {
    std::fs::read_to_string(workspace_root().join("config/events").join(name)).unwrap()
}

fn rule_names(result: &conform_core::ValidationResult) -> Vec<String> {
    let mut names: Vec<String> = result
        .violations()
        .iter()
        .filter_map(|v| v.validation_rule().map(str::to_string))
        .collect();
    names.sort();
    names
}

#[test]
fn vserver_event_reports_rule_violations() {
    let (dispatcher, publisher) = dispatcher();
    let outcome = dispatcher.execute(&sample_event("vserver-create.json"), "cli");

    assert!(outcome.error.is_none());
    assert_eq!(outcome.results.len(), 1);
    let result = &outcome.results[0];
    assert_eq!(result.entity_type(), "vserver");
    assert_eq!(rule_names(result), vec!["name-format", "unique-ids"]);
    assert!(result
        .violations()
        .iter()
        .all(|v| v.violation_type() == ViolationType::Rule));

    let published = publisher.messages();
    assert_eq!(published.len(), 1);
    let doc: Value = serde_json::from_str(&published[0]).unwrap();
    assert_eq!(doc["entityType"], "vserver");
    assert_eq!(doc["violations"].as_array().unwrap().len(), 2);
}

#[test]
fn vnf_export_is_compared_against_its_model() {
    let (dispatcher, _) = dispatcher();
    let outcome = dispatcher.execute(&sample_event("vnf-export.json"), "cli");

    assert!(outcome.error.is_none());
    let result = &outcome.results[0];
    let violations = result.violations();
    assert_eq!(violations.len(), 2);

    let missing = violations
        .iter()
        .find(|v| v.violation_type() == ViolationType::MissingRel)
        .unwrap();
    assert_eq!(missing.violation_details()["modelName"], json!("l3-network"));
    assert_eq!(missing.model_name(), Some("vFW"));

    let unexpected = violations
        .iter()
        .find(|v| v.violation_type() == ViolationType::UnexpectedRel)
        .unwrap();
    assert_eq!(unexpected.violation_details()["modelName"], json!("complex"));
}

#[test]
fn unknown_model_version_is_no_model() {
    let (dispatcher, _) = dispatcher();
    let mut event: Value = serde_json::from_str(&sample_event("vnf-export.json")).unwrap();
    event["entity"]["model-version-id"] = json!("missing-1.0");

    let outcome = dispatcher.execute(&event.to_string(), "cli");
    let violations = outcome.results[0].violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].violation_type(), ViolationType::NoModel);
    assert_eq!(violations[0].category(), "INVALID_OBJ");
}

fn service_event(service_type: &str, name: Option<&str>) -> String {
    let mut entity = json!({
        "service-instance-id": "si-1",
        "service-type": service_type,
        "orchestration-status": "Assigned"
    });
    if let Some(name) = name {
        entity["service-instance-name"] = json!(name);
    }
    json!({
        "event-header": {
            "event-type": "POA-EVENT",
            "domain": "dev",
            "action": "UPDATE",
            "entity-type": "service-instance"
        },
        "entity": entity
    })
    .to_string()
}

#[test]
fn indexed_event_uses_rules_for_its_key() {
    let (dispatcher, _) = dispatcher();
    let outcome = dispatcher.execute(&service_event("vFW", Some("fw-01")), "cli");
    assert_eq!(rule_names(&outcome.results[0]), vec!["orchestration-status"]);
}

#[test]
fn indexed_event_falls_back_to_default_rules() {
    let (dispatcher, _) = dispatcher();

    let outcome = dispatcher.execute(&service_event("vCPE", None), "cli");
    assert_eq!(rule_names(&outcome.results[0]), vec!["name-present"]);

    let outcome = dispatcher.execute(&service_event("vCPE", Some("cpe-01")), "cli");
    assert!(outcome.results[0].violations().is_empty());
}

#[test]
fn filtered_and_end_events_are_counted() {
    let (dispatcher, publisher) = dispatcher();

    let mut deleted: Value = serde_json::from_str(&sample_event("vserver-create.json")).unwrap();
    deleted["event-header"]["action"] = json!("delete");
    let mut foreign: Value = serde_json::from_str(&sample_event("vserver-create.json")).unwrap();
    foreign["event-header"]["domain"] = json!("prod");

    for raw in [
        deleted.to_string(),
        foreign.to_string(),
        json!({"event-header": {"event-type": "END-EVENT"}}).to_string(),
        json!({"event-header": {"event-type": "OTHER-EVENT"}}).to_string(),
    ] {
        let outcome = dispatcher.execute(&raw, "bus");
        assert!(outcome.results.is_empty());
    }
    assert!(publisher.messages().is_empty());

    let status = dispatcher.status_snapshot();
    let bus = &status["bus"];
    assert_eq!(bus.total, 4);
    assert_eq!(bus.filtered, 2);
    assert_eq!(bus.end, 1);
    assert_eq!(bus.invalid, 1);
}

#[test]
fn unconfigured_sources_are_counted_as_other() {
    let (dispatcher, _) = dispatcher();
    for i in 0..100 {
        dispatcher.execute("{}", &format!("caller-{i}"));
    }

    let status = dispatcher.status_snapshot();
    let mut buckets: Vec<&str> = status.keys().map(String::as_str).collect();
    buckets.sort();
    assert_eq!(buckets, vec!["bus", "cli", "http", OTHER_SOURCE]);
    assert_eq!(status[OTHER_SOURCE].total, 100);
    assert_eq!(status[OTHER_SOURCE].missing_type, 100);
}
