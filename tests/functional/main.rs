//! Live verification of the charmed-openstack-exporter snap.
//!
//! Every test here drives the real snapd, systemd, and exporter process on
//! this machine, so the file is compiled only with the `live-snap` feature
//! and the tests run one at a time. The snap must be provisioned first:
//!
//! ```text
//! snapcheck up ./charmed-openstack-exporter_*.snap
//! cargo test -p snapcheck --features live-snap
//! ```

use serial_test::serial;
use snapcheck_common::{
    ConfigScenario, Harness, HarnessError, KeyKind, TargetConfig, init_test_logging, schema,
};

fn harness() -> Harness {
    init_test_logging();
    let config = TargetConfig::load().expect("harness configuration");
    Harness::new(config)
}

#[test]
#[serial]
fn test_binary_answers_help() {
    harness().binary_help().expect("exposed binary answers --help");
}

#[test]
#[serial]
fn test_service_is_active_and_serving() {
    let harness = harness();
    harness.service().await_active().expect("service active");
    harness.await_endpoint().expect("endpoint answers 200");
}

#[test]
#[serial]
fn test_valid_bind_config() {
    let harness = harness();
    ConfigScenario::new(&harness, "web.listen-address", ":9770")
        .run(|h| h.await_listening(":9770", &h.config().snap))
        .expect("exporter owns the new bind");
}

#[test]
#[serial]
fn test_invalid_bind_config() {
    let harness = harness();
    ConfigScenario::new(&harness, "web.listen-address", "test")
        .run(|h| h.service().await_failed())
        .expect("malformed bind drives the unit into failed state");
}

#[test]
#[serial]
fn test_cloud_positional_argument() {
    let harness = harness();
    ConfigScenario::new(&harness, "cloud", "test-cloud")
        .run(|h| {
            h.service().await_active()?;
            h.await_start_cmd_contains(&["test-cloud".to_string()])
        })
        .expect("cloud name reaches the argument vector");
}

#[test]
#[serial]
fn test_config_flags_enable() {
    let harness = harness();
    for spec in schema::KEYS.iter().filter(|s| s.kind == KeyKind::Flag) {
        let fragments = spec.fragments("true");
        ConfigScenario::new(&harness, spec.name, "true")
            .run(|h| {
                h.service().await_active()?;
                h.await_start_cmd_contains(&fragments)
            })
            .unwrap_or_else(|err| panic!("enable {}: {err}", spec.name));
    }
}

#[test]
#[serial]
fn test_config_flags_disable() {
    let harness = harness();
    for spec in schema::KEYS.iter().filter(|s| s.kind == KeyKind::Flag) {
        let flag = format!("--{}", spec.name);
        ConfigScenario::new(&harness, spec.name, "false")
            .run(|h| {
                h.service().await_active()?;
                h.await_start_cmd_lacks(&flag)
            })
            .unwrap_or_else(|err| panic!("disable {}: {err}", spec.name));
    }
}

#[test]
#[serial]
fn test_repeated_flag_set_is_idempotent() {
    let harness = harness();
    let fragments = vec!["--cache".to_string()];
    ConfigScenario::new(&harness, "cache", "true")
        .run(|h| {
            h.service().await_active()?;
            h.await_start_cmd_contains(&fragments)?;
            let first = h.inspector().cmdlines_of(&h.config().process)?;
            // The same assignment again, under the one outer capture.
            h.store().set("cache", "true")?;
            h.service().restart()?;
            h.service().await_active()?;
            h.await_start_cmd_contains(&fragments)?;
            let second = h.inspector().cmdlines_of(&h.config().process)?;
            if first == second {
                Ok(())
            } else {
                Err(HarnessError::AssertionFailed(format!(
                    "argument vector moved after a repeated set: {first:?} vs {second:?}"
                )))
            }
        })
        .expect("repeating cache=true leaves the observed state unchanged");
}

#[test]
#[serial]
fn test_unknown_key_is_refused_by_the_store() {
    let harness = harness();
    match harness.store().exists("nonexistent-option") {
        Err(HarnessError::UnknownKey { .. }) => {}
        other => panic!("expected an unknown-key refusal, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_flags_reject_non_boolean_values() {
    let harness = harness();
    for spec in schema::KEYS.iter().filter(|s| s.kind == KeyKind::Flag) {
        match harness.store().set(spec.name, "test") {
            Err(HarnessError::RejectedValue { .. } | HarnessError::UnknownKey { .. }) => {}
            Err(other) => panic!("unexpected failure for {}: {other}", spec.name),
            Ok(()) => {
                let _ = harness.store().unset(spec.name);
                panic!("{}=test was accepted by the store", spec.name);
            }
        }
    }
}

#[test]
#[serial]
fn test_valid_config_values() {
    let harness = harness();
    for spec in schema::KEYS.iter().filter(|s| s.kind == KeyKind::Value) {
        let fragments = spec.fragments(spec.valid);
        ConfigScenario::new(&harness, spec.name, spec.valid)
            .run(|h| {
                h.service().await_active()?;
                h.await_start_cmd_contains(&fragments)
            })
            .unwrap_or_else(|err| panic!("{}={}: {err}", spec.name, spec.valid));
    }
}

#[test]
#[serial]
fn test_invalid_config_values_break_startup() {
    let harness = harness();
    let breaking = schema::KEYS
        .iter()
        .filter(|s| s.kind == KeyKind::Value)
        .filter_map(|s| s.invalid.map(|bad| (s, bad)));
    for (spec, bad) in breaking {
        ConfigScenario::new(&harness, spec.name, bad)
            .run(|h| h.service().await_failed())
            .unwrap_or_else(|err| panic!("{}={bad}: {err}", spec.name));
    }
}

#[test]
#[serial]
fn test_disable_metrics_fans_out() {
    let harness = harness();
    let spec = schema::find("disable-metrics").expect("schema entry");
    let fragments = spec.fragments(spec.valid);
    ConfigScenario::new(&harness, spec.name, spec.valid)
        .run(|h| {
            h.service().await_active()?;
            h.await_metric_fanout(&fragments)
        })
        .expect("every metric token becomes its own flag");
}
