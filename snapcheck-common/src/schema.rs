//! The snap's configuration surface, as the harness knows it.
//!
//! Each entry pairs a config key with how its value must show up in the
//! exporter's argument vector, plus example values: one the service is known
//! to accept, and where start-time validation exists, one it is known to
//! refuse. Validity itself is always judged by the target's response, never
//! by the harness; this table only drives scenario generation and the
//! argument assertions that follow a successful restart.

use serde::Serialize;

/// How a stored key materializes on the exporter command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyKind {
    /// Boolean option: `true` adds a bare `--<key>` flag, `false` omits it.
    Flag,
    /// Forwarded verbatim as `--<key>=<value>`.
    Value,
    /// A `host:port` bind the exporter listens on, `--<key>=<value>`.
    Bind,
    /// Passed through as a positional argument.
    Positional,
    /// Space-separated list fanned out to repeated `--disable-metric=<item>`.
    MetricList,
}

/// One configuration key the target snap recognizes.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct KeySpec {
    pub name: &'static str,
    pub kind: KeyKind,
    /// A value the service accepts and converges to Active with.
    pub valid: &'static str,
    /// A value the store accepts but the service refuses to start with.
    pub invalid: Option<&'static str>,
}

impl KeySpec {
    const fn flag(name: &'static str) -> Self {
        Self {
            name,
            kind: KeyKind::Flag,
            valid: "true",
            invalid: None,
        }
    }

    const fn value(name: &'static str, valid: &'static str, invalid: Option<&'static str>) -> Self {
        Self {
            name,
            kind: KeyKind::Value,
            valid,
            invalid,
        }
    }

    /// Command-line fragments the running process must show once this key
    /// holds `value`. Matching is substring-based against the observed
    /// command line. Bind keys produce none; they are verified through the
    /// listening socket instead.
    pub fn fragments(&self, value: &str) -> Vec<String> {
        match self.kind {
            KeyKind::Flag => vec![format!("--{}", self.name)],
            KeyKind::Value => vec![format!("--{}={}", self.name, value)],
            KeyKind::Bind => Vec::new(),
            KeyKind::Positional => vec![value.to_string()],
            KeyKind::MetricList => value
                .split_whitespace()
                .map(|item| format!("--disable-metric={item}"))
                .collect(),
        }
    }
}

/// Every key the harness exercises.
pub const KEYS: &[KeySpec] = &[
    KeySpec::flag("collect-metric-time"),
    KeySpec::flag("disable-cinder-agent-uuid"),
    KeySpec::flag("disable-deprecated-metrics"),
    KeySpec::flag("disable-service.baremetal"),
    KeySpec::flag("disable-service.compute"),
    KeySpec::flag("disable-service.container-infra"),
    KeySpec::flag("disable-service.database"),
    KeySpec::flag("disable-service.dns"),
    KeySpec::flag("disable-service.gnocchi"),
    KeySpec::flag("disable-service.identity"),
    KeySpec::flag("disable-service.image"),
    KeySpec::flag("disable-service.load-balancer"),
    KeySpec::flag("disable-service.network"),
    KeySpec::flag("disable-service.object-store"),
    KeySpec::flag("disable-service.orchestration"),
    KeySpec::flag("disable-service.placement"),
    KeySpec::flag("disable-service.volume"),
    KeySpec::flag("disable-slow-metrics"),
    KeySpec::flag("multi-cloud"),
    KeySpec::flag("cache"),
    KeySpec::value("endpoint-type", "public", None),
    KeySpec::value("log.format", "json", Some("test")),
    KeySpec::value("log.level", "info", Some("test")),
    KeySpec::value("os-client-config", "/etc/openstack/test.yaml", Some("test")),
    KeySpec::value("prefix", "test", None),
    KeySpec::value("cache-ttl", "10s", Some("test")),
    KeySpec::value("web.telemetry-path", "/test-metrics", Some("test")),
    KeySpec::value("domain-id", "0", None),
    KeySpec {
        name: "web.listen-address",
        kind: KeyKind::Bind,
        valid: ":9770",
        invalid: Some("test"),
    },
    KeySpec {
        name: "cloud",
        kind: KeyKind::Positional,
        valid: "test-cloud",
        invalid: None,
    },
    KeySpec {
        name: "disable-metrics",
        kind: KeyKind::MetricList,
        valid: "test-metrics1 test-metrics2 test-metrics3",
        invalid: None,
    },
];

/// Looks a key up by name.
pub fn find(name: &str) -> Option<&'static KeySpec> {
    KEYS.iter().find(|spec| spec.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_names_are_unique() {
        let names: HashSet<&str> = KEYS.iter().map(|spec| spec.name).collect();
        assert_eq!(names.len(), KEYS.len());
    }

    #[test]
    fn test_twenty_boolean_flags() {
        let flags = KEYS.iter().filter(|s| s.kind == KeyKind::Flag).count();
        assert_eq!(flags, 20);
    }

    #[test]
    fn test_find_known_and_unknown_keys() {
        assert_eq!(find("cache").map(|s| s.kind), Some(KeyKind::Flag));
        assert_eq!(find("web.listen-address").map(|s| s.kind), Some(KeyKind::Bind));
        assert!(find("bogus").is_none());
    }

    #[test]
    fn test_start_failing_keys() {
        let breaking: HashSet<&str> = KEYS
            .iter()
            .filter(|s| s.invalid.is_some())
            .map(|s| s.name)
            .collect();
        let expected: HashSet<&str> = [
            "log.format",
            "log.level",
            "os-client-config",
            "cache-ttl",
            "web.telemetry-path",
            "web.listen-address",
        ]
        .into_iter()
        .collect();
        assert_eq!(breaking, expected);
    }

    #[test]
    fn test_flag_fragment_is_bare() {
        let spec = find("multi-cloud").unwrap();
        assert_eq!(spec.fragments("true"), vec!["--multi-cloud"]);
    }

    #[test]
    fn test_value_fragment_uses_equals_form() {
        let spec = find("log.level").unwrap();
        assert_eq!(spec.fragments("info"), vec!["--log.level=info"]);
    }

    #[test]
    fn test_positional_fragment_is_the_value_itself() {
        let spec = find("cloud").unwrap();
        assert_eq!(spec.fragments("test-cloud"), vec!["test-cloud"]);
    }

    #[test]
    fn test_metric_list_fans_out_per_token() {
        let spec = find("disable-metrics").unwrap();
        assert_eq!(
            spec.fragments("test-metrics1 test-metrics2 test-metrics3"),
            vec![
                "--disable-metric=test-metrics1",
                "--disable-metric=test-metrics2",
                "--disable-metric=test-metrics3",
            ]
        );
    }

    #[test]
    fn test_bind_key_has_no_cmdline_fragments() {
        let spec = find("web.listen-address").unwrap();
        assert!(spec.fragments(":9770").is_empty());
    }
}
