use std::collections::HashMap;

const MANAGED_LABEL: &str = "com.github.saltbox.saltbox_managed";
const CONTROLLER_LABEL: &str = "com.github.saltbox.saltbox_controller";
const DEPENDS_ON_LABEL: &str = "com.github.saltbox.depends_on";
const DELAY_LABEL: &str = "com.github.saltbox.depends_on.delay";
const HEALTHCHECKS_LABEL: &str = "com.github.saltbox.depends_on.healthchecks";

/// Parsed Saltbox orchestration labels for one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLabels {
    pub managed: bool,
    pub depends_on: Vec<String>,
    pub depends_on_delay: u64,
    pub depends_on_healthchecks: bool,
    pub controller_enabled: bool,
}

impl Default for ContainerLabels {
    fn default() -> Self {
        Self {
            managed: false,
            depends_on: Vec::new(),
            depends_on_delay: 0,
            depends_on_healthchecks: false,
            // Opt-out mechanism: enabled unless explicitly disabled
            controller_enabled: true,
        }
    }
}

impl ContainerLabels {
    /// Extracts and parses Saltbox-specific labels from a container's label
    /// map. Unknown keys are ignored and malformed values fall back to their
    /// defaults; parsing never fails.
    pub fn parse(labels: &HashMap<String, String>) -> Self {
        let mut parsed = Self::default();

        if let Some(managed) = labels.get(MANAGED_LABEL) {
            parsed.managed = managed.eq_ignore_ascii_case("true");
        }

        if let Some(controller) = labels.get(CONTROLLER_LABEL) {
            parsed.controller_enabled = !controller.eq_ignore_ascii_case("false");
        }

        if let Some(depends_on) = labels.get(DEPENDS_ON_LABEL) {
            parsed.depends_on = depends_on
                .split(',')
                .map(str::trim)
                .filter(|dep| !dep.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(delay) = labels.get(DELAY_LABEL) {
            if let Ok(seconds) = delay.parse::<i64>() {
                if seconds > 0 {
                    parsed.depends_on_delay = seconds as u64;
                }
            }
        }

        if let Some(healthchecks) = labels.get(HEALTHCHECKS_LABEL) {
            parsed.depends_on_healthchecks = healthchecks.eq_ignore_ascii_case("true");
        }

        parsed
    }

    /// True if the container should be orchestrated by the controller.
    pub fn is_managed(&self) -> bool {
        self.managed && self.controller_enabled
    }

    #[allow(dead_code)]
    pub fn has_dependencies(&self) -> bool {
        !self.depends_on.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_labels_yield_defaults() {
        let parsed = ContainerLabels::parse(&HashMap::new());

        assert!(!parsed.managed);
        assert!(parsed.controller_enabled);
        assert!(parsed.depends_on.is_empty());
        assert_eq!(parsed.depends_on_delay, 0);
        assert!(!parsed.depends_on_healthchecks);
        assert!(!parsed.is_managed());
    }

    #[test]
    fn managed_is_case_insensitive() {
        for value in ["true", "True", "TRUE"] {
            let parsed = ContainerLabels::parse(&labels(&[(MANAGED_LABEL, value)]));
            assert!(parsed.managed, "value {value:?} should enable management");
        }

        for value in ["false", "yes", "1", ""] {
            let parsed = ContainerLabels::parse(&labels(&[(MANAGED_LABEL, value)]));
            assert!(!parsed.managed, "value {value:?} should not enable management");
        }
    }

    #[test]
    fn controller_label_is_opt_out() {
        // Present and "false" opts out, anything else opts in.
        let parsed = ContainerLabels::parse(&labels(&[
            (MANAGED_LABEL, "true"),
            (CONTROLLER_LABEL, "false"),
        ]));
        assert!(!parsed.controller_enabled);
        assert!(!parsed.is_managed());

        let parsed = ContainerLabels::parse(&labels(&[
            (MANAGED_LABEL, "true"),
            (CONTROLLER_LABEL, "FALSE"),
        ]));
        assert!(!parsed.is_managed());

        for value in ["true", "no", "0", ""] {
            let parsed = ContainerLabels::parse(&labels(&[
                (MANAGED_LABEL, "true"),
                (CONTROLLER_LABEL, value),
            ]));
            assert!(parsed.is_managed(), "value {value:?} should keep opt-in");
        }
    }

    #[test]
    fn dependencies_are_split_and_trimmed() {
        let parsed = ContainerLabels::parse(&labels(&[(
            DEPENDS_ON_LABEL,
            " traefik , authelia,redis ,, ",
        )]));

        assert_eq!(parsed.depends_on, vec!["traefik", "authelia", "redis"]);
        assert!(parsed.has_dependencies());
    }

    #[test]
    fn empty_dependency_list_stays_empty() {
        let parsed = ContainerLabels::parse(&labels(&[(DEPENDS_ON_LABEL, "")]));
        assert!(parsed.depends_on.is_empty());
        assert!(!parsed.has_dependencies());

        let parsed = ContainerLabels::parse(&labels(&[(DEPENDS_ON_LABEL, " , ,")]));
        assert!(parsed.depends_on.is_empty());
    }

    #[test]
    fn delay_accepts_positive_integers_only() {
        let parsed = ContainerLabels::parse(&labels(&[(DELAY_LABEL, "15")]));
        assert_eq!(parsed.depends_on_delay, 15);

        for value in ["-5", "0", "abc", "1.5", ""] {
            let parsed = ContainerLabels::parse(&labels(&[(DELAY_LABEL, value)]));
            assert_eq!(parsed.depends_on_delay, 0, "value {value:?} should yield 0");
        }
    }

    #[test]
    fn healthchecks_flag_parses() {
        let parsed = ContainerLabels::parse(&labels(&[(HEALTHCHECKS_LABEL, "true")]));
        assert!(parsed.depends_on_healthchecks);

        let parsed = ContainerLabels::parse(&labels(&[(HEALTHCHECKS_LABEL, "false")]));
        assert!(!parsed.depends_on_healthchecks);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let parsed = ContainerLabels::parse(&labels(&[
            (MANAGED_LABEL, "true"),
            ("com.github.saltbox.unknown", "whatever"),
            ("traefik.enable", "true"),
        ]));

        assert!(parsed.is_managed());
        assert!(parsed.depends_on.is_empty());
    }
}
