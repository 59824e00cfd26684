use std::collections::BTreeMap;

use crate::types::{FunctionSelector, PubSubTrigger, PubSubTriggerSpec};

/// Builds a trigger spec for the given channel and selector labels.
pub fn test_trigger_spec(
    project: &str,
    subscription: &str,
    labels: &[(&str, &str)],
) -> PubSubTriggerSpec {
    let match_labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    PubSubTriggerSpec {
        project: project.to_string(),
        subscription: subscription.to_string(),
        function_selector: FunctionSelector { match_labels },
    }
}

/// Builds a named trigger resource for the given channel and selector labels.
pub fn test_trigger(
    name: &str,
    project: &str,
    subscription: &str,
    labels: &[(&str, &str)],
) -> PubSubTrigger {
    PubSubTrigger::new(name, test_trigger_spec(project, subscription, labels))
}
