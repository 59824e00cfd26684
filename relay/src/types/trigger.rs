use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Locator of a managed pub/sub channel.
///
/// A channel is identified by the cloud project that owns it and the name of
/// the subscription within that project. The pair is opaque to the controller
/// and only interpreted by the message source implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    pub project: String,
    pub subscription: String,
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.subscription)
    }
}

/// Spec of the `PubSubTrigger` custom resource.
///
/// A trigger declares that messages arriving on one pub/sub subscription
/// should be relayed to every in-cluster service whose labels match the
/// trigger's selector. The resource is namespaced and identified by its
/// metadata name; at most one worker runs per trigger name at any time.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "relay.dev",
    version = "v1alpha1",
    kind = "PubSubTrigger",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PubSubTriggerSpec {
    /// Cloud project that owns the subscription.
    pub project: String,
    /// Subscription from which messages are pulled.
    pub subscription: String,
    /// Selector for the services that receive relayed messages.
    pub function_selector: FunctionSelector,
}

/// Label selector for the services a trigger fans out to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSelector {
    /// Labels a service must carry to match; all entries must match.
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl PubSubTriggerSpec {
    /// Returns the channel this trigger consumes from.
    pub fn channel_ref(&self) -> ChannelRef {
        ChannelRef {
            project: self.project.clone(),
            subscription: self.subscription.clone(),
        }
    }

    /// Returns the label selector in `key=value,key=value` form.
    ///
    /// Keys are emitted in sorted order, so equal label sets always produce
    /// the same string. An empty selector matches every service.
    pub fn selector(&self) -> String {
        self.function_selector
            .match_labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}
