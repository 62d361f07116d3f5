//! Secret masking for recorded props and persisted snapshots.
//!
//! Props declared secret are replaced by [`REDACTED`] when the node is
//! recorded. Their string values are also registered with the execution's
//! [`SecretRedactor`], which scrubs them from every snapshot sent to a sink
//! (a component may echo a secret into its output or error message).

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use gensx_types::node::ExecutionNode;
use serde_json::{Map, Value};

/// Replacement text for masked values.
pub const REDACTED: &str = "[secret]";

/// Shorter strings are masked at their prop location only; scrubbing them
/// everywhere would mangle unrelated text.
const MIN_SCRUB_LEN: usize = 4;

/// Mask the top-level `secret_keys` of `props`.
///
/// Returns the masked copy and every string leaf found under the masked
/// keys. Non-object props are returned unchanged.
pub fn mask_props(props: &Value, secret_keys: &[String]) -> (Value, Vec<String>) {
    let mut secrets = Vec::new();
    if secret_keys.is_empty() {
        return (props.clone(), secrets);
    }
    let Value::Object(map) = props else {
        return (props.clone(), secrets);
    };

    let mut masked = Map::with_capacity(map.len());
    for (key, value) in map {
        if secret_keys.iter().any(|k| k == key) {
            collect_strings(value, &mut secrets);
            masked.insert(key.clone(), Value::String(REDACTED.to_string()));
        } else {
            masked.insert(key.clone(), value.clone());
        }
    }
    (Value::Object(masked), secrets)
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        Value::Number(_) | Value::Bool(_) | Value::Null => {}
    }
}

/// Registry of secret strings scrubbed from outgoing snapshots.
#[derive(Debug, Default)]
pub struct SecretRedactor {
    secrets: Mutex<BTreeSet<String>>,
}

impl SecretRedactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<I>(&self, secrets: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut guard = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        guard.extend(secrets.into_iter().filter(|s| s.len() >= MIN_SCRUB_LEN));
    }

    pub fn is_empty(&self) -> bool {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Scrub every registered secret from the whole subtree in place.
    pub fn redact_tree(&self, node: &mut ExecutionNode) {
        let secrets = {
            let guard = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_empty() {
                return;
            }
            let mut secrets: Vec<String> = guard.iter().cloned().collect();
            // Longest first, so a secret containing another is replaced whole.
            secrets.sort_by(|a, b| b.len().cmp(&a.len()));
            secrets
        };
        redact_node(node, &secrets);
    }
}

fn redact_node(node: &mut ExecutionNode, secrets: &[String]) {
    redact_value(&mut node.props, secrets);
    if let Some(output) = node.output.as_mut() {
        redact_value(output, secrets);
    }
    if let Some(error) = node.error.as_mut() {
        redact_str(error, secrets);
    }
    for value in node.metadata.values_mut() {
        redact_value(value, secrets);
    }
    for child in &mut node.children {
        redact_node(child, secrets);
    }
}

fn redact_value(value: &mut Value, secrets: &[String]) {
    match value {
        Value::String(s) => redact_str(s, secrets),
        Value::Array(items) => items.iter_mut().for_each(|v| redact_value(v, secrets)),
        Value::Object(map) => map.values_mut().for_each(|v| redact_value(v, secrets)),
        Value::Number(_) | Value::Bool(_) | Value::Null => {}
    }
}

fn redact_str(text: &mut String, secrets: &[String]) {
    for secret in secrets {
        if text.contains(secret.as_str()) {
            *text = text.replace(secret.as_str(), REDACTED);
        }
    }
}
