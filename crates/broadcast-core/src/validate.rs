//! Validator chain and message sanitizer. Structural validation (event
//! name shape, payload size) already happened in `broadcast_protocol::frame`;
//! this module adds the user-extensible validator chain and the recursive
//! HTML-entity sanitizer applied to outbound client-event payloads.

use serde_json::Value;
use std::sync::Arc;

/// A user-supplied validator run over a client event's channel/event/data
/// before it is relayed. Returning `Err` rejects the event with the given
/// reason; the orchestrator maps it to a `CoreError::Validation`.
pub trait Validator: Send + Sync {
    fn validate(&self, channel: &str, event: &str, data: &Value) -> Result<(), String>;
}

impl<F> Validator for F
where
    F: Fn(&str, &str, &Value) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, channel: &str, event: &str, data: &Value) -> Result<(), String> {
        self(channel, event, data)
    }
}

/// Runs each registered validator in order, short-circuiting on the first
/// rejection.
#[derive(Default)]
pub struct ValidatorChain {
    validators: Vec<Arc<dyn Validator>>,
}

impl ValidatorChain {
    pub fn new() -> Self {
        ValidatorChain {
            validators: Vec::new(),
        }
    }

    pub fn push(&mut self, validator: Arc<dyn Validator>) {
        self.validators.push(validator);
    }

    pub fn run(&self, channel: &str, event: &str, data: &Value) -> Result<(), String> {
        for validator in &self.validators {
            validator.validate(channel, event, data)?;
        }
        Ok(())
    }
}

/// Escapes `<`, `>`, `"`, `'`, and `/` in every string found in `value`,
/// recursing into arrays and objects. Idempotent: sanitizing already-escaped
/// input is a no-op because the escaped forms contain none of the raw
/// characters being escaped.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), sanitize(v))).collect())
        }
        other => other.clone(),
    }
}

fn sanitize_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            other => out.push(other),
        }
    }
    out
}
