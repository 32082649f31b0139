//! Authorizer — runs the registered callback for a (socket, channel)
//! pair and yields allow/deny or a presence-member value.

use crate::error::CoreError;
use crate::pattern::CompiledPattern;
use async_trait::async_trait;
use broadcast_protocol::PresenceMember;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result of running a rule's callback (redesign note: replace the source's
/// `bool | object` union with a proper result type).
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Deny,
    Allow,
    AllowAsPresence(PresenceMember),
}

/// A registered authorization callback. Implementations may suspend (e.g. to
/// call out to an identity service), so this is async.
#[async_trait]
pub trait AuthRule: Send + Sync {
    async fn authorize(
        &self,
        socket_id: &str,
        params: &HashMap<String, String>,
        auth_token: Option<&str>,
    ) -> Result<AuthOutcome, String>;
}

#[async_trait]
impl<F, Fut> AuthRule for F
where
    F: Fn(String, HashMap<String, String>, Option<String>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<AuthOutcome, String>> + Send,
{
    async fn authorize(
        &self,
        socket_id: &str,
        params: &HashMap<String, String>,
        auth_token: Option<&str>,
    ) -> Result<AuthOutcome, String> {
        self(
            socket_id.to_owned(),
            params.clone(),
            auth_token.map(str::to_owned),
        )
        .await
    }
}

struct Registration {
    pattern: CompiledPattern,
    rule: Arc<dyn AuthRule>,
}

/// Holds `(pattern, callback)` registrations and evaluates them in
/// first-match-wins, insertion order.
#[derive(Default)]
pub struct Authorizer {
    registrations: RwLock<Vec<Registration>>,
}

impl Authorizer {
    pub fn new() -> Self {
        Authorizer {
            registrations: RwLock::new(Vec::new()),
        }
    }

    /// Registers a rule. Idempotent: re-registering the same template
    /// replaces the existing rule in place rather than appending a duplicate,
    /// preserving its original position in the match order.
    pub async fn register(&self, template: &str, rule: Arc<dyn AuthRule>) -> Result<(), String> {
        let pattern =
            CompiledPattern::compile(template).map_err(|e| format!("invalid pattern: {e}"))?;
        let mut registrations = self.registrations.write().await;
        if let Some(existing) = registrations
            .iter_mut()
            .find(|r| r.pattern.template() == template)
        {
            existing.rule = rule;
        } else {
            registrations.push(Registration { pattern, rule });
        }
        Ok(())
    }

    /// Runs the first matching rule's callback. A public channel needs no
    /// rule and is never passed here by the orchestrator. `auth_token` is
    /// the client-supplied `data.auth` string, handed to the callback
    /// unexamined -- validating it (e.g. an HMAC signature check) is the
    /// callback's job, not the registry's.
    pub async fn authorize(
        &self,
        socket_id: &str,
        channel: &str,
        auth_token: Option<&str>,
    ) -> Result<AuthOutcome, CoreError> {
        let registrations = self.registrations.read().await;
        for reg in registrations.iter() {
            if let Some(params) = reg.pattern.matches(channel) {
                return match reg.rule.authorize(socket_id, &params, auth_token).await {
                    Ok(outcome) => Ok(outcome),
                    Err(reason) => Err(CoreError::Server(reason)),
                };
            }
        }
        Err(CoreError::Auth(format!(
            "no authorization rule registered for channel `{channel}`"
        )))
    }
}
