//! Lifecycle event bus — typed hooks for channel/connection lifecycle
//! moments. Handlers run sequentially; a handler's failure is logged and
//! does not stop the remaining handlers from running.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::error;

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Created { channel: String },
    Subscribed { channel: String, socket_id: String },
    Unsubscribed { channel: String, socket_id: String },
    Empty { channel: String },
    Destroyed { channel: String },
}

#[async_trait]
pub trait LifecycleHook: Send + Sync {
    async fn handle(&self, event: &LifecycleEvent) -> Result<(), String>;
}

#[async_trait]
impl<F, Fut> LifecycleHook for F
where
    F: Fn(LifecycleEvent) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), String>> + Send,
{
    async fn handle(&self, event: &LifecycleEvent) -> Result<(), String> {
        self(event.clone()).await
    }
}

#[derive(Default)]
struct Hooks {
    created: Vec<Arc<dyn LifecycleHook>>,
    subscribed: Vec<Arc<dyn LifecycleHook>>,
    unsubscribed: Vec<Arc<dyn LifecycleHook>>,
    empty: Vec<Arc<dyn LifecycleHook>>,
    destroyed: Vec<Arc<dyn LifecycleHook>>,
    all: Vec<Arc<dyn LifecycleHook>>,
}

#[derive(Default)]
pub struct EventBus {
    hooks: RwLock<Hooks>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub async fn on_created(&self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.write().await.created.push(hook);
    }

    pub async fn on_subscribed(&self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.write().await.subscribed.push(hook);
    }

    pub async fn on_unsubscribed(&self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.write().await.unsubscribed.push(hook);
    }

    pub async fn on_empty(&self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.write().await.empty.push(hook);
    }

    pub async fn on_destroyed(&self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.write().await.destroyed.push(hook);
    }

    pub async fn on_all(&self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.write().await.all.push(hook);
    }

    pub async fn emit(&self, event: LifecycleEvent) {
        let hooks = self.hooks.read().await;
        let specific = match &event {
            LifecycleEvent::Created { .. } => &hooks.created,
            LifecycleEvent::Subscribed { .. } => &hooks.subscribed,
            LifecycleEvent::Unsubscribed { .. } => &hooks.unsubscribed,
            LifecycleEvent::Empty { .. } => &hooks.empty,
            LifecycleEvent::Destroyed { .. } => &hooks.destroyed,
        };
        for hook in specific.iter().chain(hooks.all.iter()) {
            if let Err(reason) = hook.handle(&event).await {
                error!(?event, reason, "lifecycle hook failed");
            }
        }
    }
}
