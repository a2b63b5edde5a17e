// Engine: wires the policy store, detectors, and coordinator together.
//
// The engine owns the window stores and hands the same Arc to the detector
// that fills a store and the coordinator that clears it. Two engines never
// share state. Messages go through the rate detector first and only reach
// the content scanner when no rate limit tripped; at most one verdict is
// enforced per event.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::Database;
use crate::detect::{
    ActionWindow, ContentScanner, MessageRateDetector, MessageWindow, PrivilegedActionDetector,
    WindowStore,
};
use crate::enforce::{EnforcementContext, EnforcementCoordinator, EnforcementResult, PlatformActions};
use crate::events::{Event, MessageEvent, PrivilegedActionEvent};
use crate::policy::PolicyStore;
use crate::verdict::Verdict;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub self_id: Option<String>,
    pub action_timeout: StdDuration,
    pub sweep_interval: StdDuration,
    pub max_idle: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            self_id: config.self_id.clone(),
            action_timeout: config.action_timeout,
            sweep_interval: config.sweep_interval,
            max_idle: Duration::from_std(config.max_idle).unwrap_or_else(|_| Duration::minutes(10)),
        }
    }
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub verdict: Verdict,
    pub enforcement: Option<EnforcementResult>,
}

pub struct Engine {
    policies: Arc<PolicyStore>,
    scanner: ContentScanner,
    rate: MessageRateDetector,
    privileged: PrivilegedActionDetector,
    coordinator: EnforcementCoordinator,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        db: Arc<dyn Database>,
        platform: Arc<dyn PlatformActions>,
        settings: EngineSettings,
    ) -> Self {
        let message_windows: Arc<WindowStore<MessageWindow>> = Arc::new(WindowStore::new());
        let nuke_windows: Arc<WindowStore<ActionWindow>> = Arc::new(WindowStore::new());

        let coordinator =
            EnforcementCoordinator::new(platform, nuke_windows.clone(), settings.action_timeout)
                .with_audit(db.clone());

        Self {
            policies: Arc::new(PolicyStore::new(db)),
            scanner: ContentScanner::new(),
            rate: MessageRateDetector::new(message_windows),
            privileged: PrivilegedActionDetector::new(nuke_windows, settings.self_id.clone()),
            coordinator,
            settings,
        }
    }

    pub fn policies(&self) -> &Arc<PolicyStore> {
        &self.policies
    }

    pub fn rate_detector(&self) -> &MessageRateDetector {
        &self.rate
    }

    pub fn privileged_detector(&self) -> &PrivilegedActionDetector {
        &self.privileged
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn scan_content(&self, event: &MessageEvent) -> Verdict {
        let policy = self.policies.get(&event.tenant_id).await;
        self.scanner.scan(&policy, event)
    }

    pub async fn observe_message_rate(&self, event: &MessageEvent, now: DateTime<Utc>) -> Verdict {
        let policy = self.policies.get(&event.tenant_id).await;
        self.rate.observe(&policy, event, now)
    }

    pub async fn observe_privileged_action(
        &self,
        event: &PrivilegedActionEvent,
        now: DateTime<Utc>,
    ) -> Verdict {
        let policy = self.policies.get(&event.tenant_id).await;
        self.privileged.observe(&policy, event, now)
    }

    /// Act on a verdict. `Clean` does nothing and returns `None`.
    pub async fn enforce(
        &self,
        verdict: &Verdict,
        ctx: &EnforcementContext,
    ) -> Option<EnforcementResult> {
        let violation = verdict.violation()?;
        let policy = self.policies.get(&ctx.tenant_id).await;
        Some(self.coordinator.enforce(&policy, violation, ctx).await)
    }

    /// Validate, detect, and enforce a single event.
    pub async fn handle(&self, event: &Event, now: DateTime<Utc>) -> Result<Outcome> {
        event.validate().context("Rejected event")?;
        let policy = self.policies.get(event.tenant_id()).await;

        let (verdict, ctx) = match event {
            Event::Message(message) => {
                let rate = self.rate.observe(&policy, message, now);
                let verdict = if rate.is_violation() {
                    rate
                } else {
                    self.scanner.scan(&policy, message)
                };
                (verdict, EnforcementContext::from_message(message))
            }
            Event::PrivilegedAction(action) => (
                self.privileged.observe(&policy, action, now),
                EnforcementContext::from_action(action),
            ),
        };

        let enforcement = match verdict.violation() {
            Some(violation) => Some(self.coordinator.enforce(&policy, violation, &ctx).await),
            None => None,
        };

        Ok(Outcome {
            verdict,
            enforcement,
        })
    }

    /// Number of live (message, privileged-action) windows.
    pub fn tracked_windows(&self) -> (usize, usize) {
        (self.rate.windows().len(), self.privileged.windows().len())
    }

    /// Drop windows idle for longer than the configured `max_idle`.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        evict(
            self.rate.windows(),
            self.privileged.windows(),
            now,
            self.settings.max_idle,
        )
    }

    /// Run idle eviction every `sweep_interval` until the task is aborted.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let messages = self.rate.windows().clone();
        let actions = self.privileged.windows().clone();
        let max_idle = self.settings.max_idle;
        let period = self.settings.sweep_interval.max(StdDuration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = evict(&messages, &actions, Utc::now(), max_idle);
                if evicted > 0 {
                    info!(evicted, "Evicted idle windows");
                } else {
                    debug!("Idle sweep found nothing to evict");
                }
            }
        })
    }
}

fn evict(
    messages: &WindowStore<MessageWindow>,
    actions: &WindowStore<ActionWindow>,
    now: DateTime<Utc>,
    max_idle: Duration,
) -> usize {
    messages.evict_idle(now, max_idle) + actions.evict_idle(now, max_idle)
}
