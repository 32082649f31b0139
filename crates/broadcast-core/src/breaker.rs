//! Circuit breaker — CLOSED/OPEN/HALF_OPEN state machine guarding a
//! single named dependency (a relay node, a webhook endpoint). A registry
//! on top keys breakers by name so each guarded dependency gets its own.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Breaker {
    state: State,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    half_open_successes: u32,
}

impl Breaker {
    fn new() -> Self {
        Breaker {
            state: State::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            half_open_successes: 0,
        }
    }
}

/// Whether the caller may attempt the guarded operation right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Go,
    Blocked,
}

pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Breaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        CircuitBreakerRegistry {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Checks whether `name`'s breaker allows an attempt, transitioning
    /// OPEN -> HALF_OPEN once the reset timeout has elapsed.
    pub async fn permit(&self, name: &str) -> Permit {
        let mut breakers = self.breakers.write().await;
        let breaker = breakers.entry(name.to_owned()).or_insert_with(Breaker::new);

        match breaker.state {
            State::Closed => Permit::Go,
            State::HalfOpen => Permit::Go,
            State::Open => {
                let opened_at = breaker.opened_at.expect("open breaker has opened_at");
                if opened_at.elapsed() >= self.config.reset_timeout {
                    breaker.state = State::HalfOpen;
                    breaker.half_open_successes = 0;
                    Permit::Go
                } else {
                    Permit::Blocked
                }
            }
        }
    }

    pub async fn record_success(&self, name: &str) {
        let mut breakers = self.breakers.write().await;
        let breaker = breakers.entry(name.to_owned()).or_insert_with(Breaker::new);
        match breaker.state {
            State::Closed => {
                breaker.failures.clear();
            }
            State::HalfOpen => {
                breaker.half_open_successes += 1;
                if breaker.half_open_successes >= self.config.success_threshold {
                    breaker.state = State::Closed;
                    breaker.failures.clear();
                    breaker.opened_at = None;
                }
            }
            State::Open => {}
        }
    }

    pub async fn record_failure(&self, name: &str) {
        let mut breakers = self.breakers.write().await;
        let breaker = breakers.entry(name.to_owned()).or_insert_with(Breaker::new);
        let now = Instant::now();

        match breaker.state {
            State::HalfOpen => {
                breaker.state = State::Open;
                breaker.opened_at = Some(now);
                breaker.failures.clear();
            }
            State::Closed => {
                breaker.failures.push_back(now);
                Self::trim_window(&mut breaker.failures, self.config.failure_window, now);
                if breaker.failures.len() as u32 >= self.config.failure_threshold {
                    breaker.state = State::Open;
                    breaker.opened_at = Some(now);
                    breaker.failures.clear();
                }
            }
            State::Open => {}
        }
    }

    fn trim_window(failures: &mut VecDeque<Instant>, window: Duration, now: Instant) {
        while let Some(front) = failures.front() {
            if now.duration_since(*front) > window {
                failures.pop_front();
            } else {
                break;
            }
        }
    }

    pub async fn state(&self, name: &str) -> State {
        self.breakers
            .read()
            .await
            .get(name)
            .map_or(State::Closed, |b| b.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32, reset_timeout: Duration, success_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            failure_window: Duration::from_secs(60),
            reset_timeout,
            success_threshold,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let registry = CircuitBreakerRegistry::new(config(3, Duration::from_secs(60), 1));
        for _ in 0..3 {
            registry.record_failure("relay-a").await;
        }
        assert_eq!(registry.state("relay-a").await, State::Open);
        assert_eq!(registry.permit("relay-a").await, Permit::Blocked);
    }

    #[tokio::test]
    async fn transitions_to_half_open_after_reset_timeout() {
        let registry = CircuitBreakerRegistry::new(config(1, Duration::from_millis(5), 1));
        registry.record_failure("relay-a").await;
        assert_eq!(registry.permit("relay-a").await, Permit::Blocked);
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(registry.permit("relay-a").await, Permit::Go);
        assert_eq!(registry.state("relay-a").await, State::HalfOpen);
    }

    #[tokio::test]
    async fn closes_after_success_threshold_in_half_open() {
        let registry = CircuitBreakerRegistry::new(config(1, Duration::from_millis(5), 2));
        registry.record_failure("relay-a").await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        registry.permit("relay-a").await;
        registry.record_success("relay-a").await;
        assert_eq!(registry.state("relay-a").await, State::HalfOpen);
        registry.record_success("relay-a").await;
        assert_eq!(registry.state("relay-a").await, State::Closed);
    }

    #[tokio::test]
    async fn failure_in_half_open_reopens_immediately() {
        let registry = CircuitBreakerRegistry::new(config(1, Duration::from_millis(5), 2));
        registry.record_failure("relay-a").await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        registry.permit("relay-a").await;
        registry.record_failure("relay-a").await;
        assert_eq!(registry.state("relay-a").await, State::Open);
    }

    #[tokio::test]
    async fn unknown_name_starts_closed() {
        let registry = CircuitBreakerRegistry::new(config(5, Duration::from_secs(30), 2));
        assert_eq!(registry.state("unseen").await, State::Closed);
        assert_eq!(registry.permit("unseen").await, Permit::Go);
    }
}
