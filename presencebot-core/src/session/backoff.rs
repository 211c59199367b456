// File: presencebot-core/src/session/backoff.rs

use std::time::Duration;

use tokio::time::Instant;

/// Every delay and threshold the session state machine uses.
#[derive(Debug, Clone)]
pub struct SessionTimings {
    /// Floor for the configured publish interval.
    pub min_publish_interval: Duration,
    /// Floor for the wait before a reconnect attempt.
    pub min_reconnect_delay: Duration,
    /// Next tick after an error escaped a publish cycle.
    pub error_retry: Duration,
    /// Longest a single publish cycle may run.
    pub cycle_timeout: Duration,
    pub cooldown: Duration,
    pub max_restarts: u32,
    pub latency_threshold: Duration,
    pub handshake_timeout: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            min_publish_interval: Duration::from_secs(5),
            min_reconnect_delay: Duration::from_secs(10),
            error_retry: Duration::from_secs(30),
            cycle_timeout: Duration::from_secs(30),
            cooldown: Duration::from_secs(15 * 60),
            max_restarts: 5,
            latency_threshold: Duration::from_millis(5_000),
            handshake_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Try a fresh connection after the delay.
    Reconnect(Duration),
    /// Too many consecutive failures; stay quiet for the delay.
    CoolDown(Duration),
}

/// Consecutive-failure bookkeeping for one session.
#[derive(Debug, Clone, Default)]
pub struct Backoff {
    restart_count: u32,
    last_restart: Option<Instant>,
    cooldown_until: Option<Instant>,
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    pub fn last_restart(&self) -> Option<Instant> {
        self.last_restart
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Records one degraded detection and says what to do about it.
    pub fn on_degraded(&mut self, now: Instant, interval: Duration, t: &SessionTimings) -> Decision {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return Decision::CoolDown(until - now);
            }
            self.end_cooldown();
        }

        if self.restart_count >= t.max_restarts {
            self.cooldown_until = Some(now + t.cooldown);
            return Decision::CoolDown(t.cooldown);
        }

        self.restart_count += 1;
        self.last_restart = Some(now);
        Decision::Reconnect(interval.max(t.min_reconnect_delay))
    }

    /// A healthy tick. Returns true if this cleared earlier failures.
    pub fn on_healthy(&mut self) -> bool {
        if self.restart_count == 0 {
            return false;
        }
        self.restart_count = 0;
        true
    }

    pub fn end_cooldown(&mut self) {
        self.restart_count = 0;
        self.cooldown_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cooldown_follows_the_last_allowed_reconnect() {
        let t = SessionTimings::default();
        let mut b = Backoff::new();
        let interval = Duration::from_secs(3);

        for n in 1..=t.max_restarts {
            let now = Instant::now();
            assert_eq!(
                b.on_degraded(now, interval, &t),
                Decision::Reconnect(t.min_reconnect_delay)
            );
            assert_eq!(b.restart_count(), n);
        }
        assert_eq!(b.on_degraded(Instant::now(), interval, &t), Decision::CoolDown(t.cooldown));
        assert_eq!(b.restart_count(), t.max_restarts);
        assert!(b.in_cooldown(Instant::now()));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(
            b.on_degraded(Instant::now(), interval, &t),
            Decision::CoolDown(t.cooldown - Duration::from_secs(60))
        );

        tokio::time::advance(t.cooldown).await;
        assert!(!b.in_cooldown(Instant::now()));
        assert_eq!(
            b.on_degraded(Instant::now(), interval, &t),
            Decision::Reconnect(t.min_reconnect_delay)
        );
        assert_eq!(b.restart_count(), 1);
    }

    #[test]
    fn healthy_tick_resets_the_count() {
        let t = SessionTimings::default();
        let mut b = Backoff::new();
        assert!(!b.on_healthy());
        b.on_degraded(Instant::now(), Duration::from_secs(30), &t);
        assert_eq!(
            b.on_degraded(Instant::now(), Duration::from_secs(30), &t),
            Decision::Reconnect(Duration::from_secs(30))
        );
        assert!(b.on_healthy());
        assert_eq!(b.restart_count(), 0);
    }
}
