use crate::config::FailurePolicy;
use crate::error::{ClientError, ErrorHook, ErrorKind, FailureRecord};
use log::error;
use std::time::{Duration, Instant};

/// Deadline based heartbeat schedule of the blocking client. The async client uses a tokio
/// interval instead.
#[derive(Debug)]
pub struct HeartbeatTimer {
    interval: Duration,
    next: Instant,
}

impl HeartbeatTimer {
    /// `None` if heartbeats are disabled by a zero interval.
    pub fn new(seconds: u16, now: Instant) -> Option<Self> {
        match seconds {
            0 => None,
            s => {
                let interval = Duration::from_secs(s as u64);

                Some(Self {
                    interval,
                    next: now + interval,
                })
            }
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next
    }

    pub fn until_due(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    /// Schedule the next beat one interval after `now`.
    pub fn reset(&mut self, now: Instant) {
        self.next = now + self.interval;
    }
}

/// Report a failed heartbeat and apply the failure policy. With `Terminate` the process
/// exits after the error hook has seen the failure.
#[track_caller]
pub(crate) fn heartbeat_failed(policy: FailurePolicy, hook: &ErrorHook, err: &ClientError) {
    let err = err.clone().with_kind(ErrorKind::Heartbeat);

    hook(&FailureRecord::new(&err));

    if policy == FailurePolicy::Terminate {
        error!("Heartbeat failed, terminating: {}", err.message);

        std::process::exit(1);
    }
}
