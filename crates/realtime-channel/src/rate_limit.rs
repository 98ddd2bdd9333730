//! Per-connection sliding-window rate limiter (§4.7). A breach refuses the
//! message; sustained breaches are counted by the caller and may escalate
//! to disconnection.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub struct SlidingWindowLimiter {
    window: Duration,
    ceiling: u32,
    hits: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, ceiling: u32) -> Self {
        Self { window, ceiling, hits: Mutex::new(VecDeque::new()) }
    }

    /// Records a hit and returns `true` if it was within the ceiling,
    /// `false` if it breached the window limit.
    pub fn check(&self) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock();
        while let Some(&front) = hits.front() {
            if now.duration_since(front) > self.window {
                hits.pop_front();
            } else {
                break;
            }
        }
        if hits.len() as u32 >= self.ceiling {
            return false;
        }
        hits.push_back(now);
        true
    }
}
