// Distance sensor access for obstacle avoidance
//
// The ultrasonic ranger is owned by another process that publishes readings.
// The runtime keeps the latest one; a missing or stale reading is reported
// as the "nothing in range" sentinel, same as the ranger's own echo timeout.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{DISTANCE_SENTINEL, DISTANCE_TIMEOUT};

pub trait DistanceSensor {
    /// Current distance estimate. Never fails: timeouts yield the sentinel.
    fn read(&mut self) -> u16;
}

/// Reading published on the distance topic
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DistanceReading {
    pub distance: u16,
}

/// Latest published reading with a staleness timeout
pub struct LatestDistance {
    latest: Option<(u16, Instant)>,
    timeout: Duration,
    stale: bool,
}

impl LatestDistance {
    pub fn new() -> Self {
        Self::with_timeout(DISTANCE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            latest: None,
            timeout,
            stale: false,
        }
    }

    pub fn on_reading(&mut self, reading: DistanceReading) {
        // The ranger reports 0 when no echo came back
        let distance = if reading.distance == 0 {
            DISTANCE_SENTINEL
        } else {
            reading.distance
        };
        self.latest = Some((distance, Instant::now()));
    }
}

impl Default for LatestDistance {
    fn default() -> Self {
        Self::new()
    }
}

impl DistanceSensor for LatestDistance {
    fn read(&mut self) -> u16 {
        match self.latest {
            Some((distance, at)) if at.elapsed() <= self.timeout => {
                self.stale = false;
                distance
            }
            Some((_, at)) => {
                if !self.stale {
                    warn!("Distance reading stale ({:?} old), assuming clear path", at.elapsed());
                }
                self.stale = true;
                DISTANCE_SENTINEL
            }
            None => DISTANCE_SENTINEL,
        }
    }
}

/// Plays back a fixed sequence of readings, then the sentinel
#[derive(Debug, Clone, Default)]
pub struct ScriptedDistance {
    readings: VecDeque<u16>,
    reads: usize,
}

impl ScriptedDistance {
    pub fn new(readings: impl IntoIterator<Item = u16>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            reads: 0,
        }
    }

    /// Clear path forever
    pub fn clear() -> Self {
        Self::default()
    }

    /// How many times the sensor was polled
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl DistanceSensor for ScriptedDistance {
    fn read(&mut self) -> u16 {
        self.reads += 1;
        let distance = self.readings.pop_front().unwrap_or(DISTANCE_SENTINEL);
        debug!("Scripted distance: {}", distance);
        distance
    }
}
