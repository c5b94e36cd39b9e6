//! Printer and sensor stand-ins for replays and tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use flowguard_traits::{PrintControl, PulseSource};

/// Records pause/resume calls; clones share the counters.
#[derive(Debug, Clone, Default)]
pub struct RecordingControl {
    pauses: Arc<AtomicU32>,
    resumes: Arc<AtomicU32>,
}

impl RecordingControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> u32 {
        self.pauses.load(Ordering::Relaxed)
    }

    pub fn resumes(&self) -> u32 {
        self.resumes.load(Ordering::Relaxed)
    }
}

impl PrintControl for RecordingControl {
    fn pause(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.pauses.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.resumes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Fails the first `failures` commands with the given message, then succeeds.
#[derive(Debug, Clone)]
pub struct FailingControl {
    message: String,
    failures: u32,
    attempts: u32,
}

impl FailingControl {
    pub fn new(message: impl Into<String>, failures: u32) -> Self {
        Self {
            message: message.into(),
            failures,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn attempt(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.attempts += 1;
        if self.attempts <= self.failures {
            return Err(Box::new(std::io::Error::other(self.message.clone())));
        }
        Ok(())
    }
}

impl PrintControl for FailingControl {
    fn pause(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.attempt()
    }

    fn resume(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.attempt()
    }
}

/// Pulse input stuck at one level; the filament never moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct StuckLevel(pub bool);

impl PulseSource for StuckLevel {
    fn read_level(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.0)
    }
}
