//! Background pulse sampling.
//!
//! Spawns a thread that owns the `PulseSource`, polls its level at a fixed
//! rate, turns level toggles into pulse counts and hands them to the consumer
//! over a bounded channel. The time of the last edge is kept for stall
//! reporting.
//!
//! Each `PulseSampler` spawns exactly one thread, shut down and joined when
//! the sampler is dropped.
use crossbeam_channel as xch;
use flowguard_traits::PulseSource;
use flowguard_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

const CHANNEL_CAPACITY: usize = 64;

pub struct PulseSampler {
    rx: xch::Receiver<u32>,
    last_edge: Arc<AtomicU64>,
    read_errors: Arc<AtomicU64>,
    epoch: Instant,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl PulseSampler {
    pub fn spawn<P: PulseSource + Send + 'static, C: Clock + Send + Sync + 'static>(
        mut source: P,
        hz: u32,
        clock: C,
    ) -> Self {
        let (tx, rx) = xch::bounded(CHANNEL_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_edge = Arc::new(AtomicU64::new(0));
        let last_edge_clone = last_edge.clone();
        let read_errors = Arc::new(AtomicU64::new(0));
        let read_errors_clone = read_errors.clone();
        let period = Duration::from_micros(crate::util::period_us(hz));
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            let mut level: Option<bool> = None;
            // edges not yet accepted by the channel
            let mut pending: u32 = 0;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("pulse sampler received shutdown signal");
                    break;
                }

                match source.read_level() {
                    Ok(now_level) => {
                        if level.is_some_and(|prev| prev != now_level) {
                            pending = pending.saturating_add(1);
                            last_edge_clone.store(clock.ms_since(epoch), Ordering::Relaxed);
                        }
                        level = Some(now_level);
                    }
                    Err(e) => {
                        read_errors_clone.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(error = %e, "pulse read failed");
                    }
                }

                if pending > 0 {
                    match tx.try_send(pending) {
                        Ok(()) => pending = 0,
                        Err(xch::TrySendError::Full(_)) => {}
                        Err(xch::TrySendError::Disconnected(_)) => {
                            tracing::debug!("pulse consumer disconnected, exiting thread");
                            break;
                        }
                    }
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("pulse sampler thread exiting cleanly");
        });

        Self {
            rx,
            last_edge,
            read_errors,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Take every edge reported since the previous call.
    pub fn drain(&self) -> u32 {
        self.rx
            .try_iter()
            .fold(0u32, |acc, n| acc.saturating_add(n))
    }

    /// Batches waiting in the channel.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn read_errors(&self) -> u64 {
        self.read_errors.load(Ordering::Relaxed)
    }

    /// Milliseconds between the last edge and `now_ms` (sampler epoch).
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_edge.load(Ordering::Relaxed))
    }

    /// Stall measured against the real monotonic clock.
    pub fn stalled_for_now(&self) -> u64 {
        let dur = Instant::now().saturating_duration_since(self.epoch);
        let now_ms = u64::try_from(dur.as_millis()).unwrap_or(u64::MAX);
        self.stalled_for(now_ms)
    }
}

impl Drop for PulseSampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("pulse sampler joined"),
                Err(e) => tracing::warn!(?e, "pulse sampler thread panicked during shutdown"),
            }
        }
    }
}
