//! The game clock: three independent periodic sources.
//!
//! | channel   | period | subscribers                                  |
//! |-----------|-------:|----------------------------------------------|
//! | heartbeat | 100 ms | fast-decay effects (reserved)                 |
//! | pulse     |    1 s | combat rounds, wandering, low-health nag      |
//! | tick      |   60 s | regeneration, auto-save, world resets         |
//!
//! Every callback fires in its own spawned task, with a watcher that joins
//! it and logs a panic. One failing callback neither stops its source nor
//! touches its siblings. Registration is safe while dispatch is running,
//! and no ordering is guaranteed among callbacks of one fire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::watch;

pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(100);
pub const PULSE_PERIOD: Duration = Duration::from_secs(1);
pub const TICK_PERIOD: Duration = Duration::from_secs(60);

/// Ticks between auto-saves (5 minutes).
pub const AUTOSAVE_TICKS: u32 = 5;
/// Ticks between world resets (15 minutes).
pub const RESET_TICKS: u32 = 15;

pub type Callback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

type Registry = Arc<RwLock<Vec<(&'static str, Callback)>>>;

pub struct Clock {
    heartbeat: Registry,
    pulse: Registry,
    tick: Registry,
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            heartbeat: Arc::new(RwLock::new(Vec::new())),
            pulse: Arc::new(RwLock::new(Vec::new())),
            tick: Arc::new(RwLock::new(Vec::new())),
            running: AtomicBool::new(false),
            stop_tx,
        }
    }

    pub fn register_heartbeat(&self, name: &'static str, cb: Callback) {
        self.heartbeat.write().expect("clock registry").push((name, cb));
    }

    pub fn register_pulse(&self, name: &'static str, cb: Callback) {
        self.pulse.write().expect("clock registry").push((name, cb));
    }

    pub fn register_tick(&self, name: &'static str, cb: Callback) {
        self.tick.write().expect("clock registry").push((name, cb));
    }

    /// Start the three dispatcher tasks. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        spawn_source("heartbeat", HEARTBEAT_PERIOD, Arc::clone(&self.heartbeat), self.stop_tx.subscribe());
        spawn_source("pulse", PULSE_PERIOD, Arc::clone(&self.pulse), self.stop_tx.subscribe());
        spawn_source("tick", TICK_PERIOD, Arc::clone(&self.tick), self.stop_tx.subscribe());
        tracing::info!("clock started");
    }

    /// Stop all sources. Idempotent; no dispatch happens afterwards
    /// (callbacks already in flight run to completion).
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.stop_tx.send(true);
        tracing::info!("clock stopped");
    }
}

fn spawn_source(
    source: &'static str,
    period: Duration,
    registry: Registry,
    mut stop_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; swallow it so the
        // first dispatch happens one full period after start.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    dispatch(source, &registry);
                }
                res = stop_rx.changed() => {
                    if res.is_err() || *stop_rx.borrow() {
                        return;
                    }
                }
            }
        }
    });
}

/// Fire every registered callback concurrently, each isolated in its own
/// task and joined by a watcher that logs panics.
fn dispatch(source: &'static str, registry: &Registry) {
    let callbacks: Vec<(&'static str, Callback)> =
        registry.read().expect("clock registry").clone();

    for (name, cb) in callbacks {
        let fut = cb();
        let handle = tokio::spawn(fut);
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    tracing::error!(source, callback = name, "clock callback panicked");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting_callback(counter: Arc<AtomicU32>) -> Callback {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn callbacks_fire_on_their_period() {
        let clock = Clock::new();
        let count = Arc::new(AtomicU32::new(0));
        clock.register_heartbeat("count", counting_callback(Arc::clone(&count)));
        clock.start();

        tokio::time::sleep(Duration::from_millis(350)).await;
        tokio::task::yield_now().await;
        let fired = count.load(Ordering::SeqCst);
        assert!((2..=4).contains(&fired), "fired {fired} times");
    }

    #[tokio::test(start_paused = true)]
    async fn a_panicking_callback_does_not_poison_siblings() {
        let clock = Clock::new();
        let count = Arc::new(AtomicU32::new(0));
        clock.register_pulse(
            "bomb",
            Arc::new(|| {
                Box::pin(async {
                    panic!("boom");
                })
            }),
        );
        clock.register_pulse("count", counting_callback(Arc::clone(&count)));
        clock.start();

        tokio::time::sleep(Duration::from_millis(2100)).await;
        tokio::task::yield_now().await;
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_dispatch() {
        let clock = Clock::new();
        let count = Arc::new(AtomicU32::new(0));
        clock.register_heartbeat("count", counting_callback(Arc::clone(&count)));
        clock.start();

        tokio::time::sleep(Duration::from_millis(250)).await;
        tokio::task::yield_now().await;
        clock.stop();
        let at_stop = count.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(500)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), at_stop);

        // Stopping twice is fine.
        clock.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn registration_during_dispatch_is_safe() {
        let clock = Clock::new();
        let count = Arc::new(AtomicU32::new(0));
        clock.start();
        clock.start(); // idempotent

        tokio::time::sleep(Duration::from_millis(150)).await;
        clock.register_heartbeat("late", counting_callback(Arc::clone(&count)));
        tokio::time::sleep(Duration::from_millis(250)).await;
        tokio::task::yield_now().await;
        assert!(count.load(Ordering::SeqCst) >= 1);
    }
}
