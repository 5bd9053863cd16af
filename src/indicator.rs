//! Indicator auto-clear sweeper.
//!
//! A background thread that watches only the indicator register.  Once a
//! lit value has been held for the configured hold time it writes the
//! register back to zero, so the accept/reject light behaves like a pulse.
//! It never touches any other register and never takes the run mutex.
//!
//! Writers that go through [`IndicatorSweeper::tracked_bus`] bump a write
//! generation under the same lock the sweeper holds while clearing.  A
//! rewrite of the same value therefore restarts the hold, and a clear can
//! never wipe a value written through that bus after it was observed.
//! Writers that bypass it are only caught by the re-read before clearing,
//! which leaves a window of one bus transaction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::app::ports::RegisterBus;
use crate::config::LineConfig;
use crate::error::BusError;
use crate::signals::{CLEARED, Signal};

/// Write generation of the indicator register.
#[derive(Debug, Default)]
struct Generation(Mutex<u64>);

impl Generation {
    fn lock(&self) -> MutexGuard<'_, u64> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> u64 {
        *self.lock()
    }
}

/// Bus handle that records every indicator write.
struct TrackedBus {
    inner: Arc<dyn RegisterBus>,
    address: u32,
    generation: Arc<Generation>,
}

impl RegisterBus for TrackedBus {
    fn get(&self, address: u32) -> Result<u16, BusError> {
        self.inner.get(address)
    }

    fn set(&self, address: u32, value: u16) -> Result<(), BusError> {
        if address != self.address {
            return self.inner.set(address, value);
        }
        let mut generation = self.generation.lock();
        self.inner.set(address, value)?;
        *generation += 1;
        Ok(())
    }
}

pub struct IndicatorSweeper {
    bus: Arc<dyn RegisterBus>,
    address: u32,
    generation: Arc<Generation>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IndicatorSweeper {
    /// Spawn the sweeper thread.
    pub fn spawn(
        bus: Arc<dyn RegisterBus>,
        address: u32,
        hold: Duration,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let generation = Arc::new(Generation::default());
        let watch = Watch {
            bus: Arc::clone(&bus),
            address,
            generation: Arc::clone(&generation),
        };
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("indicator-sweeper".into())
            .spawn(move || watch.sweep(hold, interval, &flag))?;
        info!(
            "IndicatorSweeper: watching {} (hold {:?}, every {:?})",
            address, hold, interval
        );
        Ok(Self {
            bus,
            address,
            generation,
            stop,
            handle: Some(handle),
        })
    }

    /// The watched bus, wrapped so indicator writes restart the hold.
    /// Hand this to whatever drives the indicator.
    pub fn tracked_bus(&self) -> Arc<dyn RegisterBus> {
        Arc::new(TrackedBus {
            inner: Arc::clone(&self.bus),
            address: self.address,
            generation: Arc::clone(&self.generation),
        })
    }

    pub fn from_config(bus: Arc<dyn RegisterBus>, config: &LineConfig) -> std::io::Result<Self> {
        Self::spawn(
            bus,
            config.signals.address(Signal::Indicator),
            Duration::from_millis(u64::from(config.indicator_hold_ms)),
            Duration::from_millis(u64::from(config.indicator_sweep_interval_ms)),
        )
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("IndicatorSweeper: thread panicked");
            }
        }
    }
}

impl Drop for IndicatorSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Watch {
    bus: Arc<dyn RegisterBus>,
    address: u32,
    generation: Arc<Generation>,
}

/// What the sweeper last saw lit.
struct Lit {
    value: u16,
    generation: u64,
    since: Instant,
}

impl Watch {
    fn sweep(&self, hold: Duration, interval: Duration, stop: &AtomicBool) {
        let mut lit: Option<Lit> = None;

        while !stop.load(Ordering::Acquire) {
            let generation = self.generation.current();
            match self.bus.get(self.address) {
                Ok(CLEARED) => lit = None,
                Ok(value) => match &lit {
                    Some(seen) if seen.value == value && seen.generation == generation => {
                        if seen.since.elapsed() >= hold && self.clear(seen) {
                            lit = None;
                        }
                    }
                    _ => {
                        lit = Some(Lit {
                            value,
                            generation,
                            since: Instant::now(),
                        })
                    }
                },
                Err(e) => debug!("IndicatorSweeper: read failed: {}", e),
            }
            thread::sleep(interval);
        }
    }

    /// Clear the register if it still holds what was seen.  Returns false
    /// when the value was rewritten or the clear failed.
    fn clear(&self, seen: &Lit) -> bool {
        let generation = self.generation.lock();
        if *generation != seen.generation {
            return false;
        }
        match self.bus.get(self.address) {
            Ok(value) if value == seen.value => {}
            Ok(_) => return false,
            Err(e) => {
                debug!("IndicatorSweeper: read failed: {}", e);
                return false;
            }
        }
        match self.bus.set(self.address, CLEARED) {
            Ok(()) => {
                debug!("IndicatorSweeper: cleared {} after {:?}", seen.value, seen.since.elapsed());
                true
            }
            Err(e) => {
                debug!("IndicatorSweeper: clear failed: {}", e);
                false
            }
        }
    }
}
