//! In-process holding-register bank.
//!
//! Implements [`RegisterBus`] over a mutex-guarded map.  Every `get` / `set`
//! is one transaction: the lock is acquired (waiting at most the bus
//! timeout), one register is touched, and the lock is released.  Addresses
//! outside the holding-register range are refused the way a controller
//! answers with an illegal-address exception.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use log::{trace, warn};

use crate::app::ports::RegisterBus;
use crate::config::LineConfig;
use crate::error::BusError;
use crate::signals::register_offset;

/// Pause between lock attempts while another transaction is in flight.
const LOCK_RETRY: Duration = Duration::from_millis(1);

pub struct InMemoryRegisterBank {
    registers: Mutex<BTreeMap<u16, u16>>,
    timeout: Duration,
}

impl InMemoryRegisterBank {
    pub fn new(timeout: Duration) -> Self {
        Self {
            registers: Mutex::new(BTreeMap::new()),
            timeout,
        }
    }

    pub fn from_config(config: &LineConfig) -> Self {
        Self::new(Duration::from_millis(u64::from(config.bus_timeout_ms)))
    }

    /// Run `f` on the register file under the transaction lock.
    fn transaction<T>(
        &self,
        address: u32,
        f: impl FnOnce(&mut BTreeMap<u16, u16>, u16) -> T,
    ) -> Result<T, BusError> {
        let offset = register_offset(address).ok_or(BusError::IllegalAddress { address })?;
        let mut guard = self.lock(address)?;
        Ok(f(&mut guard, offset))
    }

    fn lock(&self, address: u32) -> Result<MutexGuard<'_, BTreeMap<u16, u16>>, BusError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.registers.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(poisoned)) => {
                    warn!("register bank lock poisoned, recovering");
                    return Ok(poisoned.into_inner());
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(BusError::Timeout { address });
                    }
                    thread::sleep(LOCK_RETRY);
                }
            }
        }
    }
}

impl RegisterBus for InMemoryRegisterBank {
    fn get(&self, address: u32) -> Result<u16, BusError> {
        let value = self.transaction(address, |regs, offset| {
            regs.get(&offset).copied().unwrap_or_default()
        })?;
        trace!("bus get {} -> {}", address, value);
        Ok(value)
    }

    fn set(&self, address: u32, value: u16) -> Result<(), BusError> {
        self.transaction(address, |regs, offset| {
            regs.insert(offset, value);
        })?;
        trace!("bus set {} <- {}", address, value);
        Ok(())
    }
}
