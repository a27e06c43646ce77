use super::error_code::ErrorCode;
use super::registers::Registers;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, TryLockError};

/// Lifecycle of a guest thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    /// Spawned, not started yet.
    Created,
    Running,
    /// Halted, stopped or faulted.
    Finished,
}

/// One fetch-decode-execute context.
///
/// The register file is locked by the executing loop for as long as the
/// thread runs; other threads only touch the `running` flag and the state.
#[derive(Debug)]
pub struct Thread {
    index: u64,
    registers: Mutex<Registers>,
    running: AtomicBool,
    state: Mutex<ThreadState>,
    finished: Condvar,
}

impl Thread {
    pub fn new(index: u64, registers: Registers) -> Self {
        Self {
            index,
            registers: Mutex::new(registers),
            running: AtomicBool::new(true),
            state: Mutex::new(ThreadState::Created),
            finished: Condvar::new(),
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// True until `HLT`, `THREAD_STOP` or `EXIT` clears it. Checked once per
    /// instruction, so an instruction in progress always completes.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn state(&self) -> ThreadState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, ThreadState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Locks the register file. Blocks while the thread is executing.
    pub fn lock_registers(&self) -> MutexGuard<'_, Registers> {
        self.registers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Locks the register file unless the thread is executing.
    pub fn try_lock_registers(&self) -> Option<MutexGuard<'_, Registers>> {
        match self.registers.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Moves `Created` to `Running`.
    pub(super) fn mark_started(&self) -> Result<(), ErrorCode> {
        let mut state = self.lock_state();
        if *state != ThreadState::Created {
            return Err(ErrorCode::Ethreadstarted);
        }
        *state = ThreadState::Running;
        Ok(())
    }

    /// Moves to `Finished` and wakes every joiner.
    pub(super) fn mark_finished(&self) {
        self.stop();
        *self.lock_state() = ThreadState::Finished;
        self.finished.notify_all();
    }

    /// Blocks until the thread finishes.
    ///
    /// A thread that was never started fails fast instead of blocking forever.
    pub fn join(&self) -> Result<(), ErrorCode> {
        let mut state = self.lock_state();
        if *state == ThreadState::Created {
            return Err(ErrorCode::Ethreadnotstarted);
        }
        while *state != ThreadState::Finished {
            state = self
                .finished
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lifecycle_transitions() {
        let t = Thread::new(1, Registers::new());
        assert_eq!(t.state(), ThreadState::Created);
        assert_eq!(t.join(), Err(ErrorCode::Ethreadnotstarted));

        t.mark_started().unwrap();
        assert_eq!(t.mark_started(), Err(ErrorCode::Ethreadstarted));
        assert_eq!(t.state(), ThreadState::Running);

        t.mark_finished();
        assert_eq!(t.state(), ThreadState::Finished);
        assert!(!t.is_running());
        assert_eq!(t.join(), Ok(()));
    }

    #[test]
    fn join_wakes_on_finish() {
        let t = Arc::new(Thread::new(2, Registers::new()));
        t.mark_started().unwrap();

        let joiner = {
            let t = Arc::clone(&t);
            thread::spawn(move || t.join())
        };
        t.mark_finished();
        assert_eq!(joiner.join().unwrap(), Ok(()));
    }

    #[test]
    fn stop_clears_running_flag() {
        let t = Thread::new(3, Registers::new());
        assert!(t.is_running());
        t.stop();
        assert!(!t.is_running());
    }
}
