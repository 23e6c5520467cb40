use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

/// Create a linked stop handle and signal.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = mpsc::channel();
    (
        StopHandle { tx },
        StopSignal {
            rx,
            stopped: false,
        },
    )
}

/// Requests cancellation of a running session. Cloneable, so it can be moved
/// into a Ctrl-C handler or another thread.
#[derive(Clone, Debug)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        // The session may already have finished and dropped its signal.
        let _ = self.tx.send(());
    }
}

/// Polled by the controller once per loop iteration.
#[derive(Debug)]
pub struct StopSignal {
    rx: Receiver<()>,
    stopped: bool,
}

impl StopSignal {
    /// Whether a stop was requested. Once observed, stays set. Dropping every
    /// handle without calling `stop` does not count as a request.
    pub fn is_stopped(&mut self) -> bool {
        if !self.stopped {
            match self.rx.try_recv() {
                Ok(()) => self.stopped = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }
        }
        self.stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_sticky() {
        let (handle, mut signal) = stop_channel();
        assert!(!signal.is_stopped());
        handle.stop();
        assert!(signal.is_stopped());
        assert!(signal.is_stopped());
    }

    #[test]
    fn dropped_handle_is_not_a_stop() {
        let (handle, mut signal) = stop_channel();
        drop(handle);
        assert!(!signal.is_stopped());
    }

    #[test]
    fn stop_from_another_thread() {
        let (handle, mut signal) = stop_channel();
        let remote = handle.clone();
        std::thread::spawn(move || remote.stop())
            .join()
            .expect("stop thread");
        assert!(signal.is_stopped());
    }
}
