//! Cooperative single-step controller
//!
//! A debug-mode frame blocks before every instruction until the driver
//! grants a step, then hands the driver the instruction pointer reached.
//! Both handoffs are rendezvous channels, so the two sides strictly
//! alternate. When the frame finishes, faults included, it drops its ends
//! and the driver observes end-of-channel.

use crossbeam_channel::{Receiver, Sender, bounded};

/// Driver side of the step protocol
///
/// Obtained from [`Vm::debugger`](crate::Vm::debugger) and usually moved to
/// the thread that paces execution.
///
/// ```text
/// while debugger.step() {
///     let ip = debugger.position();
/// }
/// ```
#[derive(Debug)]
pub struct Debugger {
    step: Sender<()>,
    position: Receiver<usize>,
}

impl Debugger {
    /// Grant the frame one instruction
    ///
    /// Blocks until the frame is ready for it. Returns `false` once the frame
    /// has finished.
    pub fn step(&self) -> bool {
        self.step.send(()).is_ok()
    }

    /// Wait for the instruction pointer after the granted instruction
    ///
    /// `None` once the frame has finished.
    pub fn position(&self) -> Option<usize> {
        self.position.recv().ok()
    }
}

/// Frame side of the step protocol
#[derive(Debug)]
pub(crate) struct StepChannels {
    step: Receiver<()>,
    position: Sender<usize>,
}

impl StepChannels {
    /// Block until a step is granted; `false` if the driver went away
    pub(crate) fn wait(&self) -> bool {
        self.step.recv().is_ok()
    }

    /// Report the instruction pointer; `false` if the driver went away
    pub(crate) fn report(&self, ip: usize) -> bool {
        self.position.send(ip).is_ok()
    }
}

/// Create a connected driver/frame pair
pub(crate) fn channels() -> (Debugger, StepChannels) {
    let (step_tx, step_rx) = bounded(0);
    let (position_tx, position_rx) = bounded(0);
    (
        Debugger {
            step: step_tx,
            position: position_rx,
        },
        StepChannels {
            step: step_rx,
            position: position_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_handshake() {
        let (debugger, frame) = channels();
        let handle = thread::spawn(move || {
            let mut ip = 0;
            while ip < 3 && frame.wait() {
                ip += 1;
                frame.report(ip);
            }
        });

        let mut seen = Vec::new();
        while debugger.step() {
            match debugger.position() {
                Some(ip) => seen.push(ip),
                None => break,
            }
        }
        handle.join().unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_driver_sees_end_of_channel() {
        let (debugger, frame) = channels();
        drop(frame);
        assert!(!debugger.step());
        assert_eq!(debugger.position(), None);
    }

    #[test]
    fn test_frame_sees_detached_driver() {
        let (debugger, frame) = channels();
        drop(debugger);
        assert!(!frame.wait());
        assert!(!frame.report(0));
    }
}
