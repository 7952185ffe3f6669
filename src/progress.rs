//! Terminal spinner shown while a long blocking step runs.

use std::io::{self, IsTerminal, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Delay between frames
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Run `op` while a spinner labeled `message` animates on stderr.
///
/// The spinner lives on a scoped thread, so it never outlives `op`: it is
/// told to stop as soon as `op` returns (or unwinds) and its line is cleared
/// before this function returns. Without a terminal on stderr, `op` simply
/// runs.
pub fn with_spinner<T>(message: &str, op: impl FnOnce() -> T) -> T {
    if !io::stderr().is_terminal() {
        return op();
    }

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    thread::scope(move |scope| {
        scope.spawn(move || spin(&mut io::stderr(), message, &stop_rx));
        let result = op();
        drop(stop_tx);
        result
    })
}

/// Draw frames until `stop` fires or disconnects, then clear the line.
fn spin<W: Write>(out: &mut W, message: &str, stop: &Receiver<()>) {
    for frame in FRAMES.iter().cycle() {
        let _ = write!(out, "\r{} {}", message, frame);
        let _ = out.flush();

        match stop.recv_timeout(FRAME_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let width = message.chars().count() + 2;
    let _ = write!(out, "\r{}\r", " ".repeat(width));
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_spinner_returns_op_result() {
        assert_eq!(with_spinner("Working", || 21 * 2), 42);
    }

    #[test]
    fn test_spin_stops_and_clears_line() {
        let (tx, rx) = mpsc::channel();
        tx.send(()).unwrap();

        let mut out = Vec::new();
        spin(&mut out, "Evaluating", &rx);

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("\rEvaluating ⠋"));
        assert!(text.ends_with(&format!("\r{}\r", " ".repeat(12))));
    }

    #[test]
    fn test_spin_stops_on_disconnect() {
        let (tx, rx) = mpsc::channel::<()>();
        drop(tx);

        let mut out = Vec::new();
        spin(&mut out, "x", &rx);
        assert_eq!(String::from_utf8(out).unwrap().matches('⠋').count(), 1);
    }

    #[test]
    fn test_spin_animates_until_stopped() {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let mut out = Vec::new();
            spin(&mut out, "x", &rx);
            out
        });
        thread::sleep(FRAME_INTERVAL * 3);
        tx.send(()).unwrap();

        let text = String::from_utf8(handle.join().unwrap()).unwrap();
        assert!(text.contains('⠙'));
    }
}
