//! Prints received message bodies
//!
//! The sink runs inside the connection task, so it only hands bodies to a
//! printer thread; a blocked stdout never stalls the socket.

use std::io::Write;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;
use wirechat_core::MessageFrame;
use wirechat_net::{CloseReason, FrameSink};

/// Forwards each body to the printer and reports the close reason
pub struct PrintSink {
    bodies_tx: mpsc::UnboundedSender<Vec<u8>>,
    closed_tx: Option<oneshot::Sender<CloseReason>>,
}

impl PrintSink {
    pub fn new(
        bodies_tx: mpsc::UnboundedSender<Vec<u8>>,
        closed_tx: oneshot::Sender<CloseReason>,
    ) -> Self {
        Self {
            bodies_tx,
            closed_tx: Some(closed_tx),
        }
    }
}

impl FrameSink for PrintSink {
    fn deliver(&mut self, frame: MessageFrame) {
        let _ = self.bodies_tx.send(frame.body().to_vec());
    }

    fn closed(&mut self, reason: &CloseReason) {
        if let Some(tx) = self.closed_tx.take() {
            let _ = tx.send(reason.clone());
        }
    }
}

/// Start a thread writing each body followed by a newline to `out`.
///
/// The thread ends once every sender is dropped and hands `out` back.
pub fn spawn_printer<W: Write + Send + 'static>(
    mut out: W,
) -> (mpsc::UnboundedSender<Vec<u8>>, JoinHandle<W>) {
    let (bodies_tx, mut bodies_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let printer = std::thread::spawn(move || {
        while let Some(body) = bodies_rx.blocking_recv() {
            let result = out
                .write_all(&body)
                .and_then(|_| out.write_all(b"\n"))
                .and_then(|_| out.flush());
            if let Err(e) = result {
                warn!(error = %e, "Failed to write message");
            }
        }
        out
    });
    (bodies_tx, printer)
}
