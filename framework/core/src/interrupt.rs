use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::task::JoinHandle;

/// A termination request delivered to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Interrupt {
    #[display("SIGINT")]
    Interrupt,
    #[display("SIGTERM")]
    Terminate,
}

/// Receives [Interrupt]s for as long as it is held.
///
/// Once a signal has been hooked it stays hooked for the lifetime of the process. Dropping the
/// listener therefore does not restore the default "terminate" action, instead any later signal is
/// received and discarded.
pub struct InterruptListener {
    receiver: Receiver<Interrupt>,
    // Detached on drop, the forwarder keeps draining signals after the receiver is gone.
    _forwarder: Option<JoinHandle<()>>,
}

impl InterruptListener {
    /// Start listening for SIGINT and SIGTERM. Must be called from within a Tokio runtime.
    pub fn start() -> anyhow::Result<Self> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let (sender, receiver) = channel(1);

        let forwarder = tokio::spawn(async move {
            loop {
                let interrupt = tokio::select! {
                    Some(()) = sigint.recv() => Interrupt::Interrupt,
                    Some(()) = sigterm.recv() => Interrupt::Terminate,
                    else => break,
                };

                match sender.try_send(interrupt) {
                    Ok(()) => {}
                    Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                        log::debug!("Interrupt {interrupt} already pending, ignoring");
                    }
                    Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                        log::info!("Ignoring {interrupt}");
                    }
                }
            }
        });

        Ok(Self {
            receiver,
            _forwarder: Some(forwarder),
        })
    }

    /// A listener fed by hand instead of by process signals.
    pub fn channel() -> (Sender<Interrupt>, Self) {
        let (sender, receiver) = channel(1);
        (
            sender,
            Self {
                receiver,
                _forwarder: None,
            },
        )
    }

    /// Wait for the next interrupt. Returns `None` if interrupts can no longer be delivered.
    pub async fn recv(&mut self) -> Option<Interrupt> {
        self.receiver.recv().await
    }
}
