use tokio::sync::watch;

/// Sender half of a shutdown channel.
///
/// Sending through this handle notifies every subscribed [`ShutdownRx`] that
/// shutdown has been requested. The same primitive is used both for
/// process-wide shutdown and for stopping individual workers.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Signals shutdown to all subscribed receivers.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new receiver subscribed to this sender.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Receiver half of a shutdown channel.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates a new pair of [`ShutdownTx`] and [`ShutdownRx`].
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}
