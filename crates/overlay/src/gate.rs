use tokio::sync::oneshot;

/// Released once per session, on the first frame that carries an overlay.
pub trait PlaybackGate {
    fn on_first_detection(&mut self);
}

/// Only logs the release.
#[derive(Debug, Default)]
pub struct LogGate;

impl PlaybackGate for LogGate {
    fn on_first_detection(&mut self) {
        tracing::info!("Playback gate released");
    }
}

/// Signals a waiting task through a oneshot channel.
#[derive(Debug)]
pub struct ChannelGate {
    tx: Option<oneshot::Sender<()>>,
}

impl ChannelGate {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }
}

impl PlaybackGate for ChannelGate {
    fn on_first_detection(&mut self) {
        match self.tx.take() {
            Some(tx) => {
                if tx.send(()).is_err() {
                    tracing::debug!("Playback gate receiver already dropped");
                }
            }
            None => tracing::warn!("Playback gate released more than once"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_gate_signals_receiver() {
        let (mut gate, mut rx) = ChannelGate::new();
        assert!(rx.try_recv().is_err());

        gate.on_first_detection();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_channel_gate_tolerates_repeat_and_dropped_receiver() {
        let (mut gate, rx) = ChannelGate::new();
        drop(rx);
        gate.on_first_detection();
        gate.on_first_detection();
    }
}
