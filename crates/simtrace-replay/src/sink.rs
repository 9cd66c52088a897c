//! Replay delivery targets.
//!
//! A [`ReplaySink`] is invoked synchronously from the replay task, once per
//! event. Returning an error (or panicking) marks that single delivery as
//! failed; the replay continues with the next event.

use simtrace_types::Event;
use tokio::sync::mpsc;

/// Boxed error returned by a failing sink.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer of replayed events.
pub trait ReplaySink: Send {
    /// Handle one replayed event.
    fn deliver(&mut self, event: &Event) -> Result<(), SinkError>;
}

impl<F, E> ReplaySink for F
where
    F: FnMut(&Event) -> Result<(), E> + Send,
    E: Into<SinkError>,
{
    fn deliver(&mut self, event: &Event) -> Result<(), SinkError> {
        self(event).map_err(Into::into)
    }
}

/// Forwards replayed events to an async consumer, e.g. a dashboard socket.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ReplaySink for ChannelSink {
    fn deliver(&mut self, event: &Event) -> Result<(), SinkError> {
        self.tx
            .send(event.clone())
            .map_err(|_closed| "replay receiver dropped".into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use simtrace_types::EventType;

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |event: &Event| -> Result<(), std::io::Error> {
                seen.push(event.event_id.clone());
                Ok(())
            };
            sink.deliver(&Event::new("sim-1", EventType::UserAction)).unwrap();
        }
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn channel_sink_fails_once_receiver_is_gone() {
        let (mut sink, rx) = ChannelSink::new();
        let event = Event::new("sim-1", EventType::UserAction);
        assert!(sink.deliver(&event).is_ok());
        drop(rx);
        assert!(sink.deliver(&event).is_err());
    }
}
