//! Status signals a caller can subscribe to for driving a progress indicator.
//!
//! Messages carry no parsing semantics and are sent without ever blocking a worker: a full or
//! disconnected channel simply misses the message.

use crossbeam_channel::{Sender, TrySendError};

use super::ParseStatus;

/// One lifecycle notification of a parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseProgress {
    /// The chunk structure was indexed and track decoding begins
    Started {
        /// Number of track chunks that will be decoded
        track_count: usize,
    },
    /// A track decoded successfully
    TrackParsed {
        /// Index of the track chunk
        index: usize,
        /// Tracks finished so far, in either way
        completed: usize,
        /// Tracks in the file
        total: usize,
    },
    /// A track failed to decode
    TrackFailed {
        /// Index of the track chunk
        index: usize,
        /// Tracks finished so far, in either way
        completed: usize,
        /// Tracks in the file
        total: usize,
    },
    /// Every track was handled
    Finished {
        /// Overall outcome
        status: ParseStatus,
    },
    /// The parse was aborted, no `Finished` follows
    Failed {
        /// Display form of the error
        reason: String,
    },
}

impl ParseProgress {
    /// Share of tracks handled, between 0 and 1, for the messages that know it
    pub fn fraction(&self) -> Option<f64> {
        match *self {
            Self::Started { .. } => Some(0.0),
            Self::TrackParsed {
                completed, total, ..
            }
            | Self::TrackFailed {
                completed, total, ..
            } => Some(if total == 0 {
                1.0
            } else {
                completed as f64 / total as f64
            }),
            Self::Finished { .. } => Some(1.0),
            Self::Failed { .. } => None,
        }
    }
}

/// Optional sending end of a progress channel
#[derive(Debug, Clone, Default)]
pub(crate) struct ProgressSink {
    /// Where messages go, if anyone listens
    sender: Option<Sender<ParseProgress>>,
}

impl ProgressSink {
    /// Wraps a sender
    pub(crate) fn new(sender: Sender<ParseProgress>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Sends a message if there is room for it
    pub(crate) fn notify(&self, message: ParseProgress) {
        let Some(sender) = &self.sender else {
            return;
        };

        if let Err(TrySendError::Full(message)) = sender.try_send(message) {
            log::trace!("Progress channel full, dropped {message:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::{bounded, unbounded};

    use super::{ParseProgress, ProgressSink};
    use crate::parser::ParseStatus;

    #[test]
    fn fractions_follow_completed_tracks() {
        let halfway = ParseProgress::TrackParsed {
            index: 3,
            completed: 2,
            total: 4,
        };

        assert_eq!(halfway.fraction(), Some(0.5));
        assert_eq!(
            ParseProgress::Finished {
                status: ParseStatus::Success
            }
            .fraction(),
            Some(1.0)
        );
        assert_eq!(
            ParseProgress::Failed {
                reason: String::new()
            }
            .fraction(),
            None
        );
    }

    #[test]
    fn notify_never_blocks() {
        let (sender, receiver) = bounded(1);
        let sink = ProgressSink::new(sender);

        sink.notify(ParseProgress::Started { track_count: 1 });
        sink.notify(ParseProgress::Started { track_count: 2 });
        assert_eq!(
            receiver.try_recv(),
            Ok(ParseProgress::Started { track_count: 1 })
        );

        let (sender, receiver) = unbounded();
        let sink = ProgressSink::new(sender);
        drop(receiver);
        sink.notify(ParseProgress::Started { track_count: 1 });

        ProgressSink::default().notify(ParseProgress::Started { track_count: 1 });
    }
}
