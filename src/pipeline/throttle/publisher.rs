use crate::pipeline::domain::{QualityLevel, QualityProfiles, QualitySnapshot, ThrottleLevel};
use tokio::sync::watch;

/// Single writer of the process-wide quality snapshot.
///
/// Readers hold a `watch::Receiver` and copy the snapshot once per frame.
pub struct QualityPublisher {
    sender: watch::Sender<QualitySnapshot>,
    ceiling: QualityLevel,
    profiles: QualityProfiles,
}

impl QualityPublisher {
    pub fn new(
        initial: ThrottleLevel,
        ceiling: QualityLevel,
        profiles: QualityProfiles,
    ) -> (Self, watch::Receiver<QualitySnapshot>) {
        let (sender, receiver) =
            watch::channel(QualitySnapshot::resolve(initial, ceiling, &profiles));
        (
            Self {
                sender,
                ceiling,
                profiles,
            },
            receiver,
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<QualitySnapshot> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> QualitySnapshot {
        *self.sender.borrow()
    }

    /// Swap in the snapshot for `level`; receivers are only woken when it differs.
    pub fn publish(&self, level: ThrottleLevel) -> QualitySnapshot {
        let next = QualitySnapshot::resolve(level, self.ceiling, &self.profiles);
        self.sender.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        next
    }
}
