//! Change feed subscriber
//!
//! Store-side record of one subscription: which room it watches and the
//! channel events are pushed into.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::store::ChangeEvent;
use crate::types::{RoomCode, SubscriptionId};

/// Subscriber information held by the store actor
#[derive(Debug)]
pub struct Subscriber {
    pub id: SubscriptionId,
    /// Room being watched
    pub room_code: RoomCode,
    /// Store → subscriber event channel
    pub sender: mpsc::UnboundedSender<ChangeEvent>,
}

impl Subscriber {
    pub fn new(
        id: SubscriptionId,
        room_code: RoomCode,
        sender: mpsc::UnboundedSender<ChangeEvent>,
    ) -> Self {
        Self {
            id,
            room_code,
            sender,
        }
    }

    /// Check if this subscriber watches the given room
    pub fn watches(&self, room_code: &RoomCode) -> bool {
        &self.room_code == room_code
    }

    /// Push an event to this subscriber
    ///
    /// Returns an error if the receiving side has been dropped.
    pub fn send(&self, event: ChangeEvent) -> Result<(), SendError> {
        self.sender
            .send(event)
            .map_err(|_| SendError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlayerId;

    fn deleted(code: &RoomCode) -> ChangeEvent {
        ChangeEvent::PlayerDeleted {
            player_id: PlayerId::new(),
            room_code: code.clone(),
        }
    }

    #[test]
    fn test_subscriber_delivery() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let code = RoomCode("222222".to_string());
        let sub = Subscriber::new(SubscriptionId(1), code.clone(), tx);

        assert!(sub.watches(&code));
        assert!(!sub.watches(&RoomCode("333333".to_string())));

        sub.send(deleted(&code)).unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_subscriber_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let code = RoomCode("222222".to_string());
        let sub = Subscriber::new(SubscriptionId(1), code.clone(), tx);
        drop(rx);

        assert!(sub.send(deleted(&code)).is_err());
    }
}
