use std::fmt;

use bytes::BytesMut;

use super::{MessageId, PeerMessage, split_payload};
use crate::{
    error::{ApplyError, DecodeError},
    session::PeerSession,
    storage::PieceStorage,
};

// Messages without payload, they only flip a flag of the session.
macro_rules! state_message {
    ($(#[$doc:meta])* $name:ident, $id:ident, $text:literal, |$session:ident| $apply:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl PeerMessage for $name {
            const ID: MessageId = MessageId::$id;

            fn create(frame: &[u8]) -> Result<Self, DecodeError> {
                split_payload(Self::ID, frame)?;
                Ok($name)
            }

            fn payload_len(&self) -> usize {
                0
            }

            fn write_payload(&self, _dst: &mut BytesMut) {}

            fn apply_received(
                &self,
                $session: &mut PeerSession,
                _storage: &dyn PieceStorage,
            ) -> Result<(), ApplyError> {
                $apply;
                Ok(())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str($text)
            }
        }
    };
}

state_message!(
    /// The sender won't answer requests until it unchokes.
    ChokeMessage,
    Choke,
    "choke",
    |session| session.set_peer_choked(true)
);

state_message!(
    UnchokeMessage,
    Unchoke,
    "unchoke",
    |session| session.set_peer_choked(false)
);

state_message!(
    InterestedMessage,
    Interested,
    "interested",
    |session| session.is_peer_interesting = true
);

state_message!(
    NotInterestedMessage,
    NotInterested,
    "not interested",
    |session| session.is_peer_interesting = false
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{session::BlockInfo, storage::LocalPieces};

    fn session() -> PeerSession {
        PeerSession::new("127.0.0.1:6881".parse().unwrap())
    }

    #[test]
    fn test_create_checks_id() {
        assert!(ChokeMessage::create(&[0]).is_ok());
        assert_eq!(
            ChokeMessage::create(&[1]),
            Err(DecodeError::UnexpectedId {
                expected: MessageId::Choke,
                actual: 1
            })
        );
        assert_eq!(UnchokeMessage::create(&[]), Err(DecodeError::MissingId));
    }

    #[test]
    fn test_serialize() {
        assert_eq!(&ChokeMessage.serialize()[..], &[0, 0, 0, 1, 0]);
        assert_eq!(&UnchokeMessage.serialize()[..], &[0, 0, 0, 1, 1]);
        assert_eq!(&InterestedMessage.serialize()[..], &[0, 0, 0, 1, 2]);
        assert_eq!(&NotInterestedMessage.serialize()[..], &[0, 0, 0, 1, 3]);
    }

    #[test]
    fn test_choke_and_unchoke() {
        let mut session = session();
        let storage = LocalPieces::new(1);

        UnchokeMessage.apply_received(&mut session, &storage).unwrap();
        assert!(!session.is_peer_choked);

        session.add_outstanding(BlockInfo::new(0, 0, 1024));
        ChokeMessage.apply_received(&mut session, &storage).unwrap();
        assert!(session.is_peer_choked);
        assert!(session.outstanding_requests().is_empty());
    }

    #[test]
    fn test_interest_does_not_need_resources() {
        let mut session = session();
        let storage = LocalPieces::new(1);

        InterestedMessage.apply_received(&mut session, &storage).unwrap();
        assert!(session.is_peer_interesting);
        NotInterestedMessage
            .apply_received(&mut session, &storage)
            .unwrap();
        assert!(!session.is_peer_interesting);
    }
}
