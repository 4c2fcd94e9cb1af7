use futures::{SinkExt, StreamExt};
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::{
    codec::{CodecError, MessageCodec},
    config::WireConfig,
    dispatcher::{DispatchError, MessageDispatcher, report},
    message::{BitfieldMessage, Message},
    session::PeerSession,
    storage::PieceStorage,
};

/// A peer connection after the handshake.
///
/// Frames are read and applied one at a time, so a message has taken effect
/// before the next one is decoded. Dropping the connection closes the
/// transport and discards the session.
pub struct PeerConnection<T> {
    framed: Framed<T, MessageCodec>,
    session: PeerSession,
    dispatcher: MessageDispatcher,
}

impl<T> PeerConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T, session: PeerSession, config: &WireConfig) -> Self {
        Self {
            framed: Framed::new(io, MessageCodec::new(config)),
            session,
            dispatcher: MessageDispatcher::new(config),
        }
    }

    pub fn session(&self) -> &PeerSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut PeerSession {
        &mut self.session
    }

    pub fn into_session(self) -> PeerSession {
        self.session
    }

    /// Sends a message and records its effect on our side of the session.
    pub async fn send(&mut self, message: Message) -> Result<(), CodecError> {
        match &message {
            Message::Choke(_) => self.session.set_choked(true),
            Message::Unchoke(_) => self.session.set_choked(false),
            Message::Interested(_) => self.session.is_interesting = true,
            Message::NotInterested(_) => self.session.is_interesting = false,
            Message::Request(request) => self.session.add_outstanding(request.block),
            Message::Cancel(cancel) => {
                self.session.take_outstanding(&cancel.block);
            }
            Message::KeepAlive
            | Message::Have(_)
            | Message::Bitfield(_)
            | Message::Piece(_)
            | Message::Port(_) => {}
        }

        trace!("{} -> {}", self.session.addr(), message);
        self.framed.send(message).await
    }

    /// Sends our own pieces, meant to be the first message after the handshake.
    pub async fn send_bitfield(&mut self, storage: &dyn PieceStorage) -> Result<(), CodecError> {
        self.send(BitfieldMessage::from_storage(storage).into())
            .await
    }

    /// Reads and applies messages until the peer closes the connection or a
    /// message faults.
    pub async fn run(&mut self, storage: &dyn PieceStorage) -> Result<(), DispatchError> {
        while let Some(frame) = self.framed.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => {
                    let err = DispatchError::from(err);
                    report(&self.session, &err);
                    return Err(err);
                }
            };
            self.dispatcher
                .dispatch(&frame, &mut self.session, storage)?;
        }

        debug!("{}: connection closed by peer", self.session.addr());
        Ok(())
    }
}
