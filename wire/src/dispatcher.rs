use bytes::BytesMut;
use log::{info, trace, warn};
use thiserror::Error;
use tokio_util::codec::Decoder;

use crate::{
    codec::{CodecError, MessageCodec},
    config::WireConfig,
    error::{ApplyError, DecodeError, ProtocolFault, SessionError},
    message::Message,
    session::PeerSession,
    storage::PieceStorage,
};

pub(crate) type Result<T> = std::result::Result<T, DispatchError>;

/// Why a connection has to be closed. None of these are retried.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("framing failed: {0}")]
    Codec(#[from] CodecError),

    #[error("malformed message: {0}")]
    Decode(#[from] DecodeError),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolFault),

    #[error("session misuse: {0}")]
    Session(#[from] SessionError),
}

impl From<ApplyError> for DispatchError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::Fault(fault) => DispatchError::Protocol(fault),
            ApplyError::Session(err) => DispatchError::Session(err),
        }
    }
}

impl DispatchError {
    /// An ordinary end of the connection rather than a misbehaving peer.
    pub fn is_expected(&self) -> bool {
        matches!(self, DispatchError::Protocol(ProtocolFault::MutualSeeder))
    }
}

/// Turns frames from the transport into session updates.
pub struct MessageDispatcher {
    codec: MessageCodec,
}

impl MessageDispatcher {
    pub fn new(config: &WireConfig) -> Self {
        Self {
            codec: MessageCodec::new(config),
        }
    }

    /// Decodes one frame body (id and payload) and applies it to the session.
    pub fn dispatch(
        &self,
        frame: &[u8],
        session: &mut PeerSession,
        storage: &dyn PieceStorage,
    ) -> Result<()> {
        let result = Message::decode(frame)
            .map_err(DispatchError::from)
            .and_then(|message| {
                trace!("{} <- {}", session.addr(), message);
                message
                    .apply_received(session, storage)
                    .map_err(DispatchError::from)
            });
        if let Err(err) = &result {
            report(session, err);
        }
        result
    }

    /// Applies every complete frame buffered in `src`, in order. A partial
    /// frame stays in `src` until more bytes arrive.
    ///
    /// Returns the number of frames applied.
    pub fn receive(
        &mut self,
        src: &mut BytesMut,
        session: &mut PeerSession,
        storage: &dyn PieceStorage,
    ) -> Result<usize> {
        let mut applied = 0;
        loop {
            let frame = match self.codec.decode(src) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(applied),
                Err(err) => {
                    let err = DispatchError::from(err);
                    report(session, &err);
                    return Err(err);
                }
            };
            self.dispatch(&frame, session, storage)?;
            applied += 1;
        }
    }
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new(&WireConfig::default())
    }
}

pub(crate) fn report(session: &PeerSession, err: &DispatchError) {
    if err.is_expected() {
        info!("{}: closing connection, {}", session.addr(), err);
    } else {
        warn!("{}: aborting connection, {}", session.addr(), err);
    }
}
