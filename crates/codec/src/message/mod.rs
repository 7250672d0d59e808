//! KCP wire messages (§4.6 of the design).
//!
//! First byte of every frame is the kind tag; the remainder is kind-specific.
//! `ChannelData`/segmentation/ARQ framing belongs to the KCP transport, not
//! here — this module only ever sees one already-reassembled application
//! message at a time.

use bytes::{BufMut, BytesMut};

use crate::{Error, Token, read_u32};

/// Reason byte carried on `ServerSideDisconnection` (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    UnreliableCommunicationNotAllowed = 0,
    InvalidPayloadLength = 1,
    UnrecognizableMessageHeader = 2,
    InvalidTokenPayloadLength = 3,
    InvalidDisconnectClientPayloadLength = 4,
    InvalidAuthToken = 5,
    UnAuthorizedAction = 6,
    TimeOut = 7,
    InvalidSessionId = 8,
    SessionFull = 9,
    HostShutdown = 10,
    HostTriggeredDisconnection = 11,
    ServerShutdown = 12,
    ServerSideError = 13,
}

impl DisconnectReason {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// The three message-carrying channels a `Payload`/`PayloadRelay` may be
/// tagged with on the wire. The transport enforces `Reliable` regardless of
/// what the sender asked for (§4.4 Payload layout note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Reliable = 0,
    Unreliable = 1,
}

impl TransferMode {
    fn from_byte(byte: u8) -> Result<Self, Error> {
        match byte {
            0 => Ok(Self::Reliable),
            1 => Ok(Self::Unreliable),
            _ => Err(Error::InvalidInput),
        }
    }
}

/// Client → server messages (§4.6).
#[derive(Debug)]
pub enum ClientMessage<'a> {
    AuthSession(Token),
    JoinSession(Token),
    ModifySession(Token),
    Payload {
        recipient_local_id: u32,
        transfer_channel: u32,
        transfer_mode: TransferMode,
        data: &'a [u8],
    },
    DisconnectClient(u32),
}

const AUTH_SESSION: u8 = 0;
const JOIN_SESSION: u8 = 1;
const MODIFY_SESSION: u8 = 2;
const PAYLOAD: u8 = 3;
const DISCONNECT_CLIENT: u8 = 4;

impl<'a> ClientMessage<'a> {
    /// Decode a single KCP application message.
    ///
    /// Returns the specific [`Error`] describing *why* the body is invalid;
    /// callers (the relay core) translate that into the matching
    /// [`DisconnectReason`] because the two taxonomies are not 1:1 (an
    /// unknown tag and a too-short token body close with different
    /// reasons).
    pub fn decode(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let (&tag, body) = bytes.split_first().ok_or(DecodeError::EmptyFrame)?;

        match tag {
            AUTH_SESSION => Ok(Self::AuthSession(read_token(body)?)),
            JOIN_SESSION => Ok(Self::JoinSession(read_token(body)?)),
            MODIFY_SESSION => Ok(Self::ModifySession(read_token(body)?)),
            PAYLOAD => decode_payload(body),
            DISCONNECT_CLIENT => {
                if body.len() != 4 {
                    return Err(DecodeError::InvalidDisconnectClientLength);
                }
                Ok(Self::DisconnectClient(
                    read_u32(body, 0).map_err(|_| DecodeError::InvalidDisconnectClientLength)?,
                ))
            }
            other => Err(DecodeError::UnknownKind(other)),
        }
    }
}

fn read_token(body: &[u8]) -> Result<Token, DecodeError> {
    body.try_into().map_err(|_| DecodeError::InvalidTokenLength)
}

fn decode_payload(body: &[u8]) -> Result<ClientMessage<'_>, DecodeError> {
    // A sender with body length <= 4 is dropped with InvalidPayloadLength;
    // the full enforced minimum (9 header bytes + >=1 opaque byte) is
    // checked by the caller, which additionally treats 5..=9 as the same
    // error — see RelayCore::handle_payload.
    if body.len() <= 4 {
        return Err(DecodeError::InvalidPayloadLength);
    }

    if body.len() < 9 {
        return Err(DecodeError::InvalidPayloadLength);
    }

    let recipient_local_id = read_u32(body, 0).map_err(|_| DecodeError::InvalidPayloadLength)?;
    let transfer_channel = read_u32(body, 4).map_err(|_| DecodeError::InvalidPayloadLength)?;
    let transfer_mode =
        TransferMode::from_byte(body[8]).map_err(|_| DecodeError::InvalidPayloadLength)?;
    let data = &body[9..];

    if data.is_empty() {
        return Err(DecodeError::InvalidPayloadLength);
    }

    Ok(ClientMessage::Payload {
        recipient_local_id,
        transfer_channel,
        transfer_mode,
        data,
    })
}

/// Decode failure, kept distinct from [`Error`] because each variant maps to
/// a specific [`DisconnectReason`] rather than a generic parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    EmptyFrame,
    UnknownKind(u8),
    InvalidTokenLength,
    InvalidPayloadLength,
    InvalidDisconnectClientLength,
}

impl DecodeError {
    pub fn reason(self) -> DisconnectReason {
        match self {
            Self::EmptyFrame | Self::UnknownKind(_) => DisconnectReason::UnrecognizableMessageHeader,
            Self::InvalidTokenLength => DisconnectReason::InvalidTokenPayloadLength,
            Self::InvalidPayloadLength => DisconnectReason::InvalidPayloadLength,
            Self::InvalidDisconnectClientLength => {
                DisconnectReason::InvalidDisconnectClientPayloadLength
            }
        }
    }
}

/// Server → client messages (§4.6). Encoders append to a caller-owned
/// buffer rather than allocating, following the teacher's
/// `encode_buffer`-threaded `Request`/`Response` pattern.
pub enum ServerMessage<'a> {
    ServerSideDisconnection(DisconnectReason),
    ClientDisconnected(u32),
    ClientConnected { connection_id: u32, local_id: u32 },
    PayloadRelay {
        sender_or_host_local_id: u32,
        transfer_channel: u32,
        transfer_mode: TransferMode,
        data: &'a [u8],
    },
    Success(Option<u32>),
}

impl<'a> ServerMessage<'a> {
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Self::ServerSideDisconnection(reason) => {
                out.put_u8(0);
                out.put_u8(reason.as_byte());
            }
            Self::ClientDisconnected(connection_id) => {
                out.put_u8(1);
                out.put_u32_le(*connection_id);
            }
            Self::ClientConnected {
                connection_id,
                local_id,
            } => {
                out.put_u8(2);
                out.put_u32_le(*connection_id);
                out.put_u32_le(*local_id);
            }
            Self::PayloadRelay {
                sender_or_host_local_id,
                transfer_channel,
                transfer_mode,
                data,
            } => {
                out.put_u8(3);
                out.put_u32_le(*sender_or_host_local_id);
                out.put_u32_le(*transfer_channel);
                out.put_u8(*transfer_mode as u8);
                out.put_slice(data);
            }
            Self::Success(local_id) => {
                out.put_u8(4);
                if let Some(id) = local_id {
                    out.put_u32_le(*id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_auth_session() {
        let mut bytes = vec![AUTH_SESSION];
        bytes.extend_from_slice(&[7u8; 16]);
        match ClientMessage::decode(&bytes).unwrap() {
            ClientMessage::AuthSession(token) => assert_eq!(token, [7u8; 16]),
            _ => panic!("expected AuthSession"),
        }
    }

    #[test]
    fn rejects_short_token() {
        let bytes = vec![AUTH_SESSION, 1, 2, 3];
        assert_eq!(
            ClientMessage::decode(&bytes).unwrap_err(),
            DecodeError::InvalidTokenLength
        );
    }

    #[test]
    fn rejects_unknown_kind() {
        let bytes = vec![0xFF];
        assert_eq!(
            ClientMessage::decode(&bytes).unwrap_err(),
            DecodeError::UnknownKind(0xFF)
        );
    }

    #[test]
    fn decodes_payload_and_rewrites_roundtrip_shape() {
        let mut bytes = vec![PAYLOAD];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&9u32.to_le_bytes());
        bytes.push(0);
        bytes.extend_from_slice(b"hi");

        match ClientMessage::decode(&bytes).unwrap() {
            ClientMessage::Payload {
                recipient_local_id,
                transfer_channel,
                transfer_mode,
                data,
            } => {
                assert_eq!(recipient_local_id, 1);
                assert_eq!(transfer_channel, 9);
                assert_eq!(transfer_mode, TransferMode::Reliable);
                assert_eq!(data, b"hi");
            }
            _ => panic!("expected Payload"),
        }
    }

    #[test]
    fn payload_below_minimum_length_is_rejected() {
        // 4 header bytes only, no mode byte, no data.
        let bytes = vec![PAYLOAD, 1, 0, 0, 0];
        assert_eq!(
            ClientMessage::decode(&bytes).unwrap_err(),
            DecodeError::InvalidPayloadLength
        );
    }

    #[test]
    fn payload_with_empty_opaque_body_is_rejected() {
        let mut bytes = vec![PAYLOAD];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.push(0);
        assert_eq!(
            ClientMessage::decode(&bytes).unwrap_err(),
            DecodeError::InvalidPayloadLength
        );
    }

    #[test]
    fn encodes_success_with_and_without_local_id() {
        let mut out = BytesMut::new();
        ServerMessage::Success(Some(1)).encode(&mut out);
        assert_eq!(&out[..], &[4, 1, 0, 0, 0]);

        out.clear();
        ServerMessage::Success(None).encode(&mut out);
        assert_eq!(&out[..], &[4]);
    }

    #[test]
    fn encodes_disconnect_client() {
        let bytes = vec![DISCONNECT_CLIENT, 5, 0, 0, 0];
        match ClientMessage::decode(&bytes).unwrap() {
            ClientMessage::DisconnectClient(id) => assert_eq!(id, 5),
            _ => panic!("expected DisconnectClient"),
        }
    }
}
