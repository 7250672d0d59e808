//! HTTP control-plane bodies (§4.5). Same "no JSON, fixed little-endian
//! layout" discipline as the KCP wire messages in [`crate::message`] — the
//! control plane and the data plane share one encoding philosophy.

use bytes::{Buf, BufMut, BytesMut};

use crate::{Error, Token, read_u32, read_u64};

fn put_string(out: &mut BytesMut, s: &str) {
    out.put_u16_le(s.len() as u16);
    out.put_slice(s.as_bytes());
}

fn take_string(bytes: &[u8], offset: &mut usize) -> Result<String, Error> {
    let len = bytes
        .get(*offset..*offset + 2)
        .ok_or(Error::InvalidInput)?
        .try_into()
        .map(u16::from_le_bytes)?;
    *offset += 2;

    let len = len as usize;
    let raw = bytes.get(*offset..*offset + len).ok_or(Error::InvalidInput)?;
    *offset += len;

    Ok(std::str::from_utf8(raw)?.to_string())
}

/// `SessionInfo{name, maxMembers}` — the body of `/session/allocate` and
/// `/session/modify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub name: String,
    pub max_members: u32,
}

impl SessionInfo {
    /// `name` non-empty after trimming, `maxMembers` positive (§4.5).
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && self.max_members > 0
    }

    pub fn encode(&self, out: &mut BytesMut) {
        put_string(out, &self.name);
        out.put_u32_le(self.max_members);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut offset = 0;
        let name = take_string(bytes, &mut offset)?;
        let max_members = read_u32(bytes, offset)?;
        Ok(Self { name, max_members })
    }
}

/// `uint64 sessionId` — the body of `/session/join`.
pub struct JoinRequest {
    pub session_id: u64,
}

impl JoinRequest {
    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u64_le(self.session_id);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 8 {
            return Err(Error::UnexpectedLength {
                expected: "8",
                got: bytes.len(),
            });
        }
        Ok(Self {
            session_id: read_u64(bytes, 0)?,
        })
    }
}

/// `Token{value, hasValue, errorMsg?}` — the response body shared by all
/// three allocate/join/modify endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub value: Option<Token>,
    pub error_msg: Option<String>,
}

impl TokenResponse {
    pub fn from_token(value: Token) -> Self {
        Self {
            value: Some(value),
            error_msg: None,
        }
    }

    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            value: None,
            error_msg: Some(message.into()),
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn encode(&self, out: &mut BytesMut) {
        match &self.value {
            Some(token) => {
                out.put_u8(1);
                out.put_slice(token);
            }
            None => {
                out.put_u8(0);
                put_string(out, self.error_msg.as_deref().unwrap_or(""));
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let (&tag, rest) = bytes.split_first().ok_or(Error::InvalidInput)?;
        match tag {
            1 => {
                let value: Token = rest.try_into().map_err(|_| Error::InvalidInput)?;
                Ok(Self::from_token(value))
            }
            0 => {
                let mut offset = 0;
                let message = take_string(rest, &mut offset)?;
                Ok(Self::from_error(message))
            }
            _ => Err(Error::InvalidInput),
        }
    }
}

/// Snapshot of one session for `GET /session/list` (`Session.toPreview()`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPreview {
    pub session_id: u64,
    pub name: String,
    pub max_members: u32,
    pub current_members: u32,
}

impl SessionPreview {
    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u64_le(self.session_id);
        put_string(out, &self.name);
        out.put_u32_le(self.max_members);
        out.put_u32_le(self.current_members);
    }

    fn decode(bytes: &[u8], offset: &mut usize) -> Result<Self, Error> {
        let session_id = read_u64(bytes, *offset)?;
        *offset += 8;
        let name = take_string(bytes, offset)?;
        let max_members = read_u32(bytes, *offset)?;
        *offset += 4;
        let current_members = read_u32(bytes, *offset)?;
        *offset += 4;
        Ok(Self {
            session_id,
            name,
            max_members,
            current_members,
        })
    }
}

/// `SessionPreviewArray` — the response body of `GET /session/list`.
pub struct SessionPreviewArray(pub Vec<SessionPreview>);

impl SessionPreviewArray {
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(4 + self.0.len() * 24);
        out.put_u32_le(self.0.len() as u32);
        for preview in &self.0 {
            preview.encode(&mut out);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = &bytes[..];
        let count = cursor.get_u32_le() as usize;
        let mut offset = 4;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let preview = SessionPreview::decode(bytes, &mut offset)?;
            items.push(preview);
        }
        Ok(Self(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_info_roundtrips() {
        let info = SessionInfo {
            name: "lobby".to_string(),
            max_members: 4,
        };
        let mut buf = BytesMut::new();
        info.encode(&mut buf);
        assert_eq!(SessionInfo::decode(&buf).unwrap(), info);
    }

    #[test]
    fn session_info_rejects_empty_name() {
        assert!(!SessionInfo {
            name: "   ".to_string(),
            max_members: 4,
        }
        .is_valid());
    }

    #[test]
    fn token_response_roundtrips_success_and_error() {
        let mut buf = BytesMut::new();
        let ok = TokenResponse::from_token([9u8; 16]);
        ok.encode(&mut buf);
        assert_eq!(TokenResponse::decode(&buf).unwrap(), ok);

        buf.clear();
        let err = TokenResponse::from_error("name must not be empty");
        err.encode(&mut buf);
        assert_eq!(TokenResponse::decode(&buf).unwrap(), err);
    }

    #[test]
    fn preview_array_roundtrips() {
        let arr = SessionPreviewArray(vec![
            SessionPreview {
                session_id: 1,
                name: "a".to_string(),
                max_members: 2,
                current_members: 1,
            },
            SessionPreview {
                session_id: 2,
                name: "b".to_string(),
                max_members: 4,
                current_members: 0,
            },
        ]);
        let encoded = arr.encode();
        let decoded = SessionPreviewArray::decode(&encoded).unwrap();
        assert_eq!(decoded.0, arr.0);
    }
}
