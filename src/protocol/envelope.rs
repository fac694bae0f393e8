//! Control line framing and envelope decoding
//!
//! Lines are UTF-8 JSON objects terminated by `\n` (a trailing `\r` is
//! tolerated). Decoding distinguishes three failures so that the server
//! can answer each precisely: the line is not JSON, the `type` is not
//! one this side understands, or the payload does not fit the `type`.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::message::{ClientRequest, ServerMessage};
use crate::error::ProtocolError;

/// Serialize a message as one newline-terminated line
pub fn encode_line<T: Serialize>(message: &T) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new().writer();
    serde_json::to_writer(&mut buf, message)
        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
    let mut buf = buf.into_inner();
    buf.put_u8(b'\n');
    Ok(buf.freeze())
}

/// Split the next complete line off the front of a read buffer
///
/// Returns `Ok(None)` when no newline has arrived yet. The returned line
/// has its terminator removed. Fails if a line grows beyond `max_len`
/// bytes, so a peer that never sends a newline cannot grow the buffer
/// without bound.
pub fn take_line(buf: &mut BytesMut, max_len: usize) -> Result<Option<Bytes>, ProtocolError> {
    match buf.iter().position(|&b| b == b'\n') {
        Some(pos) => {
            if pos > max_len {
                return Err(ProtocolError::LineTooLong(pos));
            }
            let mut line = buf.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            Ok(Some(line.freeze()))
        }
        None if buf.len() > max_len => Err(ProtocolError::LineTooLong(buf.len())),
        None => Ok(None),
    }
}

/// Decode a request line received by the server
pub fn decode_request(line: &[u8]) -> Result<ClientRequest, ProtocolError> {
    decode_tagged(line, ClientRequest::TYPES)
}

/// Decode a line received by the client
pub fn decode_server_message(line: &[u8]) -> Result<ServerMessage, ProtocolError> {
    decode_tagged(line, ServerMessage::TYPES)
}

fn decode_tagged<T: DeserializeOwned>(line: &[u8], known: &[&str]) -> Result<T, ProtocolError> {
    let mut value: Value =
        serde_json::from_slice(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;
    if !known.contains(&kind) {
        return Err(ProtocolError::UnknownMessageType(kind.to_string()));
    }

    // A missing payload decodes like an empty object
    if let Some(object) = value.as_object_mut() {
        object
            .entry("payload")
            .or_insert_with(|| Value::Object(Default::default()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
}
