//! JSON envelope shared by every frame on an upgraded link.
//!
//! Both directions carry the same two-field object `{name, data}`. The `data`
//! member stays a raw JSON slice so the core never has to know the payload
//! schema of the games built on top of it.

use std::sync::Arc;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::value::RawValue;

use crate::{error::Error, state::Player};

/// Server-to-client message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event name; reserved names start with `cg_`.
    pub name: String,
    /// Opaque JSON payload.
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

/// Client-to-server message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Command name chosen by the game author.
    pub name: String,
    /// Opaque JSON payload.
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

/// A decoded command paired with the player whose socket produced it.
#[derive(Clone)]
pub struct CommandWrapper {
    pub player: Arc<Player>,
    pub command: Command,
}

impl Event {
    /// Build an event with `data` encoded from `payload`.
    pub fn new<T: Serialize + ?Sized>(name: impl Into<String>, payload: &T) -> Result<Self, Error> {
        let data = serde_json::value::to_raw_value(payload).map_err(Error::EncodeFailed)?;
        Ok(Self {
            name: name.into(),
            data: Some(data),
        })
    }

    /// Encode the whole envelope into one text frame.
    pub fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Error::EncodeFailed)
    }

    /// Decode the `data` member into a typed payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, Error> {
        decode_payload(self.data.as_deref())
    }
}

impl Command {
    /// Decode one inbound text frame.
    ///
    /// Fails when the frame is not a JSON object or the `name` member is empty.
    pub fn decode(frame: &str) -> Result<Self, Error> {
        let command: Command =
            serde_json::from_str(frame).map_err(|err| Error::DecodeFailed(Some(err)))?;
        if command.name.is_empty() {
            return Err(Error::DecodeFailed(None));
        }
        Ok(command)
    }

    /// Decode the `data` member into a typed payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, Error> {
        decode_payload(self.data.as_deref())
    }
}

fn decode_payload<T: DeserializeOwned>(data: Option<&RawValue>) -> Result<T, Error> {
    let raw = data.map(RawValue::get).unwrap_or("null");
    serde_json::from_str(raw).map_err(|err| Error::DecodeFailed(Some(err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Move {
        x: i32,
        y: i32,
    }

    #[test]
    fn event_round_trips_name_and_data() {
        let event = Event::new("move_made", &Move { x: 3, y: -1 }).unwrap();
        let frame = event.encode().unwrap();

        let decoded: Event = serde_json::from_str(&frame).unwrap();
        assert_eq!(decoded.name, "move_made");
        assert_eq!(
            decoded.data.as_deref().map(RawValue::get),
            event.data.as_deref().map(RawValue::get)
        );
        assert_eq!(decoded.payload::<Move>().unwrap(), Move { x: 3, y: -1 });
    }

    #[test]
    fn command_decode_accepts_payload_free_frames() {
        let command = Command::decode(r#"{"name":"end_turn"}"#).unwrap();
        assert_eq!(command.name, "end_turn");
        assert!(command.data.is_none());
    }

    #[test]
    fn command_decode_rejects_invalid_json() {
        assert!(matches!(
            Command::decode("not json"),
            Err(Error::DecodeFailed(_))
        ));
    }

    #[test]
    fn command_decode_rejects_non_objects() {
        assert!(matches!(
            Command::decode(r#""move""#),
            Err(Error::DecodeFailed(_))
        ));
        assert!(matches!(
            Command::decode(r#"[1,2,3]"#),
            Err(Error::DecodeFailed(_))
        ));
    }

    #[test]
    fn command_decode_rejects_empty_names() {
        assert!(matches!(
            Command::decode(r#"{"name":"","data":{}}"#),
            Err(Error::DecodeFailed(None))
        ));
    }

    #[test]
    fn payload_preserves_raw_bytes() {
        let command = Command::decode(r#"{"name":"guess","data":{"word":"crane"}}"#).unwrap();
        assert_eq!(command.data.as_deref().unwrap().get(), r#"{"word":"crane"}"#);
    }
}
