use serde_json::Value;

use crate::types::Direction;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedClientMessage {
    Join { room: String, player_name: String },
    Start { room: String },
    Restart { room: String },
    Ready { room: String },
    Move { direction: Direction },
    Rotate,
    HardDrop,
}

/// Parses one inbound `{"event": ..., "data": {...}}` frame. Both wire
/// vocabularies are accepted: the dedicated `movePiece`/`rotatePiece`/
/// `hardDrop` events and the generic `gameAction` with a `type` field.
/// Anything malformed or unknown yields `None`.
pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let event = object.get("event")?.as_str()?;
    let empty = Value::Object(serde_json::Map::new());
    let data = object.get("data").unwrap_or(&empty);
    let data = data.as_object()?;

    match event {
        "joinGame" => {
            let room = data.get("room")?.as_str()?.to_string();
            let player_name = data.get("playerName")?.as_str()?.to_string();
            Some(ParsedClientMessage::Join { room, player_name })
        }
        "startGame" => {
            let room = data.get("room")?.as_str()?.to_string();
            Some(ParsedClientMessage::Start { room })
        }
        "restartGame" => {
            let room = data.get("room")?.as_str()?.to_string();
            Some(ParsedClientMessage::Restart { room })
        }
        "playerReady" => {
            let room = data.get("room")?.as_str()?.to_string();
            Some(ParsedClientMessage::Ready { room })
        }
        "movePiece" => {
            let direction = Direction::parse(data.get("direction")?.as_str()?)?;
            Some(ParsedClientMessage::Move { direction })
        }
        "rotatePiece" => Some(ParsedClientMessage::Rotate),
        "hardDrop" => Some(ParsedClientMessage::HardDrop),
        "gameAction" => match data.get("type")?.as_str()? {
            "move" => {
                let direction = Direction::parse(data.get("direction")?.as_str()?)?;
                Some(ParsedClientMessage::Move { direction })
            }
            "rotate" => Some(ParsedClientMessage::Rotate),
            "hardDrop" => Some(ParsedClientMessage::HardDrop),
            _ => None,
        },
        _ => None,
    }
}
