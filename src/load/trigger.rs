//! Inbound chat messages that ask for a draw
//!
//! Accepts either a bare Telegram `Update` or the webhook envelope
//! `{"body": "<update as a string>"}` that HTTP gateways hand over.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Envelope {
    body: String,
}

#[derive(Debug, Deserialize)]
struct Update {
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

/// Who asked, and where to answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub chat_id: i64,
    pub username: String,
    pub text: String,
}

/// `None` for updates that are not messages, or that come from anonymous chats
pub fn parse(raw: &str) -> Result<Option<Trigger>, serde_json::Error> {
    let update = match serde_json::from_str::<Envelope>(raw) {
        Ok(envelope) => serde_json::from_str::<Update>(&envelope.body.replace('\n', ""))?,
        Err(_) => serde_json::from_str::<Update>(raw)?,
    };
    Ok(update.message.and_then(|message| {
        let username = message.chat.username?;
        Some(Trigger {
            chat_id: message.chat.id,
            username,
            text: message.text,
        })
    }))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bare_update() {
        let raw = r#"{"update_id": 1, "message": {"message_id": 5, "chat": {"id": 42, "username": "oleksm", "type": "private"}, "text": "/draw"}}"#;
        assert_eq!(
            parse(raw).unwrap(),
            Some(Trigger {
                chat_id: 42,
                username: "oleksm".to_string(),
                text: "/draw".to_string(),
            })
        );
    }

    #[test]
    fn webhook_envelope() {
        let raw = r#"{"body": "{\"message\": {\"chat\": {\"id\": 7,\n \"username\": \"ivan\"}, \"text\": \"hi\"}}"}"#;
        let trigger = parse(raw).unwrap().unwrap();
        assert_eq!(trigger.chat_id, 7);
        assert_eq!(trigger.username, "ivan");
    }

    #[test]
    fn not_a_message() {
        assert_eq!(parse(r#"{"update_id": 1, "edited_message": {}}"#).unwrap(), None);
        assert_eq!(parse(r#"{"message": {"chat": {"id": 1}}}"#).unwrap(), None);
        assert!(parse("not json").is_err());
    }
}
