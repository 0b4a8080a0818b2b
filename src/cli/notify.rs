//! Delivery of the outcome: a chat or the terminal

use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use serde_json::json;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::load::config::TelegramConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request to the bot API failed")]
    Http(#[from] reqwest::Error),
    #[error("{method} rejected with status {status}: {description}")]
    Rejected {
        method: &'static str,
        status: u16,
        description: String,
    },
    #[error("could not write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Somewhere to send text and files
pub trait Notifier {
    fn message(&mut self, chat: i64, text: &str) -> Result<(), NotifyError>;
    fn document(&mut self, chat: i64, name: &str, contents: &[u8]) -> Result<(), NotifyError>;
}

impl<N: Notifier + ?Sized> Notifier for &mut N {
    fn message(&mut self, chat: i64, text: &str) -> Result<(), NotifyError> {
        (**self).message(chat, text)
    }

    fn document(&mut self, chat: i64, name: &str, contents: &[u8]) -> Result<(), NotifyError> {
        (**self).document(chat, name, contents)
    }
}

/// Send every piece in order, stopping at the first failure
pub fn publish<N: Notifier + ?Sized>(
    notifier: &mut N,
    chat: i64,
    messages: &[String],
    files: &[(&str, String)],
) -> Result<(), NotifyError> {
    for text in messages {
        notifier.message(chat, text)?;
    }
    for (name, contents) in files {
        notifier.document(chat, name, contents.as_bytes())?;
    }
    info!(chat, messages = messages.len(), files = files.len(), "report delivered");
    Ok(())
}

/// Bot API answer envelope
#[derive(Debug, Deserialize)]
struct Answer {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct Telegram {
    client: Client,
    base: String,
}

impl Telegram {
    pub fn new(config: &TelegramConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base: format!("{}/bot{}", config.api_url.trim_end_matches('/'), config.token),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }

    fn check(method: &'static str, response: reqwest::blocking::Response) -> Result<(), NotifyError> {
        let status = response.status();
        let answer = response.json::<Answer>().ok();
        match answer {
            Some(Answer { ok: true, .. }) if status.is_success() => Ok(()),
            other => Err(NotifyError::Rejected {
                method,
                status: status.as_u16(),
                description: other
                    .and_then(|a| a.description)
                    .unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }
}

impl Notifier for Telegram {
    fn message(&mut self, chat: i64, text: &str) -> Result<(), NotifyError> {
        debug!(chat, len = text.len(), "sendMessage");
        let response = self
            .client
            .post(self.url("sendMessage"))
            .json(&json!({ "chat_id": chat, "text": text }))
            .send()?;
        Self::check("sendMessage", response)
    }

    fn document(&mut self, chat: i64, name: &str, contents: &[u8]) -> Result<(), NotifyError> {
        debug!(chat, name, size = contents.len(), "sendDocument");
        let part = multipart::Part::bytes(contents.to_vec())
            .file_name(name.to_string())
            .mime_str("text/csv")?;
        let form = multipart::Form::new()
            .text("chat_id", chat.to_string())
            .part("document", part);
        let response = self
            .client
            .post(self.url("sendDocument"))
            .multipart(form)
            .send()?;
        Self::check("sendDocument", response)
    }
}

/// Prints messages, writes documents to `out_dir` when there is one
#[derive(Debug, Default)]
pub struct Console {
    out_dir: Option<PathBuf>,
}

impl Console {
    pub fn new(out_dir: Option<&Path>) -> Self {
        Self {
            out_dir: out_dir.map(Path::to_path_buf),
        }
    }
}

impl Notifier for Console {
    fn message(&mut self, _chat: i64, text: &str) -> Result<(), NotifyError> {
        println!("{}", text);
        Ok(())
    }

    fn document(&mut self, _chat: i64, name: &str, contents: &[u8]) -> Result<(), NotifyError> {
        match &self.out_dir {
            Some(dir) => {
                let path = dir.join(name);
                fs::write(&path, contents).map_err(|source| NotifyError::Io {
                    path: path.clone(),
                    source,
                })?;
                info!(path = %path.display(), "export written");
            }
            None => println!("{} ({} bytes)", name, contents.len()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct Outbox {
        sent: Vec<String>,
        fail_on_document: bool,
    }

    impl Notifier for Outbox {
        fn message(&mut self, chat: i64, text: &str) -> Result<(), NotifyError> {
            self.sent.push(format!("{} msg {}", chat, text));
            Ok(())
        }

        fn document(&mut self, chat: i64, name: &str, contents: &[u8]) -> Result<(), NotifyError> {
            if self.fail_on_document {
                return Err(NotifyError::Rejected {
                    method: "sendDocument",
                    status: 400,
                    description: "Bad Request".to_string(),
                });
            }
            self.sent.push(format!("{} doc {} {}", chat, name, contents.len()));
            Ok(())
        }
    }

    #[test]
    fn order_is_kept() {
        let mut outbox = Outbox::default();
        publish(
            &mut outbox,
            9,
            &["hello, @oleksm".to_string(), "summary".to_string()],
            &[("donations.csv", "a;b\n".to_string()), ("slots.csv", String::new())],
        )
        .unwrap();
        assert_eq!(
            outbox.sent,
            vec![
                "9 msg hello, @oleksm",
                "9 msg summary",
                "9 doc donations.csv 4",
                "9 doc slots.csv 0",
            ]
        );
    }

    #[test]
    fn failure_stops_delivery() {
        let mut outbox = Outbox {
            fail_on_document: true,
            ..Outbox::default()
        };
        let res = publish(
            &mut outbox,
            1,
            &["text".to_string()],
            &[("donations.csv", "x".to_string())],
        );
        assert!(matches!(res, Err(NotifyError::Rejected { status: 400, .. })));
        assert_eq!(outbox.sent.len(), 1);
    }

    #[test]
    fn console_writes_files() {
        let dir = std::env::temp_dir().join(format!("jarraffle-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let mut console = Console::new(Some(&dir));
        console.document(0, "slots.csv", b"slot;entry\n").unwrap();
        assert_eq!(fs::read_to_string(dir.join("slots.csv")).unwrap(), "slot;entry\n");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn bot_urls() {
        let config = TelegramConfig {
            token: "123:abc".to_string(),
            api_url: "https://api.telegram.org/".to_string(),
            ..TelegramConfig::default()
        };
        let bot = Telegram::new(&config).unwrap();
        assert_eq!(bot.url("sendMessage"), "https://api.telegram.org/bot123:abc/sendMessage");
    }
}
