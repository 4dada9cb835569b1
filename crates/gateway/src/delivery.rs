//! Outbound delivery.
//!
//! The core only needs two things from a chat transport: send text to a user
//! and replace text it sent earlier. Patient replies are shown after a short
//! "typing" pause proportional to their length; the pause happens here, after
//! the session operation has finished and released the user's lock.

use std::io::Write;

use async_trait::async_trait;
use pt_domain::config::DialogConfig;

use crate::dispatch::{Reply, ReplyKind};

/// Transport-specific id of a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u64);

pub const TYPING_PLACEHOLDER: &str = "typing…";

#[async_trait]
pub trait Outbox: Send + Sync {
    async fn send(&self, user_id: &str, text: &str) -> anyhow::Result<MessageId>;

    async fn edit(&self, user_id: &str, message: MessageId, text: &str) -> anyhow::Result<()>;
}

/// Deliver a reply. Patient lines get a typing placeholder that is replaced
/// with the reply once the delay has passed.
pub async fn deliver(
    outbox: &dyn Outbox,
    user_id: &str,
    reply: &Reply,
    dialog: &DialogConfig,
) -> anyhow::Result<MessageId> {
    let delay = match reply.kind {
        ReplyKind::Patient => dialog.typing_delay(reply.text.chars().count()),
        _ => std::time::Duration::ZERO,
    };
    if delay.is_zero() {
        return outbox.send(user_id, &reply.text).await;
    }

    let id = outbox.send(user_id, TYPING_PLACEHOLDER).await?;
    tokio::time::sleep(delay).await;
    outbox.edit(user_id, id, &reply.text).await?;
    Ok(id)
}

// ── Console ────────────────────────────────────────────────────────

/// Prints to the terminal. Only the most recent message can be edited,
/// which is all the typing placeholder needs.
#[derive(Debug, Default)]
pub struct ConsoleOutbox {
    last: parking_lot::Mutex<u64>,
}

impl ConsoleOutbox {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Outbox for ConsoleOutbox {
    async fn send(&self, _user_id: &str, text: &str) -> anyhow::Result<MessageId> {
        let mut last = self.last.lock();
        *last += 1;
        if text == TYPING_PLACEHOLDER {
            println!("\x1B[2m{text}\x1B[0m");
        } else {
            println!("{text}\n");
        }
        std::io::stdout().flush()?;
        Ok(MessageId(*last))
    }

    async fn edit(&self, _user_id: &str, message: MessageId, text: &str) -> anyhow::Result<()> {
        if *self.last.lock() != message.0 {
            anyhow::bail!("console can only edit the last message");
        }
        // Up one line, clear it, print the replacement.
        println!("\x1B[1A\x1B[2K{text}\n");
        std::io::stdout().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        log: Mutex<Vec<(String, MessageId, String)>>,
    }

    #[async_trait]
    impl Outbox for Recording {
        async fn send(&self, user_id: &str, text: &str) -> anyhow::Result<MessageId> {
            let mut log = self.log.lock();
            let id = MessageId(log.len() as u64 + 1);
            log.push(("send".into(), id, format!("{user_id}:{text}")));
            Ok(id)
        }

        async fn edit(&self, user_id: &str, message: MessageId, text: &str) -> anyhow::Result<()> {
            self.log
                .lock()
                .push(("edit".into(), message, format!("{user_id}:{text}")));
            Ok(())
        }
    }

    fn fast_dialog() -> DialogConfig {
        DialogConfig {
            typing_ms_per_char: 1,
            typing_cap_ms: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn patient_reply_replaces_typing_placeholder() {
        let outbox = Recording::default();
        let reply = Reply {
            kind: ReplyKind::Patient,
            text: "I guess so.".into(),
        };
        let id = deliver(&outbox, "u1", &reply, &fast_dialog()).await.unwrap();

        let log = outbox.log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], ("send".into(), id, format!("u1:{TYPING_PLACEHOLDER}")));
        assert_eq!(log[1], ("edit".into(), id, "u1:I guess so.".into()));
    }

    #[tokio::test]
    async fn notices_are_sent_directly() {
        let outbox = Recording::default();
        let reply = Reply::notice("Session ended.");
        deliver(&outbox, "u1", &reply, &fast_dialog()).await.unwrap();
        let log = outbox.log.lock();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].2, "u1:Session ended.");
    }

    #[tokio::test]
    async fn zero_typing_speed_skips_placeholder() {
        let outbox = Recording::default();
        let reply = Reply {
            kind: ReplyKind::Patient,
            text: "Hi.".into(),
        };
        let dialog = DialogConfig {
            typing_ms_per_char: 0,
            ..Default::default()
        };
        deliver(&outbox, "u1", &reply, &dialog).await.unwrap();
        assert_eq!(outbox.log.lock().len(), 1);
    }
}
