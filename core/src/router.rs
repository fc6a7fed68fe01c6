//! Discriminator-based dispatch of inbound messages.
//!
//! Each message family is a tagged enum implementing [`Action`]. A context
//! registers one [`Handler`] per family whose `handle` matches exhaustively
//! on the enum, so every known action has exactly one answer. The router
//! awaits the handler before the reply channel is used.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::Reply;

pub trait Action: Serialize + DeserializeOwned {
    /// Every discriminator value the enum accepts
    const ACTIONS: &'static [&'static str];

    fn name(&self) -> &'static str;
}

/// Decode a raw `{action, ...}` object, telling unknown actions apart from
/// malformed bodies of known ones
pub fn decode<A: Action>(raw: &Value) -> Result<A> {
    let name = raw
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Malformed("missing action".to_string()))?;

    if !A::ACTIONS.contains(&name) {
        return Err(Error::UnknownAction(name.to_string()));
    }

    serde_json::from_value(raw.clone()).map_err(|e| Error::Malformed(format!("{}: {}", name, e)))
}

/// Who sent a message, as reported by the browser
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageSender {
    pub tab_id: Option<i32>,
}

impl MessageSender {
    pub fn tab(tab_id: i32) -> Self {
        Self {
            tab_id: Some(tab_id),
        }
    }
}

#[async_trait(?Send)]
pub trait Handler<A: Action> {
    async fn handle(&self, action: A, sender: MessageSender) -> Reply;
}

/// Single-use reply path back to the caller
pub trait ReplyChannel {
    fn reply(self, reply: Reply);
}

impl<F: FnOnce(Reply)> ReplyChannel for F {
    fn reply(self, reply: Reply) {
        self(reply)
    }
}

/// Decode and answer one message; decode failures become error replies
pub async fn route<A, H>(handler: &H, raw: &Value, sender: MessageSender) -> Reply
where
    A: Action,
    H: Handler<A> + ?Sized,
{
    match decode::<A>(raw) {
        Ok(action) => {
            log::debug!("Routing {} from {:?}", action.name(), sender.tab_id);
            handler.handle(action, sender).await
        }
        Err(e) => {
            log::warn!("Rejecting message: {}", e);
            Reply::error(e)
        }
    }
}

/// Route a message and only then hand the reply to the channel
pub async fn serve<A, H, C>(handler: &H, raw: &Value, sender: MessageSender, channel: C)
where
    A: Action,
    H: Handler<A> + ?Sized,
    C: ReplyChannel,
{
    let reply = route::<A, H>(handler, raw, sender).await;
    channel.reply(reply);
}
