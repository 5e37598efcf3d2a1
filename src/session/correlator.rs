//! Synchronous command/response correlation.
//!
//! Every synchronous exchange in the protocol is "send one method, the very
//! next method must be one of these kinds". [`Dispatcher::request`] is that
//! pattern; the session's sub-protocols differ only in what they send and
//! what they accept.

use std::fmt;

use serde::Serialize;

use crate::codec::{Method, MethodKind};
use crate::error::{BurrowError, Result};

use super::channel::ChannelId;
use super::dispatcher::Dispatcher;

/// Caller-facing acknowledgment of a synchronous request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// basic.qos-ok
    QosOk,
    /// tx.select-ok
    SelectOk,
    /// tx.commit-ok
    CommitOk,
    /// tx.rollback-ok
    RollbackOk,
    /// channel.close-ok / connection.close-ok
    CloseOk,
}

impl Confirmation {
    /// Symbolic name, e.g. `qos_ok`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QosOk => "qos_ok",
            Self::SelectOk => "select_ok",
            Self::CommitOk => "commit_ok",
            Self::RollbackOk => "rollback_ok",
            Self::CloseOk => "close_ok",
        }
    }
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn describe(expected: &[MethodKind]) -> String {
    expected
        .iter()
        .map(|k| k.name())
        .collect::<Vec<_>>()
        .join(" or ")
}

fn describe_reply(reply: &Method) -> String {
    match reply {
        Method::ConnectionClose {
            reply_code,
            reply_text,
            ..
        }
        | Method::ChannelClose {
            reply_code,
            reply_text,
            ..
        } => format!("{} ({reply_code} {reply_text})", reply.kind()),
        Method::Unknown {
            class_id,
            method_id,
            ..
        } => format!("unknown method {class_id}/{method_id}"),
        other => other.kind().to_string(),
    }
}

impl Dispatcher {
    /// Send `method` on `channel` and require the next method to be one of
    /// `expected`.
    ///
    /// `context` prefixes the error text on mismatch or missing reply.
    pub async fn request(
        &mut self,
        method: Method,
        channel: ChannelId,
        ticket: Option<u16>,
        expected: &[MethodKind],
        context: &str,
    ) -> Result<Method> {
        self.send_method(method, channel, ticket).await?;

        match self.next_method().await? {
            Some(reply) if expected.contains(&reply.kind()) => Ok(reply),
            Some(reply) => Err(BurrowError::Protocol(format!(
                "{context}: expected {}, got {}",
                describe(expected),
                describe_reply(&reply)
            ))),
            None => Err(BurrowError::Protocol(format!(
                "{context}: expected {}, got no response",
                describe(expected)
            ))),
        }
    }

    /// [`request`](Self::request) with a single accepted kind, mapped to a
    /// [`Confirmation`].
    pub async fn confirm(
        &mut self,
        method: Method,
        channel: ChannelId,
        ticket: Option<u16>,
        expected: MethodKind,
        confirmation: Confirmation,
        context: &str,
    ) -> Result<Confirmation> {
        self.request(method, channel, ticket, &[expected], context)
            .await
            .map(|_| confirmation)
    }
}
