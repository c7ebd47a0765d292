//! Mailbox router: named, bounded, multiple-producer single-consumer queues.
//!
//! Senders block for a bounded time when a mailbox is full and get a typed
//! error back; messages are never silently dropped. Receiving is a
//! non-blocking drain during agent steps, with a deadline-bound variant for
//! request/reply conversations.

use super::AclMessage;
use crate::domain_types::{AgentName, MailboxCapacity};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError};
use uuid::Uuid;

/// Send-side errors. Back-pressure surfaces here, never as a dropped message.
#[derive(Debug, Error)]
pub enum SendError {
    /// No mailbox is registered under the receiver name.
    #[error("unknown receiver: {0}")]
    UnknownReceiver(AgentName),

    /// The mailbox stayed full for the whole send timeout.
    #[error("mailbox {0} still full after {1:?}")]
    MailboxFull(AgentName, Duration),

    /// The receiving half was dropped.
    #[error("mailbox {0} is closed")]
    Closed(AgentName),
}

/// Receive-side errors for request/reply conversations.
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// The correlated reply did not arrive within the deadline.
    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),

    /// Every sender was dropped.
    #[error("mailbox closed")]
    Closed,
}

/// Routes messages to registered mailboxes by agent name.
#[derive(Debug)]
pub struct MailboxRouter {
    senders: DashMap<AgentName, mpsc::Sender<AclMessage>>,
    send_timeout: Duration,
}

impl MailboxRouter {
    /// Builds a router with the given default send timeout.
    #[must_use]
    pub fn new(send_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            senders: DashMap::new(),
            send_timeout,
        })
    }

    /// Registers a named mailbox and hands back its receiving half.
    /// Re-registering a name replaces the previous mailbox.
    pub fn register(&self, name: AgentName, capacity: MailboxCapacity) -> Mailbox {
        let (tx, rx) = mpsc::channel(capacity.as_usize());
        self.senders.insert(name.clone(), tx);
        Mailbox {
            name,
            receiver: rx,
            stash: VecDeque::new(),
        }
    }

    /// True when a mailbox is registered under `name`.
    #[must_use]
    pub fn is_registered(&self, name: &AgentName) -> bool {
        self.senders.contains_key(name)
    }

    /// Sends with the router's default timeout.
    pub async fn send(&self, message: AclMessage) -> Result<(), SendError> {
        self.send_with_timeout(message, self.send_timeout).await
    }

    /// Sends, blocking up to `timeout` when the mailbox is full.
    pub async fn send_with_timeout(
        &self,
        message: AclMessage,
        timeout: Duration,
    ) -> Result<(), SendError> {
        let receiver = message.receiver.clone();
        let sender = self
            .senders
            .get(&receiver)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SendError::UnknownReceiver(receiver.clone()))?;

        match sender.send_timeout(message, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(SendError::MailboxFull(receiver, timeout)),
            Err(SendTimeoutError::Closed(_)) => Err(SendError::Closed(receiver)),
        }
    }
}

/// The receiving half of one agent's mailbox.
///
/// `await_reply` stashes non-matching messages instead of dropping them, so a
/// later `drain` still observes every delivery in order.
#[derive(Debug)]
pub struct Mailbox {
    name: AgentName,
    receiver: mpsc::Receiver<AclMessage>,
    stash: VecDeque<AclMessage>,
}

impl Mailbox {
    /// The owner's registered name.
    #[must_use]
    pub fn name(&self) -> &AgentName {
        &self.name
    }

    /// Non-blocking drain of everything currently queued.
    pub fn drain(&mut self) -> Vec<AclMessage> {
        let mut out: Vec<AclMessage> = self.stash.drain(..).collect();
        loop {
            match self.receiver.try_recv() {
                Ok(message) => out.push(message),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    /// Blocking receive with a deadline. Returns `None` on timeout.
    pub async fn recv_timeout(&mut self, deadline: Duration) -> Option<AclMessage> {
        if let Some(message) = self.stash.pop_front() {
            return Some(message);
        }
        tokio::time::timeout(deadline, self.receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// Waits for the reply correlated to `reply_id`, stashing any unrelated
    /// messages that arrive first.
    pub async fn await_reply(
        &mut self,
        reply_id: Uuid,
        deadline: Duration,
    ) -> Result<AclMessage, ReceiveError> {
        // Check the stash first: the reply may already have been set aside.
        if let Some(pos) = self
            .stash
            .iter()
            .position(|m| m.in_reply_to == Some(reply_id))
        {
            if let Some(found) = self.stash.remove(pos) {
                return Ok(found);
            }
        }

        let wait_until = tokio::time::Instant::now() + deadline;
        loop {
            let remaining = wait_until.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(ReceiveError::ReplyTimeout(deadline));
            }
            match tokio::time::timeout(remaining, self.receiver.recv()).await {
                Err(_) => return Err(ReceiveError::ReplyTimeout(deadline)),
                Ok(None) => return Err(ReceiveError::Closed),
                Ok(Some(message)) => {
                    if message.in_reply_to == Some(reply_id) {
                        return Ok(message);
                    }
                    self.stash.push_back(message);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{MessageContent, Performative, names};

    fn capacity(n: usize) -> MailboxCapacity {
        MailboxCapacity::try_new(n).unwrap()
    }

    fn ping(receiver: AgentName) -> AclMessage {
        AclMessage::inform(names::system(), receiver, MessageContent::Ack)
    }

    #[tokio::test]
    async fn unknown_receiver_is_an_error() {
        let router = MailboxRouter::new(Duration::from_millis(100));
        let result = router.send(ping(names::hazard_agent())).await;
        assert!(matches!(result, Err(SendError::UnknownReceiver(_))));
    }

    #[tokio::test]
    async fn full_mailbox_blocks_then_fails() {
        let router = MailboxRouter::new(Duration::from_millis(20));
        let _mailbox = router.register(names::hazard_agent(), capacity(1));

        router.send(ping(names::hazard_agent())).await.unwrap();
        let result = router.send(ping(names::hazard_agent())).await;
        assert!(matches!(result, Err(SendError::MailboxFull(_, _))));
    }

    #[tokio::test]
    async fn drain_preserves_fifo_order() {
        let router = MailboxRouter::new(Duration::from_millis(100));
        let mut mailbox = router.register(names::hazard_agent(), capacity(16));

        for _ in 0..3 {
            router.send(ping(names::hazard_agent())).await.unwrap();
        }
        let drained = mailbox.drain();
        assert_eq!(drained.len(), 3);
        assert!(mailbox.drain().is_empty());
    }

    #[tokio::test]
    async fn await_reply_stashes_unrelated_messages() {
        let router = MailboxRouter::new(Duration::from_millis(100));
        let mut requester = router.register(names::evacuation_manager(), capacity(16));
        let reply_id = Uuid::new_v4();

        // Unrelated chatter first, then the correlated reply.
        router
            .send(ping(names::evacuation_manager()))
            .await
            .unwrap();
        let mut reply = ping(names::evacuation_manager());
        reply.performative = Performative::Inform;
        reply.in_reply_to = Some(reply_id);
        router.send(reply).await.unwrap();

        let found = requester
            .await_reply(reply_id, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(found.in_reply_to, Some(reply_id));

        // The unrelated message survived in arrival order.
        assert_eq!(requester.drain().len(), 1);
    }

    #[tokio::test]
    async fn await_reply_times_out() {
        let router = MailboxRouter::new(Duration::from_millis(100));
        let mut requester = router.register(names::evacuation_manager(), capacity(16));
        let result = requester
            .await_reply(Uuid::new_v4(), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ReceiveError::ReplyTimeout(_))));
    }
}
