//! Mailbox message bus
//!
//! One FIFO mailbox per registered agent id. Direct messages to an
//! unregistered id bounce back to the sender as a synthesized system
//! notice; broadcasts fan out to every registered mailbox except the
//! sender's. Delivery is at-most-once, FIFO per sender/receiver pair.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::protocol::{AgentId, Message, Recipient, Sender};

/// Global history capacity; oldest entries are evicted first.
const HISTORY_CAP: usize = 1000;

struct Mailbox {
    queue: Mutex<VecDeque<Message>>,
    notify: Notify,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    fn push(&self, message: Message) {
        self.queue.lock().push_back(message);
        self.notify.notify_one();
    }
}

/// Routes point-to-point and broadcast messages between agents.
pub struct MessageBus {
    mailboxes: RwLock<HashMap<AgentId, Arc<Mailbox>>>,
    history: Mutex<VecDeque<Message>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            mailboxes: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Create a mailbox for an agent. Idempotent.
    pub fn register(&self, id: &AgentId) {
        self.mailboxes
            .write()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mailbox::new()));
    }

    /// Destroy an agent's mailbox, returning any undelivered messages.
    /// Wakes anything blocked on [`MessageBus::wait_any`] for this id.
    pub fn unregister(&self, id: &AgentId) -> Vec<Message> {
        match self.mailboxes.write().remove(id) {
            Some(mailbox) => {
                let drained = mailbox.queue.lock().drain(..).collect();
                mailbox.notify.notify_waiters();
                drained
            }
            None => Vec::new(),
        }
    }

    pub fn is_registered(&self, id: &AgentId) -> bool {
        self.mailboxes.read().contains_key(id)
    }

    /// Route a message.
    ///
    /// Broadcasts are enqueued for every registered agent except the
    /// sender. A direct message to an unregistered id is not delivered
    /// and not recorded; instead a system failure notice goes back to the
    /// sender, if the sender itself is still registered.
    pub fn publish(&self, message: Message) {
        match &message.to {
            Recipient::Broadcast => {
                self.record(message.clone());
                let mailboxes = self.mailboxes.read();
                for (id, mailbox) in mailboxes.iter() {
                    if let Sender::Agent(from) = &message.from {
                        if from == id {
                            continue;
                        }
                    }
                    mailbox.push(message.clone());
                }
            }
            Recipient::Agent(target) => {
                let delivered = {
                    let mailboxes = self.mailboxes.read();
                    match mailboxes.get(target) {
                        Some(mailbox) => {
                            mailbox.push(message.clone());
                            true
                        }
                        None => false,
                    }
                };

                if delivered {
                    self.record(message);
                } else if let Sender::Agent(from) = &message.from {
                    warn!(from = %from, to = %target, "Delivery failed: target not registered");
                    let mut snippet: String = message.content.chars().take(100).collect();
                    if snippet.len() < message.content.len() {
                        snippet.push_str("...");
                    }
                    let notice = Message::system(
                        from.clone(),
                        format!(
                            "DELIVERY FAILED: Agent {target} is not active. \
                             Your message was not delivered: {snippet}"
                        ),
                    );
                    // Failure notices bypass the global history.
                    let mailboxes = self.mailboxes.read();
                    if let Some(mailbox) = mailboxes.get(from) {
                        mailbox.push(notice);
                    }
                }
            }
        }
    }

    /// Take every currently queued message for an agent, non-blocking.
    pub fn drain(&self, id: &AgentId) -> Vec<Message> {
        let mailbox = match self.mailboxes.read().get(id) {
            Some(m) => Arc::clone(m),
            None => return Vec::new(),
        };
        let messages: Vec<Message> = mailbox.queue.lock().drain(..).collect();
        if !messages.is_empty() {
            debug!(agent_id = %id, count = messages.len(), "Drained mailbox");
        }
        messages
    }

    /// Block until the agent's mailbox holds at least one message.
    ///
    /// Returns immediately if the id is not (or no longer) registered.
    /// Each mailbox has a single consumer, so a check-then-wait with the
    /// notify permit is race-free.
    pub async fn wait_any(&self, id: &AgentId) {
        loop {
            let mailbox = match self.mailboxes.read().get(id) {
                Some(m) => Arc::clone(m),
                None => return,
            };
            let notified = mailbox.notify.notified();
            if !mailbox.queue.lock().is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Most recent `limit` entries of the global history.
    pub fn history(&self, limit: usize) -> Vec<Message> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    fn record(&self, message: Message) {
        let mut history = self.history.lock();
        history.push_back(message);
        if history.len() > HISTORY_CAP {
            history.pop_front();
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
