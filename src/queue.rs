use crate::error::{fatal, Result};
use crate::registry::InboxSink;
use crate::world::{World, WorldState};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tracing::trace;

/// One delivered message: the tag and content pair a sender passed to
/// [`QueueImage::send`].
#[derive(Debug, Clone, PartialEq)]
pub struct Message<Tag, Content> {
    pub tag: Tag,
    pub content: Content,
}

/// The local inbox behind a queue, shared between the queue handle and the
/// registration table. Only the superstep driver appends, only user code
/// between syncs reads.
struct Inbox<Tag, Content> {
    messages: Mutex<Vec<Message<Tag, Content>>>,
}

impl<Tag, Content> InboxSink for Inbox<Tag, Content>
where
    Tag: DeserializeOwned + Send + Sync + 'static,
    Content: DeserializeOwned + Send + Sync + 'static,
{
    fn clear(&self) {
        self.messages.lock().clear();
    }

    fn append(&self, tag: &[u8], content: &[u8]) -> anyhow::Result<()> {
        let message = Message {
            tag: crate::deserialize(tag)?,
            content: crate::deserialize(content)?,
        };
        self.messages.lock().push(message);
        Ok(())
    }
}

/// A typed, tagged mailbox with an image on every processor.
///
/// Construction is **collective**, like a registered variable's: every
/// processor constructs its queues in the same program order and observes
/// the same queue id. Senders append to a remote inbox through
/// [`image`](Queue::image); the messages are delivered by the next
/// [`sync`](crate::World::sync) and stay readable until the following one,
/// which clears the inbox before refilling it.
///
/// Messages from one sender arrive in the order they were sent; the
/// interleaving between senders is unspecified.
pub struct Queue<Tag, Content>
where
    Tag: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    Content: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    inbox: Arc<Inbox<Tag, Content>>,
    id: i32,
    world: Weak<WorldState>,
}

impl<Tag, Content> Queue<Tag, Content>
where
    Tag: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    Content: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Register a fresh queue. Collective.
    pub fn new(world: &World) -> Queue<Tag, Content> {
        let inbox = Arc::new(Inbox {
            messages: Mutex::new(Vec::new()),
        });
        let id = world.state().register_queue(inbox.clone());
        Queue {
            inbox,
            id,
            world: Arc::downgrade(world.state()),
        }
    }

    /// The collectively assigned queue id: the same integer on every
    /// processor.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// A selector for this queue's inbox on processor `t`.
    pub fn image(&self, t: usize) -> Result<QueueImage<'_, Tag, Content>> {
        let state = WorldState::upgrade(&self.world)?;
        state.check_pe(t)?;
        Ok(QueueImage {
            queue: self,
            state,
            pe: t,
        })
    }

    /// The messages delivered by the most recent `sync`, in delivery order.
    pub fn iter(&self) -> MessageIter<Tag, Content> {
        MessageIter {
            messages: self.inbox.messages.lock().clone().into_iter(),
        }
    }

    /// Number of messages delivered by the most recent `sync`.
    pub fn len(&self) -> usize {
        self.inbox.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<Tag, Content> Drop for Queue<Tag, Content>
where
    Tag: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    Content: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        match WorldState::upgrade(&self.world) {
            Ok(state) => state.unregister_queue(self.id),
            Err(_) => trace!("queue {} dropped after its world", self.id),
        }
    }
}

impl<'a, Tag, Content> IntoIterator for &'a Queue<Tag, Content>
where
    Tag: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    Content: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Item = Message<Tag, Content>;
    type IntoIter = MessageIter<Tag, Content>;

    fn into_iter(self) -> MessageIter<Tag, Content> {
        self.iter()
    }
}

/// Iterator over a queue's current delivery. Holds a snapshot, so the queue
/// may keep receiving in later supersteps while an iterator is alive.
pub struct MessageIter<Tag, Content> {
    messages: std::vec::IntoIter<Message<Tag, Content>>,
}

impl<Tag, Content> Iterator for MessageIter<Tag, Content> {
    type Item = Message<Tag, Content>;

    fn next(&mut self) -> Option<Message<Tag, Content>> {
        self.messages.next()
    }
}

/// The inbox of a [`Queue`] on one specific processor.
pub struct QueueImage<'a, Tag, Content>
where
    Tag: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    Content: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    queue: &'a Queue<Tag, Content>,
    state: Arc<WorldState>,
    pe: usize,
}

impl<Tag, Content> QueueImage<'_, Tag, Content>
where
    Tag: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    Content: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Schedule a message into this inbox; it is delivered by the next
    /// `sync`. Tag and content are encoded at issue time, so the caller may
    /// reuse or drop its own copies immediately.
    pub fn send(&self, tag: Tag, content: Content) {
        let tag_bytes = match crate::serialize(&tag) {
            Ok(bytes) => bytes,
            Err(err) => panic!("message tag failed to serialize: {}", err),
        };
        let content_bytes = match crate::serialize(&content) {
            Ok(bytes) => bytes,
            Err(err) => panic!("message content failed to serialize: {}", err),
        };
        if let Err(err) =
            self.state
                .send_message(self.pe, self.queue.id, &tag_bytes, &content_bytes)
        {
            fatal(err);
        }
    }
}
