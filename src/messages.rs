/// Gossiped payload together with the number of relays it has gone through.
///
/// The injected message starts at `hops == 0`; every re-broadcast produces a
/// copy with `hops + 1` via [`Message::relayed`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    content: String,
    hops: u32,
}

impl Message {
    pub fn new(content: impl Into<String>) -> Self {
        Self::with_hops(content, 0)
    }

    pub fn with_hops(content: impl Into<String>, hops: u32) -> Self {
        Self {
            content: content.into(),
            hops,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn hops(&self) -> u32 {
        self.hops
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Copy of this message one hop further along.
    pub fn relayed(&self) -> Self {
        Self {
            content: self.content.clone(),
            hops: self.hops.saturating_add(1),
        }
    }
}
