//! The authoritative post collection.
//!
//! Every backend implements [`PostStore`] with the same contract:
//!
//! - `create` resolves attachments, normalizes the poll, assigns an id and a
//!   fresh `created_at`, and places the post with the threading rule in
//!   [`crate::thread`]. A failed create leaves no record behind.
//! - `apply_vote` / `apply_poll_vote` are atomic per post; concurrent votes
//!   are never lost. Client-input failures leave the post unchanged.
//! - `list_all` is the canonical (threaded) order; `list_since` is the
//!   subsequence of it created after the cursor. Neither observes a
//!   half-finished create.
//!
//! Backends:
//!
//! - [`MemoryStore`]: volatile, dense ordinal ids, positional splice.
//! - [`RedisStore`]: durable, opaque keys, chronological storage with the
//!   canonical order rebuilt on read.
//! - [`HybridStore`]: Redis for durability with a [`MemoryStore`] mirror
//!   serving reads.

use async_trait::async_trait;

use crate::{
    cursor::Cursor,
    error::Result,
    post::{NewPost, Post, PostId},
};

pub mod document;
pub mod hybrid;
pub mod memory;

pub use document::RedisStore;
pub use hybrid::HybridStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, new: NewPost) -> Result<Post>;

    /// Adds a signed `amount` to the post's upvote count.
    async fn apply_vote(&self, id: &PostId, amount: i64) -> Result<Post>;

    /// Counts one vote for `option_index` of the post's poll.
    async fn apply_poll_vote(&self, id: &PostId, option_index: i64) -> Result<Post>;

    async fn list_all(&self) -> Result<Vec<Post>>;

    /// Posts created strictly after `cursor`, in canonical order. `None` yields nothing.
    async fn list_since(&self, cursor: Option<Cursor>) -> Result<Vec<Post>>;
}
