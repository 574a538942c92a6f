//! Volatile post store.
//!
//! The board keeps its records in canonical order and splices replies into
//! place on insert. Structural changes take the write lock for the whole
//! board; votes only need the read lock because each record's counters are
//! atomics, so votes on different posts (or the same post) never block each
//! other and never lose an update.
//!
//! `created_at` is allocated while the write lock is held. Readers therefore
//! never see a post whose instant is newer than one still being inserted,
//! which is what keeps `list_since` cursors from skipping posts.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::PostStore;
use crate::{
    cursor::Cursor,
    error::{BoardError, Result},
    id::{InstantClock, OrdinalAllocator},
    poll,
    post::{Draft, NewPost, Post, PostId},
    thread,
};

pub struct MemoryStore {
    board: RwLock<Board>,
    ids: OrdinalAllocator,
    clock: InstantClock,
}

#[derive(Default)]
struct Board {
    /// Canonical order.
    sequence: Vec<Arc<Record>>,
    by_id: HashMap<PostId, Arc<Record>>,
}

/// Fixed fields plus live counters. The counters inside `post` are stale;
/// [`Record::snapshot`] reads the atomics.
struct Record {
    post: Post,
    upvotes: AtomicI64,
    tally: Vec<AtomicU64>,
}

impl Record {
    fn new(post: Post) -> Self {
        let upvotes = AtomicI64::new(post.upvote_count);
        // One slot per option, whatever tally the post arrived with.
        let options = post.poll.as_ref().map_or(0, Vec::len);
        let counts = post.poll_tally.as_deref().unwrap_or_default();
        let tally = (0..options)
            .map(|slot| AtomicU64::new(counts.get(slot).copied().unwrap_or(0)))
            .collect();

        Self {
            post,
            upvotes,
            tally,
        }
    }

    fn snapshot(&self) -> Post {
        let mut post = self.post.clone();
        post.upvote_count = self.upvotes.load(Ordering::Acquire);
        post.poll_tally = post.poll.as_ref().map(|_| {
            self.tally
                .iter()
                .map(|count| count.load(Ordering::Acquire))
                .collect()
        });
        post
    }
}

impl Board {
    fn insert(&mut self, post: Post) -> usize {
        let record = Arc::new(Record::new(post));
        self.by_id.insert(record.post.id.clone(), Arc::clone(&record));

        let parent = record.post.parent_id.clone();
        thread::insert(&mut self.sequence, record, parent.as_ref(), |record| {
            &record.post.id
        })
    }

    fn get(&self, id: &PostId) -> Result<&Arc<Record>> {
        self.by_id
            .get(id)
            .ok_or_else(|| BoardError::NotFound(id.clone()))
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            board: RwLock::new(Board::default()),
            ids: OrdinalAllocator::new(),
            clock: InstantClock::new(),
        }
    }

    /// Inserts a post that already has its identity and counters, applying
    /// the threading rule. Used to mirror a durable backend.
    pub async fn adopt(&self, post: Post) -> usize {
        let mut board = self.board.write().await;
        board.insert(post)
    }

    pub async fn len(&self) -> usize {
        self.board.read().await.sequence.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create(&self, new: NewPost) -> Result<Post> {
        let draft = Draft::prepare(new)?;

        let mut board = self.board.write().await;
        let post = draft.into_post(self.ids.next_id(), self.clock.next_instant());
        let position = board.insert(post.clone());

        info!(
            post_id = %post.id,
            created_at = post.created_at,
            parent = ?post.parent_id,
            position,
            "post created"
        );
        Ok(post)
    }

    async fn apply_vote(&self, id: &PostId, amount: i64) -> Result<Post> {
        let board = self.board.read().await;
        let record = board.get(id)?;

        let previous = record
            .upvotes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(poll::add_upvotes(current, amount))
            })
            .unwrap_or_else(|current| current);

        debug!(post_id = %id, amount, previous, "upvote applied");
        Ok(record.snapshot())
    }

    async fn apply_poll_vote(&self, id: &PostId, option_index: i64) -> Result<Post> {
        let board = self.board.read().await;
        let record = board.get(id)?;

        let slot = poll::check_option(record.post.poll.as_deref(), option_index)?;
        if let Some(count) = record.tally.get(slot) {
            count.fetch_add(1, Ordering::AcqRel);
        }

        debug!(post_id = %id, option = slot, "poll vote applied");
        Ok(record.snapshot())
    }

    async fn list_all(&self) -> Result<Vec<Post>> {
        let board = self.board.read().await;
        Ok(board.sequence.iter().map(|record| record.snapshot()).collect())
    }

    async fn list_since(&self, cursor: Option<Cursor>) -> Result<Vec<Post>> {
        let Some(cursor) = cursor else {
            return Ok(Vec::new());
        };

        let board = self.board.read().await;
        Ok(board
            .sequence
            .iter()
            .filter(|record| cursor.admits(&record.post))
            .map(|record| record.snapshot())
            .collect())
    }
}
