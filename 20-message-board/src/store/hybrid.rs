//! Redis for durability, memory for reads.
//!
//! The mirror is hydrated from the durable store on open. Every write goes
//! to the durable store first and is only reflected in the mirror once it
//! was accepted there, so the mirror never holds a post the durable copy
//! lost.
//!
//! Each write and its mirror update run together on a spawned task. A caller
//! that goes away mid-request (a dropped HTTP connection, say) cannot leave
//! a durable post missing from the mirror.
//!
//! Creates are serialized so the mirror adopts posts in `created_at` order;
//! otherwise a delta reader could advance its cursor past a post that was
//! still on its way into the mirror. Votes are replayed on the mirror as the
//! same deltas, which commute, instead of copying absolute counts back.
//!
//! Assumes this process is the only writer to its namespace: writes made by
//! other processes reach the mirror only on the next restart.

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{MemoryStore, PostStore, RedisStore};
use crate::{
    cursor::Cursor,
    error::{BoardError, Result},
    post::{NewPost, Post, PostId},
};

pub struct HybridStore<D = RedisStore> {
    durable: Arc<D>,
    mirror: Arc<MemoryStore>,
    create_gate: Arc<Mutex<()>>,
}

impl<D: PostStore + 'static> HybridStore<D> {
    pub async fn open(durable: D) -> Result<Self> {
        let mut posts = durable.list_all().await?;
        posts.sort_by_key(|post| post.created_at);

        let mirror = MemoryStore::new();
        for post in posts {
            mirror.adopt(post).await;
        }

        info!(posts = mirror.len().await, "hybrid mirror hydrated");
        Ok(Self {
            durable: Arc::new(durable),
            mirror: Arc::new(mirror),
            create_gate: Arc::new(Mutex::new(())),
        })
    }
}

/// Runs `write` to completion even if the caller stops waiting for it.
async fn detached<F>(write: F) -> Result<Post>
where
    F: Future<Output = Result<Post>> + Send + 'static,
{
    tokio::spawn(write)
        .await
        .map_err(|err| BoardError::StoreUnavailable(format!("store write aborted: {err}")))?
}

#[async_trait]
impl<D: PostStore + 'static> PostStore for HybridStore<D> {
    async fn create(&self, new: NewPost) -> Result<Post> {
        let durable = Arc::clone(&self.durable);
        let mirror = Arc::clone(&self.mirror);
        let gate = Arc::clone(&self.create_gate);

        detached(async move {
            let _gate = gate.lock_owned().await;

            let post = durable.create(new).await?;
            mirror.adopt(post.clone()).await;
            Ok(post)
        })
        .await
    }

    async fn apply_vote(&self, id: &PostId, amount: i64) -> Result<Post> {
        let durable = Arc::clone(&self.durable);
        let mirror = Arc::clone(&self.mirror);
        let id = id.clone();

        detached(async move {
            let post = durable.apply_vote(&id, amount).await?;
            if let Err(err) = mirror.apply_vote(&id, amount).await {
                warn!(post_id = %id, error = %err, "mirror missed an upvote");
            }
            Ok(post)
        })
        .await
    }

    async fn apply_poll_vote(&self, id: &PostId, option_index: i64) -> Result<Post> {
        let durable = Arc::clone(&self.durable);
        let mirror = Arc::clone(&self.mirror);
        let id = id.clone();

        detached(async move {
            let post = durable.apply_poll_vote(&id, option_index).await?;
            if let Err(err) = mirror.apply_poll_vote(&id, option_index).await {
                warn!(post_id = %id, error = %err, "mirror missed a poll vote");
            }
            Ok(post)
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<Post>> {
        self.mirror.list_all().await
    }

    async fn list_since(&self, cursor: Option<Cursor>) -> Result<Vec<Post>> {
        self.mirror.list_since(cursor).await
    }
}
