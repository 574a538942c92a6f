//! Redis-backed post store.
//!
//! Layout under a configurable namespace (`board` by default):
//!
//! - `board:post:{id}`: hash with the immutable post document (`doc`, JSON),
//!   `created_at`, `upvotes`, and one `tally:{slot}` field per poll option
//! - `board:timeline`: sorted set of post ids scored by `created_at`
//! - `board:clock`: last `created_at` handed out
//!
//! Ids are opaque keys. A create runs as one server-side script that
//! allocates the instant, writes the hash and indexes the id, so concurrent
//! creates (even from several processes) get distinct, ordered instants and
//! a reader never sees an instant before the post is indexed.
//!
//! Counters are bumped with `HINCRBY`, which Redis applies atomically.
//! There is no positional splice here: storage is chronological and
//! `list_all` rebuilds the threaded order with [`thread::canonical_order`].
//! `list_since` filters that same order, so a delta lists posts exactly as
//! the full listing would.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::PostStore;
use crate::{
    cursor::Cursor,
    error::{BoardError, Result},
    id, poll,
    post::{Attachment, Draft, NewPost, Post, PostId},
    thread,
};

pub const DEFAULT_NAMESPACE: &str = "board";

const DOC_FIELD: &str = "doc";
const CREATED_AT_FIELD: &str = "created_at";
const UPVOTES_FIELD: &str = "upvotes";

const CREATE_SCRIPT: &str = r"
local last = tonumber(redis.call('GET', KEYS[1]) or '0')
local at = tonumber(ARGV[1])
if at <= last then
    at = last + 1
end
local stamp = string.format('%d', at)
redis.call('SET', KEYS[1], stamp)
redis.call('HSET', KEYS[2], 'doc', ARGV[3], 'created_at', stamp, 'upvotes', 0)
for slot = 0, tonumber(ARGV[4]) - 1 do
    redis.call('HSET', KEYS[2], 'tally:' .. slot, 0)
end
redis.call('ZADD', KEYS[3], stamp, ARGV[2])
return at
";

/// The part of a post that never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostDocument {
    id: PostId,
    body: Option<String>,
    attachments: Vec<Attachment>,
    created_label: String,
    poll: Option<Vec<String>>,
    parent_id: Option<PostId>,
    reply_depth: i64,
}

impl PostDocument {
    fn new(id: &PostId, draft: &Draft) -> Self {
        Self {
            id: id.clone(),
            body: draft.body.clone(),
            attachments: draft.attachments.clone(),
            created_label: draft.created_label.clone(),
            poll: draft.poll.clone(),
            parent_id: draft.parent_id.clone(),
            reply_depth: draft.reply_depth,
        }
    }
}

pub struct RedisStore {
    connection: ConnectionManager,
    namespace: String,
    create_script: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, namespace: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager().await?;

        info!(%redis_url, namespace, "connected to redis");
        Ok(Self::with_connection(connection, namespace))
    }

    pub fn with_connection(connection: ConnectionManager, namespace: &str) -> Self {
        Self {
            connection,
            namespace: namespace.to_string(),
            create_script: Script::new(CREATE_SCRIPT),
        }
    }

    /// Every stored post, oldest first.
    pub async fn list_chronological(&self) -> Result<Vec<Post>> {
        let mut con = self.connection.clone();
        let ids: Vec<String> = con.zrange(self.timeline_key(), 0, -1).await?;
        self.fetch_many(ids).await
    }

    fn post_key(&self, id: &PostId) -> String {
        post_key(&self.namespace, id)
    }

    fn timeline_key(&self) -> String {
        format!("{}:timeline", self.namespace)
    }

    fn clock_key(&self) -> String {
        format!("{}:clock", self.namespace)
    }

    async fn fetch(&self, id: &PostId) -> Result<Post> {
        let mut con = self.connection.clone();
        let fields: HashMap<String, String> = con.hgetall(self.post_key(id)).await?;
        decode(id, fields)
    }

    async fn fetch_many(&self, ids: Vec<String>) -> Result<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<PostId> = ids.iter().filter_map(|raw| PostId::parse(raw)).collect();
        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(self.post_key(id));
        }

        let mut con = self.connection.clone();
        let rows: Vec<HashMap<String, String>> = pipe.query_async(&mut con).await?;

        ids.iter()
            .zip(rows)
            .map(|(id, fields)| decode(id, fields))
            .collect()
    }

    async fn ensure_exists(&self, id: &PostId) -> Result<()> {
        let mut con = self.connection.clone();
        let exists: bool = con.exists(self.post_key(id)).await?;
        if exists {
            Ok(())
        } else {
            Err(BoardError::NotFound(id.clone()))
        }
    }
}

#[async_trait]
impl PostStore for RedisStore {
    async fn create(&self, new: NewPost) -> Result<Post> {
        let draft = Draft::prepare(new)?;
        let id = id::opaque_key();

        let document = serde_json::to_string(&PostDocument::new(&id, &draft))
            .map_err(|err| BoardError::StoreUnavailable(format!("encode post: {err}")))?;
        let tally_len = draft.poll.as_ref().map_or(0, Vec::len);

        let mut invocation = self.create_script.prepare_invoke();
        invocation
            .key(self.clock_key())
            .key(self.post_key(&id))
            .key(self.timeline_key())
            .arg(id::now_millis())
            .arg(id.to_string())
            .arg(document)
            .arg(tally_len);

        let mut con = self.connection.clone();
        let created_at: u64 = invocation.invoke_async(&mut con).await.map_err(|err| {
            warn!(error = ?err, "create script failed");
            BoardError::from(err)
        })?;

        let post = draft.into_post(id, created_at);
        info!(
            post_id = %post.id,
            created_at,
            parent = ?post.parent_id,
            "post created"
        );
        Ok(post)
    }

    async fn apply_vote(&self, id: &PostId, amount: i64) -> Result<Post> {
        self.ensure_exists(id).await?;

        let mut con = self.connection.clone();
        let upvotes: i64 = con.hincr(self.post_key(id), UPVOTES_FIELD, amount).await?;

        debug!(post_id = %id, amount, upvotes, "upvote applied");
        self.fetch(id).await
    }

    async fn apply_poll_vote(&self, id: &PostId, option_index: i64) -> Result<Post> {
        let mut con = self.connection.clone();
        let key = self.post_key(id);

        let doc: Option<String> = con.hget(&key, DOC_FIELD).await?;
        let doc = decode_document(doc.ok_or_else(|| BoardError::NotFound(id.clone()))?)?;
        let slot = poll::check_option(doc.poll.as_deref(), option_index)?;

        let count: u64 = con.hincr(&key, tally_field(slot), 1).await?;

        debug!(post_id = %id, option = slot, count, "poll vote applied");
        self.fetch(id).await
    }

    async fn list_all(&self) -> Result<Vec<Post>> {
        Ok(thread::canonical_order(self.list_chronological().await?))
    }

    async fn list_since(&self, cursor: Option<Cursor>) -> Result<Vec<Post>> {
        let Some(cursor) = cursor else {
            return Ok(Vec::new());
        };

        // The range index answers "anything new?" without loading the board.
        let mut con = self.connection.clone();
        let fresh: usize = con
            .zcount(self.timeline_key(), format!("({cursor}"), "+inf")
            .await?;
        if fresh == 0 {
            return Ok(Vec::new());
        }

        let posts = self.list_all().await?;
        Ok(posts.into_iter().filter(|post| cursor.admits(post)).collect())
    }
}

fn post_key(namespace: &str, id: &PostId) -> String {
    format!("{namespace}:post:{id}")
}

fn tally_field(slot: usize) -> String {
    format!("tally:{slot}")
}

fn decode_document(raw: String) -> Result<PostDocument> {
    serde_json::from_str(&raw)
        .map_err(|err| BoardError::StoreUnavailable(format!("corrupt post document: {err}")))
}

fn decode(id: &PostId, mut fields: HashMap<String, String>) -> Result<Post> {
    let doc = fields
        .remove(DOC_FIELD)
        .ok_or_else(|| BoardError::NotFound(id.clone()))?;
    let doc = decode_document(doc)?;

    let created_at = numeric_field(id, &fields, CREATED_AT_FIELD)?;
    let upvote_count = numeric_field(id, &fields, UPVOTES_FIELD)?;
    let poll_tally = doc
        .poll
        .as_ref()
        .map(|options| {
            (0..options.len())
                .map(|slot| numeric_field(id, &fields, &tally_field(slot)))
                .collect::<Result<Vec<u64>>>()
        })
        .transpose()?;

    Ok(Post {
        id: doc.id,
        body: doc.body,
        attachments: doc.attachments,
        created_label: doc.created_label,
        created_at,
        poll: doc.poll,
        poll_tally,
        upvote_count,
        parent_id: doc.parent_id,
        reply_depth: doc.reply_depth,
    })
}

fn numeric_field<T: std::str::FromStr>(
    id: &PostId,
    fields: &HashMap<String, String>,
    name: &str,
) -> Result<T> {
    fields
        .get(name)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| BoardError::StoreUnavailable(format!("post {id} has a bad '{name}' field")))
}
