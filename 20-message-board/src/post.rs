//! Board data model.
//!
//! A [`Post`] is created once through a [`PostStore`](crate::store::PostStore)
//! and afterwards only its counters (`upvote_count`, `poll_tally`) change.
//! Everything else is fixed at creation.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::{
    attachment::{self, AssetDescriptor},
    error::Result,
    poll,
};

/// Identifier of a post.
///
/// The in-memory store hands out dense ordinals; document backends hand out
/// opaque keys. Only [`Post::created_at`] is used for ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PostId {
    Ordinal(u64),
    Key(String),
}

impl PostId {
    /// Digit-only input is an ordinal, anything else non-empty is an opaque key.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        match raw.parse::<u64>() {
            Ok(ordinal) => Some(PostId::Ordinal(ordinal)),
            Err(_) => Some(PostId::Key(raw.to_string())),
        }
    }

    /// Parses a `replyId` field. Absent, empty and negative values mean top-level.
    pub fn parse_parent(raw: Option<&str>) -> Option<Self> {
        let raw = raw?.trim();
        if raw.parse::<i64>().is_ok_and(|value| value < 0) {
            return None;
        }
        Self::parse(raw)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostId::Ordinal(ordinal) => write!(f, "{ordinal}"),
            PostId::Key(key) => f.write_str(key),
        }
    }
}

impl<'de> Deserialize<'de> for PostId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Signed(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(ordinal) => Ok(PostId::Ordinal(ordinal)),
            // No store hands out negative ids, so lookups answer not found.
            Raw::Signed(negative) => Ok(PostId::Key(negative.to_string())),
            Raw::Text(text) => {
                PostId::parse(&text).ok_or_else(|| de::Error::custom("post id cannot be empty"))
            }
        }
    }
}

/// An uploaded file embedded in a post. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub body: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Display-only creation time, e.g. `3/14/2025 09:05`.
    pub created_label: String,
    /// Strictly increasing creation instant; doubles as the sync cursor domain.
    pub created_at: u64,
    pub poll: Option<Vec<String>>,
    pub poll_tally: Option<Vec<u64>>,
    pub upvote_count: i64,
    /// `None` for top-level posts.
    pub parent_id: Option<PostId>,
    pub reply_depth: i64,
}

/// Input to [`PostStore::create`](crate::store::PostStore::create).
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub body: Option<String>,
    pub assets: Vec<AssetDescriptor>,
    pub poll: Vec<String>,
    pub parent_id: Option<PostId>,
    pub reply_depth: i64,
}

impl NewPost {
    pub fn top_level(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    pub fn reply(body: impl Into<String>, parent_id: PostId, reply_depth: i64) -> Self {
        Self {
            body: Some(body.into()),
            parent_id: Some(parent_id),
            reply_depth,
            ..Self::default()
        }
    }

    pub fn with_poll<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.poll = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_assets(mut self, assets: Vec<AssetDescriptor>) -> Self {
        self.assets = assets;
        self
    }
}

/// A validated post that has not been assigned an identity yet.
///
/// Building the draft resolves attachments and normalizes the poll before
/// any id or instant is allocated, so a rejected request leaves no trace.
#[derive(Debug, Clone)]
pub struct Draft {
    pub body: Option<String>,
    pub attachments: Vec<Attachment>,
    pub created_label: String,
    pub poll: Option<Vec<String>>,
    pub parent_id: Option<PostId>,
    pub reply_depth: i64,
}

impl Draft {
    pub fn prepare(new: NewPost) -> Result<Self> {
        let attachments = attachment::resolve(new.assets)?;

        Ok(Self {
            body: new.body.filter(|body| !body.is_empty()),
            attachments,
            created_label: created_label(chrono::Local::now()),
            poll: poll::normalize_options(new.poll),
            parent_id: new.parent_id,
            reply_depth: new.reply_depth,
        })
    }

    pub fn into_post(self, id: PostId, created_at: u64) -> Post {
        let poll_tally = poll::empty_tally(self.poll.as_deref());

        Post {
            id,
            body: self.body,
            attachments: self.attachments,
            created_label: self.created_label,
            created_at,
            poll: self.poll,
            poll_tally,
            upvote_count: 0,
            parent_id: self.parent_id,
            reply_depth: self.reply_depth,
        }
    }
}

pub fn created_label<Tz>(now: chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: fmt::Display,
{
    now.format("%-m/%-d/%Y %H:%M").to_string()
}
