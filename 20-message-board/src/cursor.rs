//! Incremental sync: "everything created after the last post I saw".
//!
//! A cursor is a `created_at` value. The server never stores cursor state;
//! clients remember the largest `created_at` they have observed (see
//! [`SyncCursor`]) and send it back as `since`.
//!
//! An absent, zero, or unparseable cursor yields no posts at all. A client
//! without a cursor asks for the full listing instead.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::post::Post;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(u64);

impl Cursor {
    /// Zero is not a cursor.
    pub fn new(created_at: u64) -> Option<Self> {
        (created_at != 0).then_some(Self(created_at))
    }

    /// Parses a `since` query value. Anything but a positive integer is `None`.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw?.trim().parse::<u64>().ok().and_then(Self::new)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn admits(self, post: &Post) -> bool {
        post.created_at > self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client half of the protocol: remembers the newest instant seen so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncCursor {
    latest: Option<Cursor>,
}

impl SyncCursor {
    pub fn current(&self) -> Option<Cursor> {
        self.latest
    }

    /// Advances past every post in `posts`. Returns whether the cursor moved.
    pub fn observe<'a, I>(&mut self, posts: I) -> bool
    where
        I: IntoIterator<Item = &'a Post>,
    {
        let newest = posts
            .into_iter()
            .filter_map(|post| Cursor::new(post.created_at))
            .max();

        match (self.latest, newest) {
            (Some(latest), Some(newest)) if newest <= latest => false,
            (_, Some(newest)) => {
                self.latest = Some(newest);
                true
            }
            (_, None) => false,
        }
    }
}
