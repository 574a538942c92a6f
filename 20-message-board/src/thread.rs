//! Threaded placement: where a new post lands in the canonical listing.
//!
//! A reply is spliced in at its parent's position, pushing the parent (and
//! everything after it) one slot down. Successive replies to one parent
//! therefore collect just above it. Top-level posts, and replies whose
//! parent is unknown, go to the end.
//!
//! Placement only depends on which posts exist at insertion time, so
//! replaying the rule over posts in `created_at` order rebuilds exactly the
//! sequence an in-place splice would have produced. Document backends use
//! [`canonical_order`] for that.

use crate::post::{Post, PostId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Before(usize),
    Append,
}

pub fn placement<T, F>(sequence: &[T], parent: Option<&PostId>, id_of: F) -> Placement
where
    F: Fn(&T) -> &PostId,
{
    let Some(parent) = parent else {
        return Placement::Append;
    };

    sequence
        .iter()
        .position(|item| id_of(item) == parent)
        .map_or(Placement::Append, Placement::Before)
}

/// Inserts `item` according to [`placement`] and returns the position used.
pub fn insert<T, F>(sequence: &mut Vec<T>, item: T, parent: Option<&PostId>, id_of: F) -> usize
where
    F: Fn(&T) -> &PostId,
{
    match placement(sequence, parent, id_of) {
        Placement::Before(index) => {
            sequence.insert(index, item);
            index
        }
        Placement::Append => {
            sequence.push(item);
            sequence.len() - 1
        }
    }
}

/// Rebuilds the canonical listing from posts stored in any order.
pub fn canonical_order(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by_key(|post| post.created_at);

    let mut ordered: Vec<Post> = Vec::with_capacity(posts.len());
    for post in posts {
        let parent = post.parent_id.clone();
        insert(&mut ordered, post, parent.as_ref(), |post| &post.id);
    }
    ordered
}
