use std::sync::Arc;

use anyhow::Result;
use message_board::{
    attachment::AssetDescriptor,
    cursor::Cursor,
    error::BoardError,
    post::{NewPost, Post, PostId},
    store::{MemoryStore, PostStore},
};

fn bodies(posts: &[Post]) -> Vec<&str> {
    posts
        .iter()
        .map(|post| post.body.as_deref().unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn top_level_posts_keep_arrival_order() -> Result<()> {
    let store = MemoryStore::new();
    for body in ["a", "b", "c"] {
        store.create(NewPost::top_level(body)).await?;
    }

    assert_eq!(bodies(&store.list_all().await?), vec!["a", "b", "c"]);
    Ok(())
}

#[tokio::test]
async fn reply_takes_its_parents_position() -> Result<()> {
    let store = MemoryStore::new();
    store.create(NewPost::top_level("A")).await?;
    let b = store.create(NewPost::top_level("B")).await?;
    store.create(NewPost::top_level("C")).await?;

    let d = store.create(NewPost::reply("D", b.id.clone(), 1)).await?;

    assert_eq!(bodies(&store.list_all().await?), vec!["A", "D", "B", "C"]);
    assert_eq!(d.parent_id, Some(b.id));
    assert_eq!(d.reply_depth, 1);
    Ok(())
}

#[tokio::test]
async fn reply_to_unknown_parent_is_appended() -> Result<()> {
    let store = MemoryStore::new();
    store.create(NewPost::top_level("A")).await?;
    store
        .create(NewPost::reply("orphan", PostId::Ordinal(99), 1))
        .await?;

    assert_eq!(bodies(&store.list_all().await?), vec!["A", "orphan"]);
    Ok(())
}

#[tokio::test]
async fn votes_accumulate_signed_amounts() -> Result<()> {
    let store = MemoryStore::new();
    let post = store.create(NewPost::top_level("vote me")).await?;

    store.apply_vote(&post.id, 3).await?;
    let voted = store.apply_vote(&post.id, -1).await?;

    assert_eq!(voted.upvote_count, 2);
    assert_eq!(store.list_all().await?[0].upvote_count, 2);
    Ok(())
}

#[tokio::test]
async fn unknown_post_is_not_found() -> Result<()> {
    let store = MemoryStore::new();
    store.create(NewPost::top_level("only")).await?;
    let before = store.list_all().await?;

    let missing = PostId::Ordinal(42);
    let err = store.apply_vote(&missing, 1).await.unwrap_err();
    assert!(matches!(err, BoardError::NotFound(ref id) if *id == missing));

    let err = store.apply_poll_vote(&missing, 0).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");

    assert_eq!(store.list_all().await?, before);
    Ok(())
}

#[tokio::test]
async fn poll_votes_count_per_option() -> Result<()> {
    let store = MemoryStore::new();
    let post = store
        .create(NewPost::top_level("x or y").with_poll(["x", "y"]))
        .await?;
    assert_eq!(post.poll_tally, Some(vec![0, 0]));

    store.apply_poll_vote(&post.id, 1).await?;
    let voted = store.apply_poll_vote(&post.id, 1).await?;
    assert_eq!(voted.poll_tally, Some(vec![0, 2]));

    let err = store.apply_poll_vote(&post.id, 5).await.unwrap_err();
    assert!(matches!(
        err,
        BoardError::InvalidOption {
            index: 5,
            options: 2
        }
    ));
    let err = store.apply_poll_vote(&post.id, -1).await.unwrap_err();
    assert!(matches!(err, BoardError::InvalidOption { .. }));

    assert_eq!(store.list_all().await?[0].poll_tally, Some(vec![0, 2]));
    Ok(())
}

#[tokio::test]
async fn poll_vote_without_poll_is_rejected() -> Result<()> {
    let store = MemoryStore::new();
    let post = store.create(NewPost::top_level("no poll here")).await?;

    let err = store.apply_poll_vote(&post.id, 0).await.unwrap_err();
    assert!(matches!(err, BoardError::NoPoll));
    Ok(())
}

#[tokio::test]
async fn poll_options_past_four_are_dropped() -> Result<()> {
    let store = MemoryStore::new();
    let post = store
        .create(NewPost::top_level("pick").with_poll(["a", "b", "c", "d", "e"]))
        .await?;

    assert_eq!(post.poll.as_ref().map(Vec::len), Some(4));
    assert_eq!(post.poll_tally, Some(vec![0; 4]));
    Ok(())
}

#[tokio::test]
async fn list_since_returns_only_newer_posts() -> Result<()> {
    let store = MemoryStore::new();
    let first = store.create(NewPost::top_level("1")).await?;
    let second = store.create(NewPost::top_level("2")).await?;
    let third = store.create(NewPost::reply("3", first.id.clone(), 1)).await?;

    // Canonical order is [3, 1, 2]; the delta keeps it.
    let since = store.list_since(Cursor::new(first.created_at)).await?;
    assert_eq!(bodies(&since), vec!["3", "2"]);
    assert!(since.iter().all(|post| post.created_at > first.created_at));

    let since = store.list_since(Cursor::new(second.created_at)).await?;
    assert_eq!(bodies(&since), vec!["3"]);

    assert!(store.list_since(Cursor::new(third.created_at)).await?.is_empty());
    assert!(store.list_since(Cursor::new(0)).await?.is_empty());
    assert!(store.list_since(None).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn created_at_is_strictly_increasing() -> Result<()> {
    let store = MemoryStore::new();
    let mut last = 0;
    for n in 0..50 {
        let post = store.create(NewPost::top_level(format!("{n}"))).await?;
        assert!(post.created_at > last);
        last = post.created_at;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_votes_are_not_lost() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let post = store.create(NewPost::top_level("popular")).await?;

    let voters: Vec<_> = (0..3)
        .map(|_| {
            let store = Arc::clone(&store);
            let id = post.id.clone();
            tokio::spawn(async move { store.apply_vote(&id, 1).await })
        })
        .collect();
    for voter in voters {
        voter.await??;
    }

    assert_eq!(store.list_all().await?[0].upvote_count, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_get_distinct_ids() -> Result<()> {
    let store = Arc::new(MemoryStore::new());

    let writers: Vec<_> = (0..32)
        .map(|n| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create(NewPost::top_level(format!("{n}"))).await })
        })
        .collect();
    let mut ids = Vec::new();
    for writer in writers {
        ids.push(writer.await??.id);
    }

    ids.sort_by_key(|id| id.to_string());
    ids.dedup();
    assert_eq!(ids.len(), 32);
    assert_eq!(store.len().await, 32);
    Ok(())
}

#[tokio::test]
async fn failed_resolution_creates_nothing() -> Result<()> {
    let store = MemoryStore::new();
    store.create(NewPost::top_level("existing")).await?;

    let broken = AssetDescriptor {
        filename: None,
        content_type: Some("image/png".into()),
        size_bytes: 10,
        url: "http://assets/x.png".into(),
    };
    let err = store
        .create(NewPost::top_level("with file").with_assets(vec![broken]))
        .await
        .unwrap_err();

    assert!(matches!(err, BoardError::Resolution(_)));
    assert_eq!(store.len().await, 1);

    // The failed attempt consumed no id.
    let next = store.create(NewPost::top_level("next")).await?;
    assert_eq!(next.id, PostId::Ordinal(2));
    Ok(())
}

#[tokio::test]
async fn attachments_past_four_are_dropped() -> Result<()> {
    let store = MemoryStore::new();
    let assets = (0..6)
        .map(|n| AssetDescriptor {
            filename: Some(format!("{n}.png")),
            content_type: Some("image/png".into()),
            size_bytes: n,
            url: format!("http://assets/{n}.png"),
        })
        .collect();

    let post = store
        .create(NewPost::top_level("gallery").with_assets(assets))
        .await?;

    assert_eq!(post.attachments.len(), 4);
    assert_eq!(post.attachments[3].filename, "3.png");
    Ok(())
}
