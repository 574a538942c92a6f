use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{io::AsyncWriteExt, select, time::MissedTickBehavior};
use tracing::{info, warn};

use crate::{cli::WatchArgs, cursor::SyncCursor, post::Post};

/// Polls a board over HTTP, tracking its own sync cursor.
pub struct Watcher {
    http: reqwest::Client,
    base: String,
    cursor: SyncCursor,
}

impl Watcher {
    pub fn new(server: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: server.trim_end_matches('/').to_string(),
            cursor: SyncCursor::default(),
        }
    }

    pub fn cursor(&self) -> SyncCursor {
        self.cursor
    }

    /// Fetches whatever is new since the last call.
    ///
    /// Without a cursor yet (first call, or an empty board so far) this asks
    /// for the full listing, since the delta endpoint returns nothing for a
    /// missing cursor.
    pub async fn poll_once(&mut self) -> Result<Vec<Post>> {
        let request = match self.cursor.current() {
            Some(cursor) => self
                .http
                .get(format!("{}/getNewPosts", self.base))
                .query(&[("since", cursor.value())]),
            None => self.http.get(format!("{}/getPosts", self.base)),
        };

        let posts: Vec<Post> = request
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base))?
            .error_for_status()?
            .json()
            .await
            .context("board returned malformed posts")?;

        self.cursor.observe(&posts);
        Ok(posts)
    }
}

pub async fn run(args: WatchArgs) -> Result<()> {
    let mut watcher = Watcher::new(&args.server);
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(server = %args.server, "watching board");

    loop {
        select! {
            _ = ticker.tick() => {
                match watcher.poll_once().await {
                    Ok(posts) => {
                        for post in &posts {
                            write_stdout(&render_post(post)).await?;
                        }
                    }
                    Err(err) => warn!(error = ?err, "poll failed"),
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(err) = ctrl_c {
                    warn!(error = ?err, "failed to listen for ctrl-c");
                }
                break;
            }
        }
    }

    Ok(())
}

pub fn render_post(post: &Post) -> String {
    let mut line = format!("[{}] #{} ^{}", post.created_label, post.id, post.upvote_count);

    if let Some(parent) = &post.parent_id {
        line.push_str(&format!(" re #{parent}"));
    }
    if let Some(body) = &post.body {
        line.push(' ');
        line.push_str(body);
    }
    if let (Some(options), Some(tally)) = (&post.poll, &post.poll_tally) {
        let choices: Vec<String> = options
            .iter()
            .zip(tally)
            .map(|(option, count)| format!("{option}: {count}"))
            .collect();
        line.push_str(&format!(" (poll: {})", choices.join(", ")));
    }
    for attachment in &post.attachments {
        line.push_str(&format!(" <{}>", attachment.url));
    }

    line
}

async fn write_stdout(line: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::{Draft, NewPost, PostId};

    #[test]
    fn renders_reply_with_poll() {
        let mut post = Draft::prepare(
            NewPost::reply("lunch?", PostId::Ordinal(1), 1).with_poll(["tacos", "ramen"]),
        )
        .expect("draft")
        .into_post(PostId::Ordinal(2), 5);
        post.created_label = "1/2/2025 12:00".into();
        post.poll_tally = Some(vec![3, 1]);

        assert_eq!(
            render_post(&post),
            "[1/2/2025 12:00] #2 ^0 re #1 lunch? (poll: tacos: 3, ramen: 1)"
        );
    }
}
