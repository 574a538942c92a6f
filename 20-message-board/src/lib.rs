//! Message board backend.
//!
//! Clients submit posts (optionally replies, optionally with up to four
//! attachments and a poll), read the whole board or only what is new since a
//! cursor, and bump upvotes and poll tallies. The same contract runs on
//! process memory, on Redis, or on both. Each module owns one concern:
//!
//! - [`post`] is the data model and the create-time normalization.
//! - [`id`] allocates post ids and strictly increasing creation instants.
//! - [`attachment`] turns uploaded-asset metadata into attachment records.
//! - [`poll`] validates and applies upvotes and poll votes.
//! - [`cursor`] defines the "new since" sync protocol for server and client.
//! - [`thread`] places replies relative to their parent in the listing.
//! - [`store`] holds the [`store::PostStore`] trait and its backends.
//! - [`assets`] uploads attachment bytes to local disk or a cloud bucket.
//! - [`server`] exposes the board over HTTP.
//! - [`client`] follows a running board from the terminal.
//! - [`cli`] parses the command line for both modes.
//!
//! Unit tests live next to each module; the `tests/` directory drives the
//! stores and the HTTP surface through the public API.

pub mod assets;
pub mod attachment;
pub mod cli;
pub mod client;
pub mod cursor;
pub mod error;
pub mod id;
pub mod poll;
pub mod post;
pub mod server;
pub mod store;
pub mod thread;
