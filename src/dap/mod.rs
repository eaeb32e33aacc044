//! Debug adapter protocol plumbing.
//!
//! One adapter connection consists of a framing codec, a writer task that
//! drains outbound messages, a reader task that classifies inbound ones, and
//! a [`client::DapClient`] correlating requests with their responses.
//!
//! - `codec`: `Content-Length` framing over [`tokio_util::codec`].
//! - `message`: request/response/event envelope.
//! - `pending`: sequence-number correlation table.
//! - `events`: last-event-per-name broadcast cache.
//! - `client`: correlation engine handle shared by controllers.
//! - `reader` / `writer`: the two transport tasks.
//! - `reverse`: replies to adapter-initiated requests.
//! - `spawner` / `connector`: adapter process lifecycle.

pub mod client;
pub mod codec;
pub mod connector;
pub mod events;
pub mod message;
pub mod pending;
pub mod reader;
pub mod reverse;
pub mod spawner;
pub mod writer;
