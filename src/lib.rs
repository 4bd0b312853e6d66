//! chatgpt-web — client for the ChatGPT web backend
//!
//! Talks to the cookie-authenticated web backend the browser app uses: keeps
//! the cookie jar fresh through an external supplier, refreshes the access
//! token lazily when the session goes stale, retrieves the paginated
//! conversation history with deduplication and bounded retries, and consumes
//! the streamed `text/event-stream` conversation protocol, including its
//! echo-message / title-generation side channel.
//!
//! How credentials are obtained is not this crate's business: implement
//! [`CookieSupplier`] (e.g. on top of a browser-automation login flow) and
//! hand it to [`Client::new`].

pub mod client;
pub mod config;
pub mod cookies;
pub mod error;
pub mod history;
pub mod idset;
pub mod protocol;
pub mod session;
pub mod stream;

pub use client::Client;
pub use config::Config;
pub use cookies::{Cookie, CookieStore, CookieSupplier, SameSite};
pub use error::{Error, Result};
pub use idset::{HasId, IdSet};
pub use protocol::{
    Conversation, ConversationEvent, HistoryItem, Message, ModelInfo, Role, UserAccountInfo,
};
pub use session::{Session, SessionManager, User};
pub use stream::{StreamAction, StreamParser};
