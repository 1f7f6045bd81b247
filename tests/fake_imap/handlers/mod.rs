//! IMAP command handlers for the fake server.
//!
//! Each handler lives in its own module and processes a single IMAP
//! command (CAPABILITY, AUTHENTICATE, NOOP, EXAMINE, UID SEARCH, UID
//! FETCH, LOGOUT). There is no LIST/LOGIN/STORE/COPY/EXPUNGE handler:
//! the gateway's IMAP client only ever opens a folder read-only and
//! fetches messages, it never lists folders, authenticates with a
//! plaintext password, or mutates anything.

mod authenticate;
mod capability;
mod examine;
mod logout;
mod noop;
mod uid_fetch;
mod uid_search;

pub use authenticate::handle_authenticate;
pub use capability::handle_capability;
pub use examine::handle_examine;
pub use logout::handle_logout;
pub use noop::handle_noop;
pub use uid_fetch::handle_uid_fetch;
pub use uid_search::handle_uid_search;
