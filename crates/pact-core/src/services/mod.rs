//! Session-scoped services shared by every client.

mod session;
mod store;

pub use session::SyncSession;
pub use store::LocalStore;
