//! # services
//!
//! Repositories and the `Forum` facade for the content layer. Everything
//! here talks to storage through `domains::ContentStore` only.

mod comments;
mod forum;
mod likes;
mod notifier;
mod records;
mod tags;
mod threads;
mod users;

pub use comments::CommentRepository;
pub use forum::Forum;
pub use likes::LikeLedger;
pub use notifier::ChangeNotifier;
pub use tags::TagRegistry;
pub use threads::ThreadRepository;
pub use users::UserDirectory;
