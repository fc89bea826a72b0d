//! Persisted layout of the forum in the content store.
//!
//! ```text
//! threads/{threadId}                       thread record
//! threads/{threadId}/likedBy/{handle}      true
//! threads/{threadId}/comments/{commentId}  comment record
//! tags/{tagId}                             {id, name}
//! tagIndex/{matchKeyDigest}                tagId
//! postTags/{threadId}/{tagId}              true
//! users/{handle}                           user record
//! users/{handle}/likedThreads/{threadId}   true
//! ```

use crate::models::{CommentId, Handle, TagId, ThreadId};
use crate::ports::StorePath;

pub const THREADS: &str = "threads";
pub const TAGS: &str = "tags";
pub const TAG_INDEX: &str = "tagIndex";
pub const POST_TAGS: &str = "postTags";
pub const USERS: &str = "users";

pub fn threads() -> StorePath {
    StorePath::root().child(THREADS)
}

pub fn thread(id: &ThreadId) -> StorePath {
    threads().child(id)
}

pub fn thread_field(id: &ThreadId, field: &str) -> StorePath {
    thread(id).child(field)
}

pub fn thread_likes(id: &ThreadId) -> StorePath {
    thread(id).child("likedBy")
}

pub fn thread_like(id: &ThreadId, handle: &Handle) -> StorePath {
    thread_likes(id).child(handle.as_str())
}

pub fn comments(thread_id: &ThreadId) -> StorePath {
    thread(thread_id).child("comments")
}

pub fn comment(thread_id: &ThreadId, comment_id: &CommentId) -> StorePath {
    comments(thread_id).child(comment_id)
}

pub fn tags() -> StorePath {
    StorePath::root().child(TAGS)
}

pub fn tag(id: &TagId) -> StorePath {
    tags().child(id)
}

pub fn tag_index(digest: &str) -> StorePath {
    StorePath::root().child(TAG_INDEX).child(digest)
}

pub fn post_tags(thread_id: &ThreadId) -> StorePath {
    StorePath::root().child(POST_TAGS).child(thread_id)
}

pub fn post_tag(thread_id: &ThreadId, tag_id: &TagId) -> StorePath {
    post_tags(thread_id).child(tag_id)
}

pub fn users() -> StorePath {
    StorePath::root().child(USERS)
}

pub fn user(handle: &Handle) -> StorePath {
    users().child(handle.as_str())
}

pub fn user_field(handle: &Handle, field: &str) -> StorePath {
    user(handle).child(field)
}

pub fn user_liked_thread(handle: &Handle, thread_id: &ThreadId) -> StorePath {
    user(handle).child("likedThreads").child(thread_id)
}
