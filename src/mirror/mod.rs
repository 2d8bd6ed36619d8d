// src/mirror/mod.rs
// =============================================================================
// Everything that touches the mirrored tree on disk.
//
// Submodules:
// - path: URL -> local file path
// - store: atomic writes and content categories
// - markup: lossless HTML tokenizer used by the rewrite pass
// - rewrite: strips the site origin from links in persisted HTML
// - verify: checks that every local reference resolves to a file
// =============================================================================

mod markup;
mod path;
mod rewrite;
mod store;
mod verify;

pub use path::{PathMapper, DEFAULT_DOCUMENT};
pub use rewrite::{rewrite_files, rewrite_tree, RewriteRule, RewriteSummary};
pub use store::{ContentCategory, LocalAsset};
pub use verify::{verify_tree, VerifyReport};
