//! OneBot message model.
//!
//! # Data Flow
//! ```text
//! text frame
//!     → parsed.rs (verbatim field map + typed projection + content)
//!     → filter engine (read-only, may request a rewrite)
//!     → rewrite.rs (replace `message` / `raw_message`, re-serialize)
//!     → text frame
//! ```
//!
//! # Design Decisions
//! - Unparseable events are relayed unfiltered (fail-open)
//! - No generic JSON mutation; exactly two fields are writable

pub mod parsed;
pub mod rewrite;

pub use parsed::{Content, MessageFormat, MessageType, ParseError, ParsedMessage, Segment};
pub use rewrite::ContentDelta;
