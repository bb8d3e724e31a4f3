//! Cross-referencing: finding entities that describe the same thing.
//!
//! [`Blocker`] groups entities sharing a phonetic token of one of their
//! names, a [`Scorer`] compares the members of each block pairwise, and
//! [`get_candidates`] filters the resulting edges. Confirmed matches go back
//! into the store through [`apply`] and [`apply_to_store`].

mod apply;
mod blocking;
mod score;
mod search;
mod xref;

pub mod error;

pub use apply::{
  CanonicalMode, PLACEHOLDER_PREFIX, apply, apply_to_store, is_placeholder,
  positive_pairs,
};
pub use blocking::{Block, Blocker, LOAD_CHUNK_SIZE};
pub use error::{Error, Result};
pub use score::{NameScorer, Score, Scorer};
pub use search::{DEFAULT_SEARCH_LIMIT, Hit, SchemaGuess, Search, guess_schema};
pub use xref::{Candidate, XrefResult, get_candidates, xref};
