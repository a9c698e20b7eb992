//! Semantic search over style-code fingerprints.
//!
//! Every style code is represented by the average CLIP embedding of its
//! images. Queries are embedded into the same space and ranked by cosine
//! similarity.
//!
//! # Architecture
//!
//! - `encoder`: Wraps fastembed's CLIP text and image models; caption sources
//! - `store`: Validated, read-only fingerprint store loaded from JSON
//! - `ranker`: Exact cosine ranking with deterministic tie-breaking
//! - `service`: Text and similar-code search over a swappable store
//! - `page`: Offset/limit paging for service boundaries
//! - `themes`: Caption summaries and the `Key themes:` format
//! - `fingerprint`: Embedding averaging used when building the index

pub mod encoder;
pub mod fingerprint;
mod page;
mod ranker;
mod service;
mod store;
pub mod themes;

pub use encoder::{
    Captioner, ClipEncoder, EncoderError, QueryEncoder, SidecarCaptioner, DEFAULT_ENCODER_MODEL,
};
pub use page::{Page, PageRequest, DEFAULT_PAGE_SIZE};
pub use ranker::{cosine_similarity, ExactRanker, RankError, Ranked, Ranker};
pub use service::{
    check_dimensions, QueryResult, SearchError, SearchService, SimilarSearch, TextSearch,
};
pub use store::{EmbeddingStore, StoreError, StyleEntry};
