//! Core search-engine library: term normalization, sharded indexing,
//! bucket merging, persistence, and BM25 query answering.

pub mod classify;
pub mod index;
pub mod merge;
pub mod normalize;
pub mod persist;
pub mod rank;
pub mod search;
pub mod source;
pub mod stopwords;

pub use classify::NumberFormat;
pub use index::{CityEnrich, CityIndex, CityMetadata, DocRecord, NoEnrich, ShardIndex};
pub use normalize::Parser;
pub use persist::{DictEntry, IndexPaths, MetaFile, TermLine};
pub use rank::{Appearances, Ranker};
pub use search::{
    NeighborFile, NoSimilarity, SearchOptions, SearchOutput, Searcher, Similarity,
};
pub use source::{DocTextSource, JsonlSource, SourceDoc};
