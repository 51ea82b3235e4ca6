//! Search orchestrator: fan-out, fusion, ranking and the end-to-end pipeline.
//!
//! [`ResearchAggregator`] drives one request through intent classification,
//! source selection, concurrent fan-out to source adapters, cross-source
//! fusion and ranking, with a response cache in front.

pub mod aggregate;
pub mod fanout;
pub mod fusion;
pub mod normalize;
pub mod ranking;

pub use aggregate::{ResearchAggregator, SearchRequest};
pub use fanout::FanOutExecutor;
pub use fusion::fuse;
pub use ranking::Ranker;
