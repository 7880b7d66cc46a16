//! Query-time search over a published index.

mod service;

pub use service::{
    AnswerResponse, EnrichmentOptions, QueryService, ResultRecord, SearchResponse, ServiceState, ServiceStatus,
    VerseRecord,
};
