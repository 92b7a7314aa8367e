//! The memory core of a conversational assistant: spaced-repetition
//! dynamics, contradiction-aware ingestion, sentiment and topic
//! tracking, and bounded context assembly.

mod contradiction;
pub use contradiction::{
  ContradictionDetector, ContradictionKind, ContradictionVerdict, has_common_context, jaccard,
};

mod dynamics;
pub use dynamics::{AccessEvent, MemoryDynamics, SupersessionRecord};

mod emotional;
pub use emotional::{
  ArcEnergy, ArcTrend, EmotionalArc, EmotionalContext, SentimentEntry, analyze_sentiment,
};

mod extract;
pub use extract::{
  EntityExtraction, EntityExtractor, ExtractedEntity, ExtractedRelationship, FactExtractor,
  TopicExtractor,
};

mod fsrs;
pub use fsrs::{
  DEFAULT_WEIGHTS, Fsrs, FsrsState, FsrsWeights, Grade, ReviewOutcome, SignalType,
};

mod ingest;
pub use ingest::{IngestResult, SmartIngest, classify_category};

mod memory;
pub use memory::{
  EmotionalWeight, MemoryCategory, MemoryContext, MemoryRecord, MemoryType, SupersessionReason,
  TopicMention, TopicType, payload_keys,
};

mod recurrence;
pub use recurrence::TopicRecurrence;

mod scorer;
pub use scorer::{CompositeScorer, RankCandidate, ScoredMemory};

mod service;
pub use service::{MemoryProviders, MemoryService};

pub mod store;

#[cfg(test)]
mod testing;
