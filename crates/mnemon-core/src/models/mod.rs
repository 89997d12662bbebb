mod chunk;
mod connector;
mod document;
mod extraction;
mod graph;
mod history;
mod job;
mod memory;
mod parsed;
mod proposal;
mod session;

pub use chunk::{Chunk, ChunkType};
pub use connector::{Connector, ConnectorStatus};
pub use document::{Document, DocumentMemory, DocumentStatus};
pub use extraction::{ExtractedItem, ExtractedRelation, ExtractionResult, Generation, TokenUsage};
pub use graph::{canonicalize_entity_name, Entity, EntityMention, Relation};
pub use history::{HistoryEvent, HistoryRecord};
pub use job::{Job, JobStatus, JobType};
pub use memory::{compute_content_hash, normalize_content, ExtractionStatus, Memory, MemoryType};
pub use parsed::{ContentType, ParsedDocument, ParsedSection};
pub use proposal::{JobReport, Proposal, ProposalAction, WriteStats};
pub use session::{SessionMemory, SessionScore};
