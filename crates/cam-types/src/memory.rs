//! Memory types for CAM.
//!
//! These types model the semantic memory: persisted records written by the
//! write gate, the metadata stored alongside them, and the transient
//! candidates produced by a retrieval query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Current on-disk layout version of a memory record.
pub const SCHEMA_VERSION: u32 = 2;

/// What a prompt is trying to do.
///
/// Drives both the retrieval mode and the persistence decision:
/// only `Fact` prompts ever become memory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Adds new personal or contextual information.
    Fact,
    /// Asks for knowledge.
    Query,
    /// Refers to previous messages, timestamps, or the memory itself.
    Meta,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Fact => write!(f, "fact"),
            Intent::Query => write!(f, "query"),
            Intent::Meta => write!(f, "meta"),
        }
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fact" => Ok(Intent::Fact),
            "query" => Ok(Intent::Query),
            "meta" => Ok(Intent::Meta),
            other => Err(format!("invalid intent: '{other}'")),
        }
    }
}

/// Closed tag vocabulary assigned to a record at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTag {
    Refund,
    Complaint,
    Review,
    Fact,
    Question,
    Instruction,
    /// No tag clearly applies.
    #[serde(rename = "NONE")]
    None,
}

impl MemoryTag {
    /// Every tag, in the order offered to the tagger.
    pub const ALL: [MemoryTag; 7] = [
        MemoryTag::Refund,
        MemoryTag::Complaint,
        MemoryTag::Review,
        MemoryTag::Fact,
        MemoryTag::Question,
        MemoryTag::Instruction,
        MemoryTag::None,
    ];
}

impl fmt::Display for MemoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryTag::Refund => write!(f, "refund"),
            MemoryTag::Complaint => write!(f, "complaint"),
            MemoryTag::Review => write!(f, "review"),
            MemoryTag::Fact => write!(f, "fact"),
            MemoryTag::Question => write!(f, "question"),
            MemoryTag::Instruction => write!(f, "instruction"),
            MemoryTag::None => write!(f, "NONE"),
        }
    }
}

impl FromStr for MemoryTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "refund" => Ok(MemoryTag::Refund),
            "complaint" => Ok(MemoryTag::Complaint),
            "review" => Ok(MemoryTag::Review),
            "fact" => Ok(MemoryTag::Fact),
            "question" => Ok(MemoryTag::Question),
            "instruction" => Ok(MemoryTag::Instruction),
            "none" => Ok(MemoryTag::None),
            other => Err(format!("invalid memory tag: '{other}'")),
        }
    }
}

/// Which slice of memory a retrieval may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Fact-only, tight threshold. Used for ongoing conversation.
    Continuity,
    /// Unfiltered, looser threshold. Used for explicit recall questions.
    Global,
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalMode::Continuity => write!(f, "continuity"),
            RetrievalMode::Global => write!(f, "global"),
        }
    }
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continuity" => Ok(RetrievalMode::Continuity),
            "global" => Ok(RetrievalMode::Global),
            other => Err(format!("invalid retrieval mode: '{other}'")),
        }
    }
}

/// Metadata stored with every memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// When the record was written.
    pub timestamp: DateTime<Utc>,
    pub tag: MemoryTag,
    pub intent: Intent,
    /// The original prompt, verbatim.
    pub user_prompt: String,
    /// Whether the continuity decider saw this prompt as on-topic.
    pub topic_continued: bool,
    pub schema_version: u32,
    /// Name of the embedding model that produced the vector.
    pub embedding_model: String,
    /// One lowercase word, or `unknown`.
    #[serde(default)]
    pub topic: String,
    /// Provider and model that answered the turn.
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    /// Times this record was returned by retrieval.
    #[serde(default)]
    pub access_count: u32,
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// The unit of persisted knowledge.
///
/// Created only by the write gate's accept decision. `id` and `embedding`
/// never change once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    /// The user's own utterance.
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: MemoryMetadata,
}

/// A stored record without its vector, for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMemory {
    pub id: Uuid,
    pub text: String,
    pub metadata: MemoryMetadata,
}

impl From<&MemoryRecord> for StoredMemory {
    fn from(record: &MemoryRecord) -> Self {
        Self {
            id: record.id,
            text: record.text.clone(),
            metadata: record.metadata.clone(),
        }
    }
}

/// A transient query hit. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub id: Uuid,
    pub text: String,
    /// Cosine distance from the query embedding (0 = identical).
    pub distance: f32,
    pub metadata: MemoryMetadata,
}

/// Store-side metadata predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFilter {
    /// Only records written with this intent.
    pub intent: Option<Intent>,
}

impl MemoryFilter {
    /// Restrict to records with the given intent.
    pub fn intent(intent: Intent) -> Self {
        Self {
            intent: Some(intent),
        }
    }

    /// The filter a retrieval mode applies.
    pub fn for_mode(mode: RetrievalMode) -> Option<Self> {
        match mode {
            RetrievalMode::Continuity => Some(Self::intent(Intent::Fact)),
            RetrievalMode::Global => None,
        }
    }

    /// Evaluate the predicate against a record's metadata.
    pub fn matches(&self, metadata: &MemoryMetadata) -> bool {
        self.intent.is_none_or(|intent| metadata.intent == intent)
    }
}
