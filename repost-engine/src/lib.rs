//! # repost-engine
//!
//! Content matching and repost scheduling.
//!
//! **Pipeline:** Trigger Gate → Eligibility Selector → Slot Allocator →
//! Repost Queue, run by the `CycleOrchestrator` on a periodic and on-demand
//! basis. Publication workers drain the queue through its transition API.
//! The `FingerprintMatcher` recognizes known media by content identity.

pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod types;
pub mod utils;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use services::{
    CaptionGenerator, CycleOrchestrator, EligibilitySelector, FingerprintMatcher, PeriodicTask,
    PostingTimeAdvisor, PublicationWorker, Publisher, RepostQueue, SlotAllocator, TriggerGate,
};
pub use types::{
    AllocationResult, ClaimOutcome, CycleMode, CycleOutcome, CycleReport, MatchKind, MatchResult,
    PlatformStatus, PreferredSlot, RepostCandidate,
};
