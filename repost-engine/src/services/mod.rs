//! Engine services
//!
//! Matching, selection, gating, allocation and queueing, plus the
//! orchestrator and periodic tasks that drive them.

pub mod collaborators;
pub mod cycle_orchestrator;
pub mod eligibility_selector;
pub mod fingerprint_matcher;
pub mod publication_worker;
pub mod repost_queue;
pub mod scheduler;
pub mod slot_allocator;
pub mod trigger_gate;

pub use collaborators::{
    CaptionGenerator, FallbackCaptionGenerator, FixedGridAdvisor, PostingTimeAdvisor, Publisher,
};
pub use cycle_orchestrator::CycleOrchestrator;
pub use eligibility_selector::EligibilitySelector;
pub use fingerprint_matcher::FingerprintMatcher;
pub use publication_worker::{DrainReport, PublicationWorker};
pub use repost_queue::RepostQueue;
pub use scheduler::PeriodicTask;
pub use slot_allocator::SlotAllocator;
pub use trigger_gate::{GateDecision, TriggerGate};
