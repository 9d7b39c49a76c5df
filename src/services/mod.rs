pub mod alert;
pub mod heuristic;
pub mod ingestion;
pub mod llm;
pub mod orchestrator;
pub mod reconciliation;
pub mod scheduler;
pub mod store;

pub use alert::AlertNotifier;
pub use ingestion::IngestionPipeline;
pub use llm::LlmClient;
pub use orchestrator::RaceOrchestrator;
pub use reconciliation::ReconciliationWorker;
pub use scheduler::start_reconciliation_scheduler;
pub use store::FeedbackStore;
