pub mod feedback;

pub use feedback::{
    AiProvider, AnalysisSource, Department, Feedback, FeedbackInput, Priority,
    ReconciliationEvent, ResolutionRequest, Sentiment, TicketStatus,
};
