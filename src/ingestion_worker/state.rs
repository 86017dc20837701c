/// Where a single recording is in the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Discovering,
    GuardChecking,
    Generating,
    Filtering,
    Persisting,
    Done,
    Skipped,
    Failed,
}

impl RecordingState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordingState::Done | RecordingState::Skipped | RecordingState::Failed
        )
    }

    pub fn can_transition_to(&self, next: RecordingState) -> bool {
        use RecordingState::*;
        matches!(
            (self, next),
            (Discovering, GuardChecking)
                | (Discovering, Skipped)
                | (Discovering, Failed)
                | (GuardChecking, Generating)
                | (GuardChecking, Skipped)
                | (GuardChecking, Failed)
                | (Generating, Filtering)
                | (Generating, Failed)
                | (Filtering, Persisting)
                | (Persisting, Done)
                | (Persisting, Failed)
        )
    }
}
