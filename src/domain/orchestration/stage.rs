use std::fmt;

/// Coarse life-cycle stage shared by every task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStage {
    Created,
    Started,
    Finished,
    Failed,
}

impl TaskStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStage::Finished | TaskStage::Failed)
    }
}

/// Fine-grained step within a task kind. Declaration order is the transition order.
pub trait SubStage: Copy + fmt::Debug + PartialEq + Send + Sync + 'static {
    fn ordinal(&self) -> usize;

    /// Transient sub-stages are only passed through while waiting on an asynchronous operation.
    fn is_transient(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTransition<S> {
    pub stage: TaskStage,
    pub sub_stage: S,
}

impl<S: SubStage> StageTransition<S> {
    pub fn started(sub_stage: S) -> Self {
        Self { stage: TaskStage::Started, sub_stage }
    }

    pub fn finished(sub_stage: S) -> Self {
        Self { stage: TaskStage::Finished, sub_stage }
    }

    pub fn failed(sub_stage: S) -> Self {
        Self { stage: TaskStage::Failed, sub_stage }
    }

    /// True if moving from `self` to `next` would go back in the sub-stage order of a running task.
    pub fn is_regression_to(&self, next: &StageTransition<S>) -> bool {
        self.stage == TaskStage::Started && next.stage == TaskStage::Started && next.sub_stage.ordinal() < self.sub_stage.ordinal()
    }
}

impl<S: fmt::Debug> fmt::Display for StageTransition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?})", self.stage, self.sub_stage)
    }
}

/// Target of the structured stage transition events.
pub const TRANSITION_TARGET: &str = "composition_transitions";

/// Emits one structured transition event.
pub fn log_transition<S: SubStage>(task: &str, kind: &'static str, from: &StageTransition<S>, to: &StageTransition<S>) {
    tracing::debug!(
        target: TRANSITION_TARGET,
        task = %task,
        kind = kind,
        from = %from,
        to = %to,
        transient = to.sub_stage.is_transient(),
        "stage transition"
    );
}
