use thiserror::Error;

/// Outcome of applying an action to a workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// The action is a replay of something that already happened.
    Unchanged,
    To(S),
}

#[derive(Debug, Error)]
#[error("unknown {entity} value: {value}")]
pub struct UnknownVariant {
    pub entity: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(entity: &'static str, value: impl Into<String>) -> Self {
        Self { entity, value: value.into() }
    }
}
