//! Application layer: use cases and trait seams.
//!
//! Code here depends only on domain types and traits; socket handling and
//! other infrastructure implementations are injected at construction time,
//! keeping every use case unit-testable.

pub mod acquisition;
pub mod broadcast;
pub mod dispatch;
pub mod registry;
