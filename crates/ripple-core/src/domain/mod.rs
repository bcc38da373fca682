//! Ripple domain model.
//!
//! Change events come in, dependency edges describe who cares, verdicts and
//! outcomes come out. Everything here is plain data plus validation.

pub mod edge;
pub mod error;
pub mod event;
pub mod outcome;
pub mod validation;
pub mod verdict;

pub use edge::{ConsumerPolicy, DependencyEdge, DerivativePolicy, EdgeKind, EdgePolicy};
pub use error::{
    ActuatorError, ConfigError, FetchError, OracleError, Result, RippleError, ValidationError,
};
pub use event::{ChangeEvent, ChangeKind, ChangedFile, PatternSummary};
pub use outcome::{TriageOutcome, TriageStage, TriageStatus};
pub use validation::validate_change_event;
pub use verdict::{TriageVerdict, Urgency};
