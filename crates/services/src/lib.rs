#![forbid(unsafe_code)]

pub mod cycle;
pub mod error;
pub mod subject_service;

pub use cycle_core::Clock;

pub use cycle::{
    CycleOverview, CycleService, GeneratedCycle, ItemPatch, SyncOutcome, order_for_display,
    overview, subject_overview,
};
pub use error::{CycleServiceError, SubjectServiceError};
pub use subject_service::SubjectService;
