#![forbid(unsafe_code)]
//! Roulement : planification de gardes récurrentes, locale (sans BD).
//!
//! - Templates hebdomadaires déroulés en créneaux datés (UTC).
//! - Affectation gloutonne, chronologique, sous contraintes d'historique.
//! - Indisponibilités des membres, sous-effectif signalé sans erreur.
//! - Stockage fichiers (JSON/CSV), export ICS.

#[macro_use]
mod logging;

pub mod availability;
pub mod calendar;
pub mod constraint;
pub mod history;
pub mod io;
pub mod model;
pub mod repository;
pub mod scheduler;
pub mod storage;
pub mod template;

pub use availability::AvailabilityIndex;
pub use calendar::{export_all_members_ics, CalendarRenderer, IcsRenderer};
pub use constraint::ConstraintTable;
pub use history::HistoryTracker;
pub use model::{
    Interval, Member, MemberGroup, MemberGroupId, MemberId, MemberRequest, ModelError,
    OccurrenceId, ShiftConstraint, ShiftOccurrence,
};
pub use repository::{DiscardSink, PlanCommitSink};
pub use scheduler::{
    CancelToken, ConfigError, Conflict, ConflictKind, PlanError, PlanInput, PlanOptions,
    PlanReport, PlannedOccurrence, Scheduler, StaffingStatus,
};
pub use storage::{Dataset, JsonStorage, Staffing, Storage};
pub use template::{derive_overlap_constraints, expand, ShiftTemplate, TemplateId};
