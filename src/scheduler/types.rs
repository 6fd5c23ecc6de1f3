use crate::model::{ConstraintId, MemberId, ModelError, OccurrenceId, ShiftOccurrence};
use crate::template::TemplateId;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Options de planification
#[derive(Debug, Clone, Copy)]
pub struct PlanOptions {
    /// Effectif requis quand aucun n'est fourni pour un template.
    pub default_headcount: u32,
    /// Profondeur minimale d'historique chargée par template.
    pub history_floor: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            default_headcount: 1,
            history_floor: 0,
        }
    }
}

/// Entrées externes d'une planification : fenêtre `[start, end)`,
/// viviers de membres éligibles et effectifs par template.
#[derive(Debug, Clone)]
pub struct PlanInput {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub pools: HashMap<TemplateId, Vec<MemberId>>,
    pub headcounts: HashMap<TemplateId, u32>,
}

impl PlanInput {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            pools: HashMap::new(),
            headcounts: HashMap::new(),
        }
    }

    pub fn with_pool<I>(mut self, template: &TemplateId, members: I) -> Self
    where
        I: IntoIterator<Item = MemberId>,
    {
        self.pools
            .entry(template.clone())
            .or_default()
            .extend(members);
        self
    }

    pub fn with_headcount(mut self, template: &TemplateId, headcount: u32) -> Self {
        self.headcounts.insert(template.clone(), headcount);
        self
    }

    pub fn pool(&self, template: &TemplateId) -> &[MemberId] {
        self.pools.get(template).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn headcount(&self, template: &TemplateId, opts: PlanOptions) -> u32 {
        self.headcounts
            .get(template)
            .copied()
            .unwrap_or(opts.default_headcount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaffingStatus {
    Staffed,
    Understaffed { missing: u32 },
}

impl StaffingStatus {
    pub fn from_counts(assigned: usize, required: u32) -> Self {
        let assigned = u32::try_from(assigned).unwrap_or(u32::MAX);
        if assigned >= required {
            StaffingStatus::Staffed
        } else {
            StaffingStatus::Understaffed {
                missing: required - assigned,
            }
        }
    }

    pub fn is_understaffed(&self) -> bool {
        matches!(self, StaffingStatus::Understaffed { .. })
    }
}

/// Raison d'écarter un membre du vivier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Unavailable,
    Constraint(ConstraintId),
}

/// Décision du moteur pour un créneau.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOccurrence {
    pub occurrence: ShiftOccurrence,
    pub required: u32,
    pub status: StaffingStatus,
    /// Membres du vivier écartés, pour la résolution manuelle.
    pub rejections: Vec<(MemberId, Rejection)>,
}

/// Résultat d'une planification, dans l'ordre de traitement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanReport {
    pub entries: Vec<PlannedOccurrence>,
    /// Arrêt coopératif : `entries` est un plan partiel valide.
    pub cancelled: bool,
}

impl PlanReport {
    pub fn understaffed(&self) -> impl Iterator<Item = &PlannedOccurrence> {
        self.entries.iter().filter(|e| e.status.is_understaffed())
    }

    pub fn is_fully_staffed(&self) -> bool {
        self.understaffed().next().is_none()
    }

    /// Nombre d'affectations par membre sur ce plan.
    pub fn member_load(&self) -> BTreeMap<MemberId, usize> {
        let mut load = BTreeMap::new();
        for entry in &self.entries {
            for member in &entry.occurrence.assigned {
                *load.entry(member.clone()).or_insert(0) += 1;
            }
        }
        load
    }

    pub fn find(&self, id: &OccurrenceId) -> Option<&PlannedOccurrence> {
        self.entries.iter().find(|e| &e.occurrence.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    Unavailable,
    ConstraintViolation(ConstraintId),
    Understaffed { missing: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Absent pour un sous-effectif.
    pub member: Option<MemberId>,
    pub occurrence: OccurrenceId,
    pub kind: ConflictKind,
}

/// Drapeau d'annulation partagé ; consulté entre deux créneaux.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration invalide détectée au chargement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("template {id}: {source}")]
    Template { id: TemplateId, source: ModelError },
    #[error("template {0} is defined twice")]
    DuplicateTemplate(TemplateId),
    #[error("constraint {id}: {source}")]
    Constraint { id: ConstraintId, source: ModelError },
    #[error("constraint {constraint} references unknown template {template}")]
    UnknownTemplate {
        constraint: ConstraintId,
        template: TemplateId,
    },
    #[error("headcount for template {0} must be at least 1")]
    ZeroHeadcount(TemplateId),
    #[error("default headcount must be at least 1")]
    ZeroDefaultHeadcount,
}

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("data inconsistency: {0}")]
    DataInconsistency(String),
    #[error("invalid planning range: end must not be before start")]
    InvalidRange,
    #[error("unknown occurrence: {0}")]
    UnknownOccurrence(String),
    #[error("override invalid: {0}")]
    Override(&'static str),
    #[error("repository error: {0:#}")]
    Repository(anyhow::Error),
    #[error("commit sink error: {0:#}")]
    Sink(anyhow::Error),
}
