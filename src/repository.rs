//! Interfaces des collaborateurs externes (stockage, diffusion du plan).
//!
//! Le cœur ne dépend d'aucun moteur de stockage : tout passe par ces traits.
//! Les erreurs remontent en `anyhow::Error` et deviennent `PlanError::Repository`.

use crate::model::{Member, MemberId, MemberRequest, ShiftConstraint, ShiftOccurrence};
use crate::scheduler::StaffingStatus;
use crate::template::{ShiftTemplate, TemplateId};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

pub trait TemplateRepository {
    fn list_active(&self) -> anyhow::Result<Vec<ShiftTemplate>>;
}

pub trait ConstraintRepository {
    /// Contraintes dont `template` est le propriétaire.
    fn for_template(&self, template: &TemplateId) -> anyhow::Result<Vec<ShiftConstraint>>;
}

pub trait RequestRepository {
    /// Requêtes des membres donnés qui recoupent `[start, end)`.
    fn for_members(
        &self,
        members: &[MemberId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<MemberRequest>>;
}

pub trait HistoryRepository {
    /// Au plus `limit` créneaux de `template` commençant avant `instant`,
    /// par ordre chronologique, avec leurs membres affectés.
    fn occurrences_before(
        &self,
        template: &TemplateId,
        instant: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<Vec<ShiftOccurrence>>;
}

pub trait MemberRepository {
    fn members(&self) -> anyhow::Result<Vec<Member>>;
}

/// Reçoit chaque décision du moteur, dans l'ordre de traitement.
pub trait PlanCommitSink {
    fn commit(
        &mut self,
        occurrence: &ShiftOccurrence,
        assigned: &BTreeSet<MemberId>,
        status: StaffingStatus,
    ) -> anyhow::Result<()>;
}

impl<T: PlanCommitSink + ?Sized> PlanCommitSink for &mut T {
    fn commit(
        &mut self,
        occurrence: &ShiftOccurrence,
        assigned: &BTreeSet<MemberId>,
        status: StaffingStatus,
    ) -> anyhow::Result<()> {
        (**self).commit(occurrence, assigned, status)
    }
}

/// Collecte les créneaux validés (simulation, tests).
impl PlanCommitSink for Vec<ShiftOccurrence> {
    fn commit(
        &mut self,
        occurrence: &ShiftOccurrence,
        assigned: &BTreeSet<MemberId>,
        _status: StaffingStatus,
    ) -> anyhow::Result<()> {
        let mut occurrence = occurrence.clone();
        occurrence.assigned = assigned.clone();
        self.push(occurrence);
        Ok(())
    }
}

/// Ignore les décisions (`--dry-run`).
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl PlanCommitSink for DiscardSink {
    fn commit(
        &mut self,
        _occurrence: &ShiftOccurrence,
        _assigned: &BTreeSet<MemberId>,
        _status: StaffingStatus,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
