//! Historique des affectations par template.
//!
//! Alimenté avant la planification par les créneaux déjà validés, puis
//! incrémentalement par le moteur après chaque créneau : une requête
//! `recent_assignees` voit toujours tout ce qui a été validé avant elle.

use crate::model::{MemberId, OccurrenceId, ShiftOccurrence};
use crate::template::TemplateId;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub occurrence: OccurrenceId,
    pub start: DateTime<Utc>,
    pub members: BTreeSet<MemberId>,
}

#[derive(Debug, Default, Clone)]
pub struct HistoryTracker {
    by_template: HashMap<TemplateId, Vec<HistoryEntry>>,
    known: HashMap<OccurrenceId, (TemplateId, DateTime<Utc>)>,
    load: HashMap<MemberId, usize>,
}

impl HistoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge des créneaux existants (ordre quelconque).
    pub fn seed<I>(&mut self, occurrences: I)
    where
        I: IntoIterator<Item = ShiftOccurrence>,
    {
        for occurrence in occurrences {
            self.record(&occurrence);
        }
    }

    /// Enregistre (ou remplace, à identifiant égal) un créneau et ses membres.
    pub fn record(&mut self, occurrence: &ShiftOccurrence) {
        self.forget(&occurrence.id);

        let entries = self
            .by_template
            .entry(occurrence.template.clone())
            .or_default();
        let pos = entries.partition_point(|e| e.start <= occurrence.start);
        entries.insert(
            pos,
            HistoryEntry {
                occurrence: occurrence.id.clone(),
                start: occurrence.start,
                members: occurrence.assigned.clone(),
            },
        );
        for member in &occurrence.assigned {
            *self.load.entry(member.clone()).or_insert(0) += 1;
        }
        self.known.insert(
            occurrence.id.clone(),
            (occurrence.template.clone(), occurrence.start),
        );
    }

    fn forget(&mut self, id: &OccurrenceId) {
        let Some((template, start)) = self.known.remove(id) else {
            return;
        };
        let Some(entries) = self.by_template.get_mut(&template) else {
            return;
        };
        let from = entries.partition_point(|e| e.start < start);
        let Some(offset) = entries[from..]
            .iter()
            .take_while(|e| e.start == start)
            .position(|e| &e.occurrence == id)
        else {
            return;
        };
        let removed = entries.remove(from + offset);
        for member in &removed.members {
            if let Some(count) = self.load.get_mut(member) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Union des membres des `count` derniers créneaux de `template`
    /// commençant strictement avant `before`. Moins de `count` : on prend tout.
    pub fn recent_assignees(
        &self,
        template: &TemplateId,
        before: DateTime<Utc>,
        count: usize,
    ) -> BTreeSet<MemberId> {
        self.recent(template, before, count)
            .iter()
            .flat_map(|e| e.members.iter().cloned())
            .collect()
    }

    /// Vrai si `member` figure dans la fenêtre décrite par `recent_assignees`.
    pub fn assigned_within(
        &self,
        member: &MemberId,
        template: &TemplateId,
        before: DateTime<Utc>,
        count: usize,
    ) -> bool {
        self.recent(template, before, count)
            .iter()
            .any(|e| e.members.contains(member))
    }

    /// Vrai si `member` est affecté à un créneau de `template` commençant
    /// exactement à `at`, autre que `except`.
    pub fn assigned_at(
        &self,
        member: &MemberId,
        template: &TemplateId,
        at: DateTime<Utc>,
        except: &OccurrenceId,
    ) -> bool {
        let Some(entries) = self.by_template.get(template) else {
            return false;
        };
        let from = entries.partition_point(|e| e.start < at);
        entries[from..]
            .iter()
            .take_while(|e| e.start == at)
            .any(|e| &e.occurrence != except && e.members.contains(member))
    }

    fn recent(&self, template: &TemplateId, before: DateTime<Utc>, count: usize) -> &[HistoryEntry] {
        let Some(entries) = self.by_template.get(template) else {
            return &[];
        };
        let upper = entries.partition_point(|e| e.start < before);
        &entries[upper.saturating_sub(count)..upper]
    }

    /// Nombre d'affectations connues (historique + planification en cours).
    pub fn assignment_count(&self, member: &MemberId) -> usize {
        self.load.get(member).copied().unwrap_or(0)
    }

    pub fn occurrences(&self, template: &TemplateId) -> &[HistoryEntry] {
        self.by_template
            .get(template)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
