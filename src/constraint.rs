use crate::history::HistoryTracker;
use crate::model::{MemberId, ShiftConstraint, ShiftOccurrence};
use crate::scheduler::ConfigError;
use crate::template::{ShiftTemplate, TemplateId};
use std::collections::{HashMap, HashSet};

/// Table `template -> contraintes` : les contraintes référencent les
/// templates par identifiant, sans jamais les posséder.
#[derive(Debug, Default, Clone)]
pub struct ConstraintTable {
    by_template: HashMap<TemplateId, Vec<ShiftConstraint>>,
    total: usize,
}

impl ConstraintTable {
    /// Valide chaque contrainte contre les templates connus.
    pub fn build<I>(templates: &[ShiftTemplate], constraints: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = ShiftConstraint>,
    {
        let known: HashSet<&TemplateId> = templates.iter().map(|t| &t.id).collect();
        let mut table = Self::default();
        for constraint in constraints {
            constraint
                .validate()
                .map_err(|source| ConfigError::Constraint {
                    id: constraint.id.clone(),
                    source,
                })?;
            for end in [&constraint.template, &constraint.linked] {
                if !known.contains(end) {
                    return Err(ConfigError::UnknownTemplate {
                        constraint: constraint.id.clone(),
                        template: end.clone(),
                    });
                }
            }
            table
                .by_template
                .entry(constraint.template.clone())
                .or_default()
                .push(constraint);
            table.total += 1;
        }
        Ok(table)
    }

    pub fn for_template(&self, template: &TemplateId) -> &[ShiftConstraint] {
        self.by_template
            .get(template)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Plus grande fenêtre qui regarde l'historique de `linked` :
    /// profondeur d'historique à charger avant une planification.
    pub fn max_window_for_linked(&self, linked: &TemplateId) -> usize {
        self.iter()
            .filter(|c| &c.linked == linked)
            .map(|c| c.within_last_shifts as usize)
            .max()
            .unwrap_or(0)
    }

    /// Sous-table limitée aux contraintes dont le propriétaire est dans `templates`.
    pub fn restricted_to(&self, templates: &HashSet<&TemplateId>) -> ConstraintTable {
        let by_template: HashMap<TemplateId, Vec<ShiftConstraint>> = self
            .by_template
            .iter()
            .filter(|(owner, _)| templates.contains(owner))
            .map(|(owner, list)| (owner.clone(), list.clone()))
            .collect();
        let total = by_template.values().map(Vec::len).sum();
        ConstraintTable { by_template, total }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShiftConstraint> {
        self.by_template.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn first_violation<'a>(
        &'a self,
        member: &MemberId,
        occurrence: &ShiftOccurrence,
        history: &HistoryTracker,
    ) -> Option<&'a ShiftConstraint> {
        first_violation(member, occurrence, self.for_template(&occurrence.template), history)
    }

    pub fn is_allowed(
        &self,
        member: &MemberId,
        occurrence: &ShiftOccurrence,
        history: &HistoryTracker,
    ) -> bool {
        self.first_violation(member, occurrence, history).is_none()
    }
}

/// Première contrainte violée par l'affectation de `member` à `occurrence`.
///
/// ET logique : on s'arrête à la première violation.
pub fn first_violation<'a>(
    member: &MemberId,
    occurrence: &ShiftOccurrence,
    constraints: &'a [ShiftConstraint],
    history: &HistoryTracker,
) -> Option<&'a ShiftConstraint> {
    constraints.iter().find(|c| {
        history.assigned_within(
            member,
            &c.linked,
            occurrence.start,
            c.within_last_shifts as usize,
        ) || (c.same_start
            && history.assigned_at(member, &c.linked, occurrence.start, &occurrence.id))
    })
}

pub fn is_allowed(
    member: &MemberId,
    occurrence: &ShiftOccurrence,
    constraints: &[ShiftConstraint],
    history: &HistoryTracker,
) -> bool {
    first_violation(member, occurrence, constraints, history).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConstraintId, ModelError, OccurrenceId};
    use chrono::{Duration, TimeZone, Utc};

    fn template(id: &str) -> ShiftTemplate {
        ShiftTemplate::new(id, 8 * 3600, 8 * 3600, vec![0, 1, 2, 3, 4, 5, 6])
            .unwrap()
            .with_id(TemplateId::new(id))
    }

    fn occ(template: &str, day: u32, members: &[&str]) -> ShiftOccurrence {
        let start = Utc.with_ymd_and_hms(2025, 10, day, 8, 0, 0).unwrap();
        ShiftOccurrence {
            id: OccurrenceId::new(format!("{template}@{day}")),
            template: TemplateId::new(template),
            start,
            end: start + Duration::hours(8),
            assigned: members.iter().map(MemberId::new).collect(),
        }
    }

    fn constraint(owner: &str, linked: &str, within: u32) -> ShiftConstraint {
        ShiftConstraint::new(TemplateId::new(owner), TemplateId::new(linked), within).unwrap()
    }

    #[test]
    fn rejects_unknown_linked_template() {
        let err = ConstraintTable::build(&[template("a")], vec![constraint("a", "ghost", 1)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTemplate { template, .. } if template.as_str() == "ghost"));
    }

    #[test]
    fn rejects_zero_window_loaded_from_storage() {
        let bad = ShiftConstraint {
            id: ConstraintId::new("c"),
            template: TemplateId::new("a"),
            linked: TemplateId::new("a"),
            within_last_shifts: 0,
            same_start: false,
        };
        let err = ConstraintTable::build(&[template("a")], vec![bad]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Constraint { source: ModelError::NonPositiveWindow, .. }
        ));
    }

    #[test]
    fn every_attached_constraint_must_pass() {
        let table = ConstraintTable::build(
            &[template("a"), template("b")],
            vec![constraint("a", "a", 1), constraint("a", "b", 2)],
        )
        .unwrap();
        let mut history = HistoryTracker::new();
        history.record(&occ("b", 1, &["m"]));
        history.record(&occ("b", 2, &["n"]));
        history.record(&occ("a", 2, &["o"]));

        let target = occ("a", 3, &[]);
        let m = MemberId::new("m");
        let violated = table.first_violation(&m, &target, &history).unwrap();
        assert_eq!(violated.linked.as_str(), "b");
        assert!(!table.is_allowed(&MemberId::new("o"), &target, &history));
        assert!(table.is_allowed(&MemberId::new("p"), &target, &history));
        // contraintes de "b" : aucune
        assert!(table.is_allowed(&m, &occ("b", 3, &[]), &history));
    }

    #[test]
    fn same_start_constraint_sees_simultaneous_linked_shift() {
        let templates = [template("a"), template("b")];
        let plain = ConstraintTable::build(&templates, vec![constraint("b", "a", 1)]).unwrap();
        let strict = ConstraintTable::build(
            &templates,
            vec![constraint("b", "a", 1).with_same_start()],
        )
        .unwrap();
        let mut history = HistoryTracker::new();
        history.record(&occ("a", 6, &["m"]));

        let target = occ("b", 6, &[]);
        let m = MemberId::new("m");
        assert!(plain.is_allowed(&m, &target, &history));
        assert!(!strict.is_allowed(&m, &target, &history));
        assert!(strict.is_allowed(&MemberId::new("n"), &target, &history));
    }

    #[test]
    fn history_depth_follows_largest_window() {
        let table = ConstraintTable::build(
            &[template("a"), template("b")],
            vec![constraint("a", "b", 2), constraint("b", "b", 5)],
        )
        .unwrap();
        assert_eq!(table.max_window_for_linked(&TemplateId::new("b")), 5);
        assert_eq!(table.max_window_for_linked(&TemplateId::new("a")), 0);
        assert_eq!(table.len(), 2);
    }
}
