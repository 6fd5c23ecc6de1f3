use super::{util, Conflict, ConflictKind, PlannedOccurrence, StaffingStatus};
use crate::availability::AvailabilityIndex;
use crate::constraint::ConstraintTable;
use crate::history::HistoryTracker;

/// Rejoue `entries` dans l'ordre de traitement à partir de `baseline`
/// et liste indisponibilités, contraintes violées et sous-effectifs.
///
/// Sert à vérifier un plan modifié à la main ou des créneaux déjà stockés.
pub fn audit(
    entries: &[PlannedOccurrence],
    constraints: &ConstraintTable,
    availability: &AvailabilityIndex,
    baseline: &HistoryTracker,
) -> Vec<Conflict> {
    let mut history = baseline.clone();
    let mut ordered: Vec<&PlannedOccurrence> = entries.iter().collect();
    ordered.sort_by(|a, b| util::processing_order(&a.occurrence, &b.occurrence));

    let mut out = Vec::new();
    for entry in ordered {
        let occurrence = &entry.occurrence;
        let interval = occurrence.interval();

        for member in &occurrence.assigned {
            if !availability.is_available(member, &interval) {
                out.push(Conflict {
                    member: Some(member.clone()),
                    occurrence: occurrence.id.clone(),
                    kind: ConflictKind::Unavailable,
                });
            }
            if let Some(violated) = constraints.first_violation(member, occurrence, &history) {
                out.push(Conflict {
                    member: Some(member.clone()),
                    occurrence: occurrence.id.clone(),
                    kind: ConflictKind::ConstraintViolation(violated.id.clone()),
                });
            }
        }

        if let StaffingStatus::Understaffed { missing } =
            StaffingStatus::from_counts(occurrence.assigned.len(), entry.required)
        {
            out.push(Conflict {
                member: None,
                occurrence: occurrence.id.clone(),
                kind: ConflictKind::Understaffed { missing },
            });
        }

        history.record(occurrence);
    }

    out
}
