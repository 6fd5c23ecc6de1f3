use super::selection::SelectionPolicy;
use super::{
    util, CancelToken, PlanError, PlanInput, PlanOptions, PlanReport, PlannedOccurrence,
    Rejection, StaffingStatus,
};
use crate::availability::AvailabilityIndex;
use crate::constraint::ConstraintTable;
use crate::history::HistoryTracker;
use crate::model::{MemberId, ShiftOccurrence};
use crate::template::ShiftTemplate;
use std::collections::HashSet;

/// Vue en lecture seule du snapshot, partageable entre threads.
pub(super) struct Workspace<'a, P> {
    pub templates: &'a [ShiftTemplate],
    pub constraints: &'a ConstraintTable,
    pub availability: &'a AvailabilityIndex,
    pub policy: &'a P,
    pub options: PlanOptions,
}

/// Parcours glouton chronologique : chaque créneau est validé dans
/// l'historique avant de passer au suivant, sans retour arrière.
pub(super) fn plan_occurrences<P, F>(
    ws: &Workspace<'_, P>,
    history: &mut HistoryTracker,
    input: &PlanInput,
    cancel: &CancelToken,
    mut on_commit: F,
) -> Result<PlanReport, PlanError>
where
    P: SelectionPolicy,
    F: FnMut(&PlannedOccurrence) -> Result<(), PlanError>,
{
    let mut report = PlanReport::default();

    for mut occurrence in util::planned_occurrences(ws.templates, input.start, input.end) {
        if cancel.is_cancelled() {
            plan_info!(
                committed = report.entries.len(),
                next = %occurrence.id,
                "planning cancelled"
            );
            report.cancelled = true;
            break;
        }

        let required = input.headcount(&occurrence.template, ws.options);
        let (candidates, rejections) =
            screen(ws, history, &occurrence, input.pool(&occurrence.template));
        let chosen = ws.policy.select(candidates, required as usize, history);
        occurrence.assigned = chosen.into_iter().take(required as usize).collect();

        let status = StaffingStatus::from_counts(occurrence.assigned.len(), required);
        history.record(&occurrence);

        let entry = PlannedOccurrence {
            occurrence,
            required,
            status,
            rejections,
        };
        match entry.status {
            StaffingStatus::Staffed => plan_debug!(
                occurrence = %entry.occurrence.id,
                assigned = entry.occurrence.assigned.len(),
                "occurrence staffed"
            ),
            StaffingStatus::Understaffed { .. } => plan_warn!(
                occurrence = %entry.occurrence.id,
                status = ?entry.status,
                rejected = entry.rejections.len(),
                "occurrence understaffed"
            ),
        }
        on_commit(&entry)?;
        report.entries.push(entry);
    }

    Ok(report)
}

/// Vivier ∩ disponibles ∩ contraintes, dans cet ordre.
fn screen<P>(
    ws: &Workspace<'_, P>,
    history: &HistoryTracker,
    occurrence: &ShiftOccurrence,
    pool: &[MemberId],
) -> (Vec<MemberId>, Vec<(MemberId, Rejection)>) {
    let interval = occurrence.interval();
    let mut seen = HashSet::new();
    let mut candidates = Vec::with_capacity(pool.len());
    let mut rejections = Vec::new();

    for member in pool.iter().filter(|m| seen.insert(*m)) {
        if !ws.availability.is_available(member, &interval) {
            plan_debug!(occurrence = %occurrence.id, member = %member, "member unavailable");
            rejections.push((member.clone(), Rejection::Unavailable));
            continue;
        }
        if let Some(violated) = ws.constraints.first_violation(member, occurrence, history) {
            plan_debug!(
                occurrence = %occurrence.id,
                member = %member,
                constraint = %violated.id,
                "constraint violated"
            );
            rejections.push((member.clone(), Rejection::Constraint(violated.id.clone())));
            continue;
        }
        candidates.push(member.clone());
    }

    (candidates, rejections)
}
