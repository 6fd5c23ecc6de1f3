use super::{
    audit, ConflictKind, PlanError, PlanReport, Scheduler, SelectionPolicy, StaffingStatus,
};
use crate::model::{MemberId, OccurrenceId};

pub(super) fn override_member<P: SelectionPolicy>(
    scheduler: &mut Scheduler<P>,
    report: &mut PlanReport,
    occurrence: &OccurrenceId,
    from: Option<&MemberId>,
    to: &MemberId,
) -> Result<(), PlanError> {
    let Some(pos) = report
        .entries
        .iter()
        .position(|e| &e.occurrence.id == occurrence)
    else {
        return Err(PlanError::UnknownOccurrence(occurrence.as_str().to_string()));
    };

    let previous = report.entries[pos].clone();
    let assigned = &previous.occurrence.assigned;
    if assigned.contains(to) {
        return Err(PlanError::Override("member already assigned"));
    }
    match from {
        Some(member) if !assigned.contains(member) => {
            return Err(PlanError::Override("member not assigned to occurrence"));
        }
        None if !previous.status.is_understaffed() => {
            return Err(PlanError::Override("occurrence already fully staffed"));
        }
        _ => {}
    }
    if !scheduler
        .availability
        .is_available(to, &previous.occurrence.interval())
    {
        return Err(PlanError::Override("target member unavailable"));
    }

    {
        let entry = &mut report.entries[pos];
        if let Some(member) = from {
            entry.occurrence.assigned.remove(member);
        }
        entry.occurrence.assigned.insert(to.clone());
        entry.status = StaffingStatus::from_counts(entry.occurrence.assigned.len(), entry.required);
    }

    let introduced = audit(
        &report.entries,
        &scheduler.constraints,
        &scheduler.availability,
        &scheduler.baseline,
    )
    .into_iter()
    .any(|c| {
        c.member.as_ref() == Some(to) && matches!(c.kind, ConflictKind::ConstraintViolation(_))
    });
    if introduced {
        report.entries[pos] = previous;
        return Err(PlanError::Override("introduces constraint violation"));
    }

    scheduler.history.record(&report.entries[pos].occurrence);
    Ok(())
}
