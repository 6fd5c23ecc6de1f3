use super::PlannedOccurrence;
use crate::model::ShiftOccurrence;
use crate::template::{expand, ShiftTemplate};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::cmp::Ordering;

/// Ordre de traitement : début, puis identifiant du template ; le tri est
/// stable, l'ordre d'insertion départage le reste.
pub(super) fn processing_order(a: &ShiftOccurrence, b: &ShiftOccurrence) -> Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| a.template.cmp(&b.template))
}

/// Tous les créneaux des templates sur `[start, end)`, dans l'ordre de traitement.
pub(super) fn planned_occurrences(
    templates: &[ShiftTemplate],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<ShiftOccurrence> {
    let mut out: Vec<ShiftOccurrence> = templates
        .iter()
        .flat_map(|t| expand(t, start, end))
        .collect();
    out.sort_by(processing_order);
    out
}

pub(super) fn sort_entries(entries: &mut [PlannedOccurrence]) {
    entries.sort_by(|a, b| processing_order(&a.occurrence, &b.occurrence));
}

pub(super) fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&NaiveDateTime::new(date, NaiveTime::MIN))
}
