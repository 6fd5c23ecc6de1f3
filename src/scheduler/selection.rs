use crate::history::HistoryTracker;
use crate::model::MemberId;

/// Choix parmi les candidats valides. Doit être déterministe :
/// mêmes entrées, même sortie.
pub trait SelectionPolicy {
    /// Retourne au plus `needed` membres pris dans `candidates`.
    fn select(
        &self,
        candidates: Vec<MemberId>,
        needed: usize,
        history: &HistoryTracker,
    ) -> Vec<MemberId>;
}

/// Le moins d'affectations d'abord, puis ordre des identifiants.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoaded;

impl SelectionPolicy for LeastLoaded {
    fn select(
        &self,
        mut candidates: Vec<MemberId>,
        needed: usize,
        history: &HistoryTracker,
    ) -> Vec<MemberId> {
        candidates.sort_by_cached_key(|m| (history.assignment_count(m), m.clone()));
        candidates.truncate(needed);
        candidates
    }
}

/// Ordre du vivier tel que fourni.
#[derive(Debug, Default, Clone, Copy)]
pub struct PoolOrder;

impl SelectionPolicy for PoolOrder {
    fn select(
        &self,
        mut candidates: Vec<MemberId>,
        needed: usize,
        _history: &HistoryTracker,
    ) -> Vec<MemberId> {
        candidates.truncate(needed);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OccurrenceId, ShiftOccurrence};
    use crate::template::TemplateId;
    use chrono::{TimeZone, Utc};

    #[test]
    fn least_loaded_prefers_fewer_assignments_then_identity() {
        let mut history = HistoryTracker::new();
        let start = Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap();
        history.record(&ShiftOccurrence {
            id: OccurrenceId::new("x"),
            template: TemplateId::new("t"),
            start,
            end: start + chrono::Duration::hours(1),
            assigned: [MemberId::new("a")].into_iter().collect(),
        });
        let picked = LeastLoaded.select(
            vec![MemberId::new("a"), MemberId::new("c"), MemberId::new("b")],
            2,
            &history,
        );
        assert_eq!(picked, vec![MemberId::new("b"), MemberId::new("c")]);
    }

    #[test]
    fn pool_order_keeps_input_order() {
        let history = HistoryTracker::new();
        let picked = PoolOrder.select(vec![MemberId::new("z"), MemberId::new("a")], 1, &history);
        assert_eq!(picked, vec![MemberId::new("z")]);
    }
}
