use crate::model::{
    string_id, ConstraintId, ModelError, OccurrenceId, ShiftConstraint, ShiftOccurrence,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::iter::FusedIterator;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
/// Durée maximale d'un créneau : une semaine.
pub const MAX_DURATION_SECONDS: i64 = 7 * SECONDS_PER_DAY;

string_id!(
    /// Identifiant fort pour ShiftTemplate
    TemplateId
);

/// Définition récurrente d'un créneau : heure de début (UTC), durée, jours actifs.
///
/// Les jours suivent la numérotation des données sources : 0 = dimanche … 6 = samedi.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftTemplate {
    pub id: TemplateId,
    pub name: String,
    pub seconds_since_midnight: u32,
    pub duration_seconds: i64,
    pub days: Vec<u8>,
}

impl ShiftTemplate {
    pub fn new<N: Into<String>>(
        name: N,
        seconds_since_midnight: u32,
        duration_seconds: i64,
        days: Vec<u8>,
    ) -> Result<Self, ModelError> {
        let template = Self {
            id: TemplateId::random(),
            name: name.into(),
            seconds_since_midnight,
            duration_seconds,
            days,
        };
        template.validate()?;
        Ok(template)
    }

    pub fn with_id(mut self, id: TemplateId) -> Self {
        self.id = id;
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if i64::from(self.seconds_since_midnight) >= SECONDS_PER_DAY {
            return Err(ModelError::InvalidTimeOfDay(self.seconds_since_midnight));
        }
        if self.duration_seconds <= 0 {
            return Err(ModelError::NonPositiveDuration(self.duration_seconds));
        }
        if self.duration_seconds > MAX_DURATION_SECONDS {
            return Err(ModelError::DurationTooLong(self.duration_seconds));
        }
        if self.days.is_empty() {
            return Err(ModelError::EmptyWeekdays);
        }
        let mut seen = HashSet::new();
        for &day in &self.days {
            if day > 6 {
                return Err(ModelError::InvalidWeekday(day));
            }
            if !seen.insert(day) {
                return Err(ModelError::DuplicateWeekday(day));
            }
        }
        Ok(())
    }

    pub fn is_active_on(&self, weekday_from_sunday: u8) -> bool {
        self.days.contains(&weekday_from_sunday)
    }

    /// Fin du créneau en secondes depuis le minuit du jour de début (peut dépasser 86400).
    pub fn end_offset_seconds(&self) -> i64 {
        i64::from(self.seconds_since_midnight) + self.duration_seconds
    }

    /// Bornée à `MAX_DURATION_SECONDS` : un template non validé ne fait
    /// pas paniquer l'expansion.
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_seconds.clamp(0, MAX_DURATION_SECONDS))
    }
}

/// Déroule `template` sur les dates `[range_start, range_end)`.
///
/// Fonction pure : l'itérateur peut être cloné ou recréé à volonté.
pub fn expand(
    template: &ShiftTemplate,
    range_start: NaiveDate,
    range_end: NaiveDate,
) -> Occurrences<'_> {
    Occurrences {
        template,
        current: range_start,
        end: range_end,
    }
}

/// Séquence paresseuse des créneaux d'un template, par début croissant.
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    template: &'a ShiftTemplate,
    current: NaiveDate,
    end: NaiveDate,
}

impl Iterator for Occurrences<'_> {
    type Item = ShiftOccurrence;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current < self.end {
            let date = self.current;
            self.current = date.succ_opt().unwrap_or(self.end);
            let weekday = date.weekday().num_days_from_sunday() as u8;
            if self.template.is_active_on(weekday) {
                return Some(occurrence_on(self.template, date));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.signed_duration_since(self.current).num_days().max(0) as usize;
        (0, Some(remaining))
    }
}

impl FusedIterator for Occurrences<'_> {}

/// Début (UTC) de l'occurrence du template à la date donnée.
pub fn occurrence_start(template: &ShiftTemplate, date: NaiveDate) -> DateTime<Utc> {
    let midnight = Utc.from_utc_datetime(&NaiveDateTime::new(date, NaiveTime::MIN));
    midnight + Duration::seconds(i64::from(template.seconds_since_midnight))
}

fn occurrence_on(template: &ShiftTemplate, date: NaiveDate) -> ShiftOccurrence {
    let start = occurrence_start(template, date);
    ShiftOccurrence {
        id: OccurrenceId::new(format!("{}@{}", template.id, date)),
        template: template.id.clone(),
        start,
        end: start + template.duration(),
        assigned: BTreeSet::new(),
    }
}

/// Construit les contraintes implicites entre templates qui se chevauchent.
///
/// - même jour, plages horaires qui se croisent : A→B et B→A (fenêtre 1,
///   `same_start` pour couvrir deux créneaux qui commencent ensemble) ;
/// - A déborde après minuit sur B le lendemain : B interdit à qui vient de faire A.
///
/// Résultat trié par (owner, linked), sans doublon.
pub fn derive_overlap_constraints(templates: &[ShiftTemplate]) -> Vec<ShiftConstraint> {
    // (owner, linked) -> same_start
    let mut pairs: BTreeMap<(TemplateId, TemplateId), bool> = BTreeMap::new();

    for (i, a) in templates.iter().enumerate() {
        for b in templates.iter().skip(i + 1) {
            if same_day_overlap(a, b) {
                pairs.insert((a.id.clone(), b.id.clone()), true);
                pairs.insert((b.id.clone(), a.id.clone()), true);
            }
            if spills_into_next_day(a, b) {
                pairs.entry((b.id.clone(), a.id.clone())).or_insert(false);
            }
            if spills_into_next_day(b, a) {
                pairs.entry((a.id.clone(), b.id.clone())).or_insert(false);
            }
        }
    }

    pairs
        .into_iter()
        .map(|((template, linked), same_start)| ShiftConstraint {
            id: ConstraintId::random(),
            template,
            linked,
            within_last_shifts: 1,
            same_start,
        })
        .collect()
}

fn same_day_overlap(a: &ShiftTemplate, b: &ShiftTemplate) -> bool {
    let shared_days = a.days.iter().any(|d| b.days.contains(d));
    if !shared_days {
        return false;
    }
    let a_start = i64::from(a.seconds_since_midnight);
    let b_start = i64::from(b.seconds_since_midnight);
    a_start.max(b_start) < a.end_offset_seconds().min(b.end_offset_seconds())
}

fn spills_into_next_day(earlier: &ShiftTemplate, later: &ShiftTemplate) -> bool {
    let spillover_end = earlier.end_offset_seconds() - SECONDS_PER_DAY;
    if spillover_end <= 0 {
        return false;
    }
    let next_day_active = earlier
        .days
        .iter()
        .any(|d| later.is_active_on((d + 1) % 7));
    next_day_active && i64::from(later.seconds_since_midnight) < spillover_end
}
