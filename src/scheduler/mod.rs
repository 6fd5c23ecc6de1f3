mod assignment;
mod conflicts;
mod mutate;
mod partition;
mod selection;
mod types;
mod util;

pub use conflicts::audit;
pub use partition::independent_groups;
pub use selection::{LeastLoaded, PoolOrder, SelectionPolicy};
pub use types::{
    CancelToken, ConfigError, Conflict, ConflictKind, PlanError, PlanInput, PlanOptions,
    PlanReport, PlannedOccurrence, Rejection, StaffingStatus,
};

use crate::availability::AvailabilityIndex;
use crate::constraint::ConstraintTable;
use crate::history::HistoryTracker;
use crate::model::{MemberId, MemberRequest, OccurrenceId, ShiftConstraint, ShiftOccurrence};
use crate::repository::{
    ConstraintRepository, HistoryRepository, MemberRepository, PlanCommitSink,
    RequestRepository, TemplateRepository,
};
use crate::template::{ShiftTemplate, TemplateId};
use assignment::Workspace;
use chrono::Duration;
use std::collections::{BTreeSet, HashSet};

/// Moteur d'affectation : possède en exclusivité un snapshot immuable
/// (templates, contraintes, indisponibilités) et l'historique qu'il fait avancer.
#[derive(Debug)]
pub struct Scheduler<P = LeastLoaded> {
    templates: Vec<ShiftTemplate>,
    constraints: ConstraintTable,
    availability: AvailabilityIndex,
    history: HistoryTracker,
    /// Historique avant toute planification, pour l'audit.
    baseline: HistoryTracker,
    options: PlanOptions,
    policy: P,
}

impl Scheduler<LeastLoaded> {
    /// Construit le snapshot à partir de données déjà chargées.
    pub fn new(
        templates: Vec<ShiftTemplate>,
        constraints: Vec<ShiftConstraint>,
        requests: Vec<MemberRequest>,
        history: Vec<ShiftOccurrence>,
        options: PlanOptions,
    ) -> Result<Self, PlanError> {
        check_templates(&templates)?;
        let constraints = ConstraintTable::build(&templates, constraints)?;

        for request in &requests {
            request.validate().map_err(|err| {
                PlanError::DataInconsistency(format!("request {}: {err}", request.id))
            })?;
        }

        let known: HashSet<&TemplateId> = templates.iter().map(|t| &t.id).collect();
        if let Some(orphan) = history.iter().find(|o| !known.contains(&o.template)) {
            return Err(PlanError::DataInconsistency(format!(
                "occurrence {} references unknown template {}",
                orphan.id, orphan.template
            )));
        }

        let mut tracker = HistoryTracker::new();
        tracker.seed(history);

        plan_info!(
            templates = templates.len(),
            constraints = constraints.len(),
            requests = requests.len(),
            history = tracker.len(),
            "snapshot loaded"
        );

        Ok(Self {
            templates,
            constraints,
            availability: AvailabilityIndex::build(requests),
            baseline: tracker.clone(),
            history: tracker,
            options,
            policy: LeastLoaded,
        })
    }

    /// Charge tout le nécessaire depuis les dépôts avant la planification :
    /// aucune E/S n'a lieu ensuite.
    pub fn load<R>(repo: &R, input: &PlanInput, options: PlanOptions) -> Result<Self, PlanError>
    where
        R: TemplateRepository
            + ConstraintRepository
            + RequestRepository
            + HistoryRepository
            + MemberRepository,
    {
        if input.end < input.start {
            return Err(PlanError::InvalidRange);
        }

        let templates = repo.list_active().map_err(PlanError::Repository)?;
        check_templates(&templates)?;

        let mut constraints = Vec::new();
        for template in &templates {
            for constraint in repo.for_template(&template.id).map_err(PlanError::Repository)? {
                if constraint.template != template.id {
                    return Err(PlanError::DataInconsistency(format!(
                        "constraint {} returned for template {} but owned by {}",
                        constraint.id, template.id, constraint.template
                    )));
                }
                constraints.push(constraint);
            }
        }
        let table = ConstraintTable::build(&templates, constraints.iter().cloned())?;

        let known_members: HashSet<MemberId> = repo
            .members()
            .map_err(PlanError::Repository)?
            .into_iter()
            .map(|m| m.id)
            .collect();
        let mut pooled: BTreeSet<MemberId> = BTreeSet::new();
        for (template, pool) in &input.pools {
            for member in pool {
                if !known_members.contains(member) {
                    return Err(PlanError::DataInconsistency(format!(
                        "pool of template {template} references unknown member {member}"
                    )));
                }
                pooled.insert(member.clone());
            }
        }
        let pooled: Vec<MemberId> = pooled.into_iter().collect();

        let window_start = util::midnight(input.start);
        let longest = templates
            .iter()
            .map(ShiftTemplate::duration)
            .max()
            .unwrap_or_else(Duration::zero);
        let window_end = util::midnight(input.end) + longest;
        let requests = repo
            .for_members(&pooled, window_start, window_end)
            .map_err(PlanError::Repository)?;

        let mut history = Vec::new();
        for template in &templates {
            let depth = table
                .max_window_for_linked(&template.id)
                .max(options.history_floor);
            if depth == 0 {
                continue;
            }
            let past = repo
                .occurrences_before(&template.id, window_start, depth)
                .map_err(PlanError::Repository)?;
            if let Some(stray) = past.iter().find(|o| o.template != template.id) {
                return Err(PlanError::DataInconsistency(format!(
                    "history of template {} returned occurrence {} of template {}",
                    template.id, stray.id, stray.template
                )));
            }
            history.extend(past);
        }

        Self::new(templates, constraints, requests, history, options)
    }
}

impl<P: SelectionPolicy> Scheduler<P> {
    pub fn with_policy<Q: SelectionPolicy>(self, policy: Q) -> Scheduler<Q> {
        Scheduler {
            templates: self.templates,
            constraints: self.constraints,
            availability: self.availability,
            history: self.history,
            baseline: self.baseline,
            options: self.options,
            policy,
        }
    }

    pub fn templates(&self) -> &[ShiftTemplate] {
        &self.templates
    }
    pub fn constraints(&self) -> &ConstraintTable {
        &self.constraints
    }
    pub fn availability(&self) -> &AvailabilityIndex {
        &self.availability
    }
    pub fn history(&self) -> &HistoryTracker {
        &self.history
    }
    pub fn options(&self) -> PlanOptions {
        self.options
    }

    pub fn run<S>(&mut self, input: &PlanInput, sink: &mut S) -> Result<PlanReport, PlanError>
    where
        S: PlanCommitSink + ?Sized,
    {
        self.run_with_cancel(input, sink, &CancelToken::new())
    }

    /// Planification séquentielle ; chaque décision part vers `sink`
    /// dès qu'elle est inscrite dans l'historique.
    pub fn run_with_cancel<S>(
        &mut self,
        input: &PlanInput,
        sink: &mut S,
        cancel: &CancelToken,
    ) -> Result<PlanReport, PlanError>
    where
        S: PlanCommitSink + ?Sized,
    {
        self.check_input(input)?;
        let ws = Workspace {
            templates: &self.templates,
            constraints: &self.constraints,
            availability: &self.availability,
            policy: &self.policy,
            options: self.options,
        };
        assignment::plan_occurrences(&ws, &mut self.history, input, cancel, |entry| {
            sink.commit(&entry.occurrence, &entry.occurrence.assigned, entry.status)
                .map_err(PlanError::Sink)
        })
    }

    /// Planifie en parallèle les groupes de templates sans lien de contrainte.
    ///
    /// Chaque groupe a son propre historique (et donc ses propres compteurs
    /// de charge) ; le résultat fusionné part vers `sink` après tous les groupes.
    pub fn run_partitioned<S>(
        &mut self,
        input: &PlanInput,
        sink: &mut S,
        cancel: &CancelToken,
    ) -> Result<PlanReport, PlanError>
    where
        S: PlanCommitSink + ?Sized,
        P: Sync,
    {
        self.check_input(input)?;
        let groups = independent_groups(&self.templates, &self.constraints);
        if groups.len() <= 1 {
            return self.run_with_cancel(input, sink, cancel);
        }

        let ws = Workspace {
            templates: &self.templates,
            constraints: &self.constraints,
            availability: &self.availability,
            policy: &self.policy,
            options: self.options,
        };
        let report = partition::plan_groups(&ws, &groups, &self.history, input, cancel)?;

        for entry in &report.entries {
            self.history.record(&entry.occurrence);
            sink.commit(&entry.occurrence, &entry.occurrence.assigned, entry.status)
                .map_err(PlanError::Sink)?;
        }
        Ok(report)
    }

    /// Rejoue `report` depuis l'historique initial et liste les écarts.
    pub fn audit(&self, report: &PlanReport) -> Vec<Conflict> {
        audit(
            &report.entries,
            &self.constraints,
            &self.availability,
            &self.baseline,
        )
    }

    /// Remplace `from` par `to` sur un créneau planifié (ou ajoute `to`
    /// si `from` est absent et le créneau en sous-effectif).
    pub fn override_member(
        &mut self,
        report: &mut PlanReport,
        occurrence: &OccurrenceId,
        from: Option<&MemberId>,
        to: &MemberId,
    ) -> Result<(), PlanError> {
        mutate::override_member(self, report, occurrence, from, to)
    }

    fn check_input(&self, input: &PlanInput) -> Result<(), PlanError> {
        if input.end < input.start {
            return Err(PlanError::InvalidRange);
        }
        if self.options.default_headcount == 0 {
            return Err(ConfigError::ZeroDefaultHeadcount.into());
        }
        let known: HashSet<&TemplateId> = self.templates.iter().map(|t| &t.id).collect();

        let mut headcounts: Vec<_> = input.headcounts.iter().collect();
        headcounts.sort();
        for (template, headcount) in headcounts {
            if !known.contains(template) {
                return Err(PlanError::DataInconsistency(format!(
                    "headcount given for unknown template {template}"
                )));
            }
            if *headcount == 0 {
                return Err(ConfigError::ZeroHeadcount(template.clone()).into());
            }
        }

        let mut pooled: Vec<&TemplateId> = input.pools.keys().collect();
        pooled.sort();
        if let Some(template) = pooled.into_iter().find(|t| !known.contains(*t)) {
            return Err(PlanError::DataInconsistency(format!(
                "pool given for unknown template {template}"
            )));
        }
        Ok(())
    }
}

fn check_templates(templates: &[ShiftTemplate]) -> Result<(), PlanError> {
    let mut seen = HashSet::new();
    for template in templates {
        template.validate().map_err(|source| ConfigError::Template {
            id: template.id.clone(),
            source,
        })?;
        if !seen.insert(&template.id) {
            return Err(ConfigError::DuplicateTemplate(template.id.clone()).into());
        }
    }
    Ok(())
}
