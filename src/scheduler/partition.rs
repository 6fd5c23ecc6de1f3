use super::assignment::{self, Workspace};
use super::selection::SelectionPolicy;
use super::{util, CancelToken, PlanError, PlanInput, PlanReport};
use crate::constraint::ConstraintTable;
use crate::history::HistoryTracker;
use crate::template::{ShiftTemplate, TemplateId};
use std::collections::{HashMap, HashSet};
use std::thread;

/// Composantes connexes du graphe des liens de contrainte.
///
/// Deux templates de groupes différents ne partagent aucun `linked` :
/// leurs planifications sont indépendantes. Groupes et membres suivent
/// l'ordre d'apparition dans `templates`.
pub fn independent_groups(
    templates: &[ShiftTemplate],
    constraints: &ConstraintTable,
) -> Vec<Vec<TemplateId>> {
    let index: HashMap<&TemplateId, usize> = templates
        .iter()
        .enumerate()
        .map(|(i, t)| (&t.id, i))
        .collect();
    let mut parent: Vec<usize> = (0..templates.len()).collect();

    for constraint in constraints.iter() {
        let owner = index.get(&constraint.template);
        let linked = index.get(&constraint.linked);
        if let (Some(&a), Some(&b)) = (owner, linked) {
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }
    }

    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Vec<TemplateId>> = Vec::new();
    for (i, template) in templates.iter().enumerate() {
        let root = find(&mut parent, i);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(template.id.clone());
    }
    groups
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Un thread par groupe, puis fusion dans l'ordre de traitement global.
pub(super) fn plan_groups<P>(
    ws: &Workspace<'_, P>,
    groups: &[Vec<TemplateId>],
    history: &HistoryTracker,
    input: &PlanInput,
    cancel: &CancelToken,
) -> Result<PlanReport, PlanError>
where
    P: SelectionPolicy + Sync,
{
    let parts: Vec<(Vec<ShiftTemplate>, ConstraintTable)> = groups
        .iter()
        .map(|group| {
            let members: HashSet<&TemplateId> = group.iter().collect();
            let templates = ws
                .templates
                .iter()
                .filter(|t| members.contains(&t.id))
                .cloned()
                .collect();
            (templates, ws.constraints.restricted_to(&members))
        })
        .collect();

    let results: Vec<Result<PlanReport, PlanError>> = thread::scope(|scope| {
        let handles: Vec<_> = parts
            .iter()
            .map(|(templates, constraints)| {
                let part = Workspace {
                    templates,
                    constraints,
                    availability: ws.availability,
                    policy: ws.policy,
                    options: ws.options,
                };
                let mut history = history.clone();
                scope.spawn(move || {
                    assignment::plan_occurrences(&part, &mut history, input, cancel, |_| Ok(()))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });

    let mut merged = PlanReport::default();
    for result in results {
        let report = result?;
        merged.cancelled |= report.cancelled;
        merged.entries.extend(report.entries);
    }
    util::sort_entries(&mut merged.entries);
    Ok(merged)
}
