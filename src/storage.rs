use crate::model::{
    Member, MemberGroup, MemberGroupId, MemberId, MemberRequest, ShiftConstraint,
    ShiftOccurrence,
};
use crate::repository::{
    ConstraintRepository, HistoryRepository, MemberRepository, PlanCommitSink,
    RequestRepository, TemplateRepository,
};
use crate::scheduler::{PlanInput, StaffingStatus};
use crate::template::{ShiftTemplate, TemplateId};
use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub trait Storage {
    /// Charge un jeu de données depuis un support.
    fn load(&self) -> anyhow::Result<Dataset>;
    /// Sauvegarde de manière atomique.
    fn save(&self, dataset: &Dataset) -> anyhow::Result<()>;
}

/// Éligibilité et effectif d'un template : membres des groupes listés.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staffing {
    pub template: TemplateId,
    #[serde(default)]
    pub groups: Vec<MemberGroupId>,
    #[serde(default)]
    pub headcount: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Jeu de données complet, sérialisé tel quel en JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub groups: Vec<MemberGroup>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub templates: Vec<ShiftTemplate>,
    #[serde(default)]
    pub constraints: Vec<ShiftConstraint>,
    #[serde(default)]
    pub requests: Vec<MemberRequest>,
    #[serde(default)]
    pub occurrences: Vec<ShiftOccurrence>,
    #[serde(default)]
    pub staffing: Vec<Staffing>,
}

impl Dataset {
    pub fn find_member_by_email<'a>(&'a self, email: &str) -> Option<&'a Member> {
        self.members
            .iter()
            .find(|m| m.email.eq_ignore_ascii_case(email))
    }
    pub fn find_member_by_id<'a>(&'a self, id: &MemberId) -> Option<&'a Member> {
        self.members.iter().find(|m| &m.id == id)
    }
    pub fn find_group_by_name<'a>(&'a self, name: &str) -> Option<&'a MemberGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
    pub fn find_template_by_name<'a>(&'a self, name: &str) -> Option<&'a ShiftTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }
    pub fn find_template_by_id<'a>(&'a self, id: &TemplateId) -> Option<&'a ShiftTemplate> {
        self.templates.iter().find(|t| &t.id == id)
    }

    pub fn add_group(&mut self, group: MemberGroup) -> anyhow::Result<MemberGroupId> {
        if self.find_group_by_name(&group.name).is_some() {
            bail!("group {} already exists", group.name);
        }
        let id = group.id.clone();
        self.groups.push(group);
        Ok(id)
    }

    pub fn add_member(&mut self, member: Member) -> anyhow::Result<MemberId> {
        if self.find_member_by_email(&member.email).is_some() {
            bail!("member with email {} already exists", member.email);
        }
        if let Some(group) = &member.group {
            if !self.groups.iter().any(|g| &g.id == group) {
                bail!("unknown group {group} for member {}", member.email);
            }
        }
        let id = member.id.clone();
        self.members.push(member);
        Ok(id)
    }

    pub fn add_template(&mut self, template: ShiftTemplate) -> anyhow::Result<TemplateId> {
        template
            .validate()
            .with_context(|| format!("invalid template {}", template.name))?;
        if self.find_template_by_name(&template.name).is_some() {
            bail!("template {} already exists", template.name);
        }
        let id = template.id.clone();
        self.templates.push(template);
        Ok(id)
    }

    pub fn add_constraint(&mut self, constraint: ShiftConstraint) -> anyhow::Result<()> {
        constraint.validate()?;
        for end in [&constraint.template, &constraint.linked] {
            if self.find_template_by_id(end).is_none() {
                bail!("constraint references unknown template {end}");
            }
        }
        self.constraints.push(constraint);
        Ok(())
    }

    pub fn add_request(&mut self, request: MemberRequest) -> anyhow::Result<()> {
        request.validate()?;
        if self.find_member_by_id(&request.member).is_none() {
            bail!("request {} references unknown member {}", request.id, request.member);
        }
        self.requests.push(request);
        Ok(())
    }

    /// Pas d'édition : une requête se supprime puis se recrée.
    pub fn remove_request(&mut self, id: &crate::model::RequestId) -> bool {
        let before = self.requests.len();
        self.requests.retain(|r| &r.id != id);
        self.requests.len() != before
    }

    /// Remplace la règle d'éligibilité d'un template.
    pub fn set_staffing(&mut self, staffing: Staffing) -> anyhow::Result<()> {
        if self.find_template_by_id(&staffing.template).is_none() {
            bail!("unknown template {}", staffing.template);
        }
        if staffing.headcount == Some(0) {
            bail!("headcount must be at least 1");
        }
        for group in &staffing.groups {
            if !self.groups.iter().any(|g| &g.id == group) {
                bail!("unknown group {group}");
            }
        }
        self.staffing.retain(|s| s.template != staffing.template);
        self.staffing.push(staffing);
        Ok(())
    }

    /// Viviers (membres des groupes, triés par identifiant) et effectifs.
    pub fn plan_input(&self, start: NaiveDate, end: NaiveDate) -> PlanInput {
        let mut input = PlanInput::new(start, end);
        for rule in &self.staffing {
            let groups: HashSet<&MemberGroupId> = rule.groups.iter().collect();
            let pool: BTreeSet<MemberId> = self
                .members
                .iter()
                .filter(|m| m.group.as_ref().is_some_and(|g| groups.contains(g)))
                .map(|m| m.id.clone())
                .collect();
            input = input.with_pool(&rule.template, pool);
            if let Some(headcount) = rule.headcount {
                input = input.with_headcount(&rule.template, headcount);
            }
        }
        input
    }

    pub fn headcount_of(&self, template: &TemplateId) -> Option<u32> {
        self.staffing
            .iter()
            .find(|s| &s.template == template)
            .and_then(|s| s.headcount)
    }

    /// Insère des contraintes dérivées ; une paire (owner, linked) existante
    /// voit seulement sa fenêtre et `same_start` mis à jour.
    pub fn merge_constraints<I>(&mut self, derived: I) -> MergeSummary
    where
        I: IntoIterator<Item = ShiftConstraint>,
    {
        let mut summary = MergeSummary::default();
        for constraint in derived {
            match self
                .constraints
                .iter_mut()
                .find(|c| c.template == constraint.template && c.linked == constraint.linked)
            {
                Some(existing)
                    if existing.within_last_shifts == constraint.within_last_shifts
                        && existing.same_start == constraint.same_start =>
                {
                    summary.unchanged += 1;
                }
                Some(existing) => {
                    existing.within_last_shifts = constraint.within_last_shifts;
                    existing.same_start = constraint.same_start;
                    summary.updated += 1;
                }
                None => {
                    self.constraints.push(constraint);
                    summary.created += 1;
                }
            }
        }
        summary
    }

    fn upsert_occurrence(&mut self, occurrence: ShiftOccurrence) {
        match self.occurrences.iter_mut().find(|o| o.id == occurrence.id) {
            Some(existing) => *existing = occurrence,
            None => self.occurrences.push(occurrence),
        }
    }

    /// Créneaux stockés recoupant `[start, end)`, triés par début.
    pub fn occurrences_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<&ShiftOccurrence> {
        let mut out: Vec<&ShiftOccurrence> = self
            .occurrences
            .iter()
            .filter(|o| o.start < end && o.end > start)
            .collect();
        out.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.template.cmp(&b.template)));
        out
    }
}

impl TemplateRepository for Dataset {
    fn list_active(&self) -> anyhow::Result<Vec<ShiftTemplate>> {
        Ok(self.templates.clone())
    }
}

impl ConstraintRepository for Dataset {
    fn for_template(&self, template: &TemplateId) -> anyhow::Result<Vec<ShiftConstraint>> {
        Ok(self
            .constraints
            .iter()
            .filter(|c| &c.template == template)
            .cloned()
            .collect())
    }
}

impl RequestRepository for Dataset {
    fn for_members(
        &self,
        members: &[MemberId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<MemberRequest>> {
        let wanted: HashSet<&MemberId> = members.iter().collect();
        Ok(self
            .requests
            .iter()
            .filter(|r| wanted.contains(&r.member) && r.start < end && r.end > start)
            .cloned()
            .collect())
    }
}

impl HistoryRepository for Dataset {
    fn occurrences_before(
        &self,
        template: &TemplateId,
        instant: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<Vec<ShiftOccurrence>> {
        let mut past: Vec<&ShiftOccurrence> = self
            .occurrences
            .iter()
            .filter(|o| &o.template == template && o.start < instant)
            .collect();
        past.sort_by_key(|o| o.start);
        let skip = past.len().saturating_sub(limit);
        Ok(past.into_iter().skip(skip).cloned().collect())
    }
}

impl MemberRepository for Dataset {
    fn members(&self) -> anyhow::Result<Vec<Member>> {
        Ok(self.members.clone())
    }
}

/// Les décisions sont appliquées en mémoire ; `Storage::save` les rend durables
/// en une seule écriture.
impl PlanCommitSink for Dataset {
    fn commit(
        &mut self,
        occurrence: &ShiftOccurrence,
        assigned: &BTreeSet<MemberId>,
        _status: StaffingStatus,
    ) -> anyhow::Result<()> {
        let mut occurrence = occurrence.clone();
        occurrence.assigned = assigned.clone();
        self.upsert_occurrence(occurrence);
        Ok(())
    }
}

pub struct JsonStorage {
    path: PathBuf,
}

impl JsonStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self {
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for JsonStorage {
    fn load(&self) -> anyhow::Result<Dataset> {
        let data =
            fs::read(&self.path).with_context(|| format!("reading {}", self.path.display()))?;
        let dataset: Dataset = serde_json::from_slice(&data)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(dataset)
    }

    fn save(&self, dataset: &Dataset) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(dataset)?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).with_context(|| "creating temp file")?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).with_context(|| "atomic rename")?;
        Ok(())
    }
}
