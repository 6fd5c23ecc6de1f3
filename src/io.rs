use crate::model::{Member, MemberGroup, MemberRequest};
use crate::scheduler::{PlanReport, StaffingStatus};
use crate::storage::Dataset;
use anyhow::{bail, Context};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Import de membres depuis CSV: header `name,email[,group]` (nom de groupe).
pub fn import_members_csv<P: AsRef<Path>>(
    path: P,
    groups: &[MemberGroup],
) -> anyhow::Result<Vec<Member>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let name = rec.get(0).context("missing name")?.trim();
        let email = rec.get(1).context("missing email")?.trim();
        if name.is_empty() || email.is_empty() {
            bail!("invalid member row (empty)");
        }
        let mut member = Member::new(name, email);
        if let Some(group) = rec.get(2).map(str::trim).filter(|g| !g.is_empty()) {
            let group = groups
                .iter()
                .find(|g| g.name == group)
                .with_context(|| format!("unknown group {group} for {email}"))?;
            member = member.in_group(&group.id);
        }
        out.push(member);
    }
    Ok(out)
}

/// Import d'indisponibilités: header `email,start,end[,description]`.
///
/// `start`/`end` en RFC3339 UTC ou en date `YYYY-MM-DD` ; une date de fin
/// est inclusive (la requête court jusqu'au lendemain minuit).
pub fn import_requests_csv<P: AsRef<Path>>(
    path: P,
    members: &[Member],
) -> anyhow::Result<Vec<MemberRequest>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let email = rec.get(0).context("missing email")?.trim();
        let member = members
            .iter()
            .find(|m| m.email.eq_ignore_ascii_case(email))
            .with_context(|| format!("unknown member email: {email}"))?;
        let (start, _) = parse_point(rec.get(1).context("missing start")?.trim())?;
        let (mut end, end_was_date) = parse_point(rec.get(2).context("missing end")?.trim())?;
        if end_was_date {
            end += Duration::days(1);
        }
        let mut request = MemberRequest::new(member.id.clone(), start, end)
            .with_context(|| format!("invalid request for {email}"))?;
        if let Some(description) = rec.get(3).map(str::trim).filter(|d| !d.is_empty()) {
            request = request.with_description(description);
        }
        out.push(request);
    }
    Ok(out)
}

fn parse_point(raw: &str) -> anyhow::Result<(DateTime<Utc>, bool)> {
    if let Ok(dt) = raw.parse::<DateTime<Utc>>() {
        return Ok((dt, false));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date/datetime: {raw}"))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .context("invalid midnight conversion")?;
    Ok((Utc.from_utc_datetime(&datetime), true))
}

/// Export CSV du plan: header `occurrence,template,start,end,members,missing`.
///
/// Les membres sont désignés par e-mail (à défaut par identifiant),
/// séparés par `;`.
pub fn write_plan_csv<W: Write>(
    writer: W,
    report: &PlanReport,
    dataset: &Dataset,
) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_writer(writer);
    w.write_record(["occurrence", "template", "start", "end", "members", "missing"])?;
    for entry in &report.entries {
        let occurrence = &entry.occurrence;
        let template = dataset
            .find_template_by_id(&occurrence.template)
            .map(|t| t.name.as_str())
            .unwrap_or(occurrence.template.as_str());
        let members: Vec<&str> = occurrence
            .assigned
            .iter()
            .map(|id| {
                dataset
                    .find_member_by_id(id)
                    .map(|m| m.email.as_str())
                    .unwrap_or(id.as_str())
            })
            .collect();
        let missing = match entry.status {
            StaffingStatus::Staffed => 0,
            StaffingStatus::Understaffed { missing } => missing,
        };
        let start = occurrence.start.to_rfc3339();
        let end = occurrence.end.to_rfc3339();
        let missing = missing.to_string();
        w.write_record([
            occurrence.id.as_str(),
            template,
            start.as_str(),
            end.as_str(),
            members.join(";").as_str(),
            missing.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_plan_csv<P: AsRef<Path>>(
    path: P,
    report: &PlanReport,
    dataset: &Dataset,
) -> anyhow::Result<()> {
    let file = fs::File::create(path.as_ref())
        .with_context(|| format!("creating {}", path.as_ref().display()))?;
    write_plan_csv(file, report, dataset)
}

/// Export JSON du jeu de données (jolie mise en forme)
pub fn export_dataset_json<P: AsRef<Path>>(path: P, dataset: &Dataset) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(dataset)?;
    fs::write(path, s)?;
    Ok(())
}
