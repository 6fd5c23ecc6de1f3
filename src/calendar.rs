//! Export iCalendar (RFC 5545) des créneaux validés.

use crate::model::{MemberId, ShiftOccurrence};
use crate::storage::Dataset;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const MAX_LINE_OCTETS: usize = 75;

/// Un événement de calendrier : un membre sur un créneau.
#[derive(Debug, Clone)]
pub struct CalendarEvent<'a> {
    pub occurrence: &'a ShiftOccurrence,
    pub member: &'a MemberId,
    pub summary: String,
}

/// Permet de customiser le format de sortie (ICS, texte, etc.).
pub trait CalendarRenderer {
    fn render(&self, events: &[CalendarEvent<'_>], stamp: DateTime<Utc>) -> String;
}

#[derive(Debug, Clone)]
pub struct IcsRenderer {
    pub prodid: String,
}

impl Default for IcsRenderer {
    fn default() -> Self {
        Self {
            prodid: "-//roulement//planning//FR".to_string(),
        }
    }
}

impl CalendarRenderer for IcsRenderer {
    fn render(&self, events: &[CalendarEvent<'_>], stamp: DateTime<Utc>) -> String {
        let mut out = String::new();
        push_line(&mut out, "BEGIN:VCALENDAR");
        push_line(&mut out, "VERSION:2.0");
        push_line(&mut out, &format!("PRODID:{}", self.prodid));
        push_line(&mut out, "CALSCALE:GREGORIAN");
        push_line(&mut out, "METHOD:PUBLISH");
        for event in events {
            let occurrence = event.occurrence;
            push_line(&mut out, "BEGIN:VEVENT");
            push_line(
                &mut out,
                &format!("UID:{}-{}@roulement", occurrence.id, event.member),
            );
            push_line(&mut out, &format!("DTSTAMP:{}", stamp.format(STAMP_FORMAT)));
            push_line(
                &mut out,
                &format!("DTSTART:{}", occurrence.start.format(STAMP_FORMAT)),
            );
            push_line(
                &mut out,
                &format!("DTEND:{}", occurrence.end.format(STAMP_FORMAT)),
            );
            push_line(&mut out, &format!("SUMMARY:{}", escape_text(&event.summary)));
            push_line(&mut out, "END:VEVENT");
        }
        push_line(&mut out, "END:VCALENDAR");
        out
    }
}

fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Ajoute une ligne CRLF, repliée à 75 octets sans couper un caractère.
fn push_line(out: &mut String, line: &str) {
    let mut width = 0;
    for c in line.chars() {
        if width + c.len_utf8() > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(c);
        width += c.len_utf8();
    }
    out.push_str("\r\n");
}

/// Créneaux stockés de `member` recoupant `[start, end)`.
pub fn member_events<'a>(
    dataset: &'a Dataset,
    member: &'a MemberId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<CalendarEvent<'a>> {
    dataset
        .occurrences_between(start, end)
        .into_iter()
        .filter(|o| o.assigned.contains(member))
        .map(|occurrence| CalendarEvent {
            occurrence,
            member,
            summary: template_name(dataset, occurrence).to_string(),
        })
        .collect()
}

/// Un événement par (créneau, membre affecté) : `"<template> - <membre>"`.
pub fn global_events(
    dataset: &Dataset,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<CalendarEvent<'_>> {
    let mut out = Vec::new();
    for occurrence in dataset.occurrences_between(start, end) {
        for member in &occurrence.assigned {
            let name = dataset
                .find_member_by_id(member)
                .map(|m| m.name.as_str())
                .unwrap_or(member.as_str());
            out.push(CalendarEvent {
                occurrence,
                member,
                summary: format!("{} - {}", template_name(dataset, occurrence), name),
            });
        }
    }
    out
}

fn template_name<'a>(dataset: &'a Dataset, occurrence: &'a ShiftOccurrence) -> &'a str {
    dataset
        .find_template_by_id(&occurrence.template)
        .map(|t| t.name.as_str())
        .unwrap_or(occurrence.template.as_str())
}

pub fn render_member_calendar(
    dataset: &Dataset,
    member: &MemberId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> String {
    IcsRenderer::default().render(&member_events(dataset, member, start, end), now)
}

pub fn render_global_calendar(
    dataset: &Dataset,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> String {
    IcsRenderer::default().render(&global_events(dataset, start, end), now)
}

/// Écrit `<email>.ics` pour chaque membre puis `all.ics` dans `dir`.
///
/// Retourne les chemins écrits, fichier global en dernier.
pub fn export_all_members_ics<P: AsRef<Path>>(
    dataset: &Dataset,
    dir: P,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut written = Vec::new();
    for member in &dataset.members {
        let path = dir.join(format!("{}.ics", member.email));
        let content = render_member_calendar(dataset, &member.id, start, end, now);
        fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }

    let path = dir.join("all.ics");
    fs::write(&path, render_global_calendar(dataset, start, end, now))
        .with_context(|| format!("writing {}", path.display()))?;
    written.push(path);

    plan_info!(files = written.len(), dir = %dir.display(), "calendars exported");
    Ok(written)
}
