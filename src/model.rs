use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::template::TemplateId;

/// Erreurs de validation locale (à la construction des entités).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid request window: end must be after start")]
    InvalidRequestWindow,
    #[error("invalid time of day: {0} seconds (expected 0..86399)")]
    InvalidTimeOfDay(u32),
    #[error("duration must be positive (got {0} seconds)")]
    NonPositiveDuration(i64),
    #[error("duration too long: {0} seconds (at most one week)")]
    DurationTooLong(i64),
    #[error("template must define at least one weekday")]
    EmptyWeekdays,
    #[error("invalid weekday {0} (expected 0=Sunday..6=Saturday)")]
    InvalidWeekday(u8),
    #[error("weekday {0} listed twice")]
    DuplicateWeekday(u8),
    #[error("within_last_shifts must be > 0")]
    NonPositiveWindow,
    #[error("name cannot be empty")]
    EmptyName,
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        pub struct $name(String);

        impl $name {
            pub fn new<S: AsRef<str>>(s: S) -> Self {
                Self(s.as_ref().to_owned())
            }
            pub fn random() -> Self {
                Self(::uuid::Uuid::new_v4().to_string())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

pub(crate) use string_id;

string_id!(
    /// Identifiant fort pour MemberGroup
    MemberGroupId
);
string_id!(
    /// Identifiant fort pour Member
    MemberId
);
string_id!(
    /// Identifiant fort pour MemberRequest
    RequestId
);
string_id!(
    /// Identifiant fort pour ShiftConstraint
    ConstraintId
);
string_id!(
    /// Identifiant d'un créneau concret. Déterministe : `<template>@<date>`.
    OccurrenceId
);

/// Groupe de membres (filtres, rapports, éligibilité).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberGroup {
    pub id: MemberGroupId,
    pub name: String,
}

impl MemberGroup {
    pub fn new<N: Into<String>>(name: N) -> Result<Self, ModelError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ModelError::EmptyName);
        }
        Ok(Self {
            id: MemberGroupId::random(),
            name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub group: Option<MemberGroupId>,
}

impl Member {
    pub fn new<N: Into<String>, E: Into<String>>(name: N, email: E) -> Self {
        Self {
            id: MemberId::random(),
            name: name.into(),
            email: email.into(),
            group: None,
        }
    }

    pub fn in_group(mut self, group: &MemberGroupId) -> Self {
        self.group = Some(group.clone());
        self
    }
}

/// Intervalle UTC semi-ouvert `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Indisponibilité d'un membre (congé, absence) sur `[start, end)`.
///
/// Jamais modifiée une fois évaluée : toute édition est un delete + recreate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRequest {
    pub id: RequestId,
    pub member: MemberId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

impl MemberRequest {
    pub fn new(
        member: MemberId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        if end <= start {
            return Err(ModelError::InvalidRequestWindow);
        }
        Ok(Self {
            id: RequestId::random(),
            member,
            start,
            end,
            description: String::new(),
        })
    }

    pub fn with_description<D: Into<String>>(mut self, description: D) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.end <= self.start {
            return Err(ModelError::InvalidRequestWindow);
        }
        Ok(())
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }
}

/// Interdit d'affecter à `template` un membre présent dans les
/// `within_last_shifts` derniers créneaux passés de `linked`.
///
/// Avec `same_start`, un créneau de `linked` commençant au même instant
/// compte aussi.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftConstraint {
    pub id: ConstraintId,
    pub template: TemplateId,
    pub linked: TemplateId,
    pub within_last_shifts: u32,
    #[serde(default)]
    pub same_start: bool,
}

impl ShiftConstraint {
    pub fn new(
        template: TemplateId,
        linked: TemplateId,
        within_last_shifts: u32,
    ) -> Result<Self, ModelError> {
        let constraint = Self {
            id: ConstraintId::random(),
            template,
            linked,
            within_last_shifts,
            same_start: false,
        };
        constraint.validate()?;
        Ok(constraint)
    }

    pub fn with_same_start(mut self) -> Self {
        self.same_start = true;
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.within_last_shifts == 0 {
            return Err(ModelError::NonPositiveWindow);
        }
        Ok(())
    }

    pub fn is_self_referential(&self) -> bool {
        self.template == self.linked
    }
}

/// Créneau concret, issu de l'expansion d'un template sur une date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftOccurrence {
    pub id: OccurrenceId,
    pub template: TemplateId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub assigned: BTreeSet<MemberId>,
}

impl ShiftOccurrence {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }

    /// Durée en minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}
