//! Index des indisponibilités par membre.
//!
//! Construit une fois par planification. Les requêtes d'un membre sont
//! triées par début ; les plages fusionnées servent au test booléen en
//! O(log n), les requêtes brutes aux rapports.

use crate::model::{Interval, MemberId, MemberRequest};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct AvailabilityIndex {
    members: HashMap<MemberId, MemberWindows>,
}

#[derive(Debug, Default, Clone)]
struct MemberWindows {
    /// Plages disjointes triées (union des requêtes).
    merged: Vec<Interval>,
    /// Requêtes d'origine triées par (start, end).
    requests: Vec<MemberRequest>,
}

impl AvailabilityIndex {
    pub fn build<I>(requests: I) -> Self
    where
        I: IntoIterator<Item = MemberRequest>,
    {
        let mut members: HashMap<MemberId, MemberWindows> = HashMap::new();
        for request in requests {
            members
                .entry(request.member.clone())
                .or_default()
                .requests
                .push(request);
        }
        for windows in members.values_mut() {
            windows.requests.sort_by_key(|r| (r.start, r.end));
            windows.merged = merge(&windows.requests);
        }
        Self { members }
    }

    /// `true` si aucune requête du membre ne recoupe `interval` (semi-ouvert).
    pub fn is_available(&self, member: &MemberId, interval: &Interval) -> bool {
        let Some(windows) = self.members.get(member) else {
            return true;
        };
        let idx = windows.merged.partition_point(|w| w.end <= interval.start);
        windows
            .merged
            .get(idx)
            .map_or(true, |w| w.start >= interval.end)
    }

    /// Requêtes du membre qui recoupent `interval`.
    ///
    /// Ne parcourt que les requêtes des plages fusionnées qui touchent
    /// `interval`.
    pub fn blocking_requests<'a>(
        &'a self,
        member: &MemberId,
        interval: &Interval,
    ) -> Vec<&'a MemberRequest> {
        let Some(windows) = self.members.get(member) else {
            return Vec::new();
        };
        let idx = windows.merged.partition_point(|w| w.end <= interval.start);
        let Some(first) = windows.merged.get(idx).filter(|w| w.start < interval.end) else {
            return Vec::new();
        };
        let lower = windows.requests.partition_point(|r| r.start < first.start);
        let upper = windows
            .requests
            .partition_point(|r| r.start < interval.end);
        windows.requests[lower..upper]
            .iter()
            .filter(|r| r.end > interval.start)
            .collect()
    }

    /// Nombre total de requêtes indexées.
    pub fn len(&self) -> usize {
        self.members.values().map(|w| w.requests.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn merge(sorted: &[MemberRequest]) -> Vec<Interval> {
    let mut out: Vec<Interval> = Vec::with_capacity(sorted.len());
    for request in sorted {
        match out.last_mut() {
            Some(last) if request.start <= last.end => {
                last.end = last.end.max(request.end);
            }
            _ => out.push(request.interval()),
        }
    }
    out
}
