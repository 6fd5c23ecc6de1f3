#![forbid(unsafe_code)]
use roulement::{
    expand,
    model::{MemberId, MemberRequest, ShiftConstraint, ShiftOccurrence},
    repository::{DiscardSink, PlanCommitSink},
    scheduler::{
        CancelToken, ConflictKind, PlanError, PlanInput, PlanOptions, Rejection, Scheduler,
        StaffingStatus,
    },
    derive_overlap_constraints, ShiftTemplate, TemplateId,
};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeSet;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
}

fn member(id: &str) -> MemberId {
    MemberId::new(id)
}

/// Tous les jours, 22:00 pour 8h.
fn night() -> ShiftTemplate {
    ShiftTemplate::new("Night", 22 * 3600, 8 * 3600, vec![0, 1, 2, 3, 4, 5, 6])
        .unwrap()
        .with_id(TemplateId::new("night"))
}

fn day_shift() -> ShiftTemplate {
    ShiftTemplate::new("Day", 8 * 3600, 8 * 3600, vec![1])
        .unwrap()
        .with_id(TemplateId::new("day"))
}

fn past_nights(from: u32, to: u32, assigned: &[&[&str]]) -> Vec<ShiftOccurrence> {
    let t = night();
    expand(&t, date(from), date(to))
        .zip(assigned)
        .map(|(mut o, members)| {
            o.assigned = members.iter().map(|m| member(m)).collect();
            o
        })
        .collect()
}

fn assigned(occurrence: &ShiftOccurrence) -> Vec<&str> {
    occurrence.assigned.iter().map(MemberId::as_str).collect()
}

#[test]
fn unavailable_member_is_never_assigned() {
    // lundi 6 octobre, 08:00-16:00
    let start = Utc.with_ymd_and_hms(2025, 10, 6, 8, 0, 0).unwrap();
    let leave = MemberRequest::new(member("m"), start, start + Duration::hours(8)).unwrap();
    let mut scheduler = Scheduler::new(
        vec![day_shift()],
        vec![],
        vec![leave],
        vec![],
        PlanOptions::default(),
    )
    .unwrap();

    let tid = TemplateId::new("day");
    let input = PlanInput::new(date(6), date(7)).with_pool(&tid, [member("m")]);
    let report = scheduler.run(&input, &mut DiscardSink).unwrap();

    assert_eq!(report.entries.len(), 1);
    let entry = &report.entries[0];
    assert!(entry.occurrence.assigned.is_empty());
    assert_eq!(entry.status, StaffingStatus::Understaffed { missing: 1 });
    assert_eq!(entry.rejections, vec![(member("m"), Rejection::Unavailable)]);

    let input = input.with_pool(&tid, [member("n")]);
    let report = scheduler.run(&input, &mut DiscardSink).unwrap();
    assert_eq!(assigned(&report.entries[0].occurrence), vec!["n"]);
}

#[test]
fn request_touching_the_occurrence_does_not_block() {
    let end = Utc.with_ymd_and_hms(2025, 10, 6, 16, 0, 0).unwrap();
    let evening = MemberRequest::new(member("m"), end, end + Duration::hours(4)).unwrap();
    let mut scheduler = Scheduler::new(
        vec![day_shift()],
        vec![],
        vec![evening],
        vec![],
        PlanOptions::default(),
    )
    .unwrap();
    let input =
        PlanInput::new(date(6), date(7)).with_pool(&TemplateId::new("day"), [member("m")]);
    let report = scheduler.run(&input, &mut DiscardSink).unwrap();
    assert!(report.is_fully_staffed());
}

#[test]
fn self_constraint_excludes_members_inside_the_window() {
    let tid = TemplateId::new("night");
    let constraint = ShiftConstraint::new(tid.clone(), tid.clone(), 2).unwrap();
    let constraint_id = constraint.id.clone();
    // créneaux 1 et 2 : M ; le plan couvre les créneaux 3, 4 et 5.
    let history = past_nights(4, 6, &[&["m"], &["m"]]);
    let mut scheduler = Scheduler::new(
        vec![night()],
        vec![constraint],
        vec![],
        history,
        PlanOptions::default(),
    )
    .unwrap();

    let input = PlanInput::new(date(6), date(9)).with_pool(&tid, [member("m")]);
    let report = scheduler.run(&input, &mut DiscardSink).unwrap();
    let statuses: Vec<_> = report.entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            StaffingStatus::Understaffed { missing: 1 },
            // le créneau 2 est encore dans la fenêtre {2, 3}
            StaffingStatus::Understaffed { missing: 1 },
            StaffingStatus::Staffed,
        ]
    );
    assert_eq!(
        report.entries[0].rejections,
        vec![(member("m"), Rejection::Constraint(constraint_id))]
    );
    assert_eq!(assigned(&report.entries[2].occurrence), vec!["m"]);
}

#[test]
fn window_slides_past_old_assignments() {
    let tid = TemplateId::new("night");
    let constraint = ShiftConstraint::new(tid.clone(), tid.clone(), 2).unwrap();
    let history = past_nights(4, 6, &[&["m"], &["n"]]);
    let mut scheduler = Scheduler::new(
        vec![night()],
        vec![constraint],
        vec![],
        history,
        PlanOptions::default(),
    )
    .unwrap();

    let input = PlanInput::new(date(6), date(8)).with_pool(&tid, [member("m")]);
    let report = scheduler.run(&input, &mut DiscardSink).unwrap();
    assert!(report.entries[0].status.is_understaffed());
    assert_eq!(assigned(&report.entries[1].occurrence), vec!["m"]);
}

#[test]
fn decisions_are_visible_to_later_occurrences() {
    let tid = TemplateId::new("night");
    let constraint = ShiftConstraint::new(tid.clone(), tid.clone(), 1).unwrap();
    let mut scheduler = Scheduler::new(
        vec![night()],
        vec![constraint],
        vec![],
        vec![],
        PlanOptions::default(),
    )
    .unwrap();
    let input = PlanInput::new(date(6), date(10)).with_pool(&tid, [member("a"), member("b")]);
    let report = scheduler.run(&input, &mut DiscardSink).unwrap();
    let rotation: Vec<Vec<&str>> = report
        .entries
        .iter()
        .map(|e| assigned(&e.occurrence))
        .collect();
    assert_eq!(rotation, vec![vec!["a"], vec!["b"], vec!["a"], vec!["b"]]);
    assert_eq!(report.member_load().get(&member("a")), Some(&2));
}

#[test]
fn identical_inputs_give_identical_plans() {
    let tid = TemplateId::new("night");
    let constraints = vec![ShiftConstraint::new(tid.clone(), tid, 1).unwrap()];
    let build = || {
        Scheduler::new(
            vec![night(), day_shift()],
            constraints.clone(),
            vec![],
            vec![],
            PlanOptions::default(),
        )
        .unwrap()
    };
    let input = PlanInput::new(date(6), date(20))
        .with_pool(&TemplateId::new("night"), [member("c"), member("a"), member("b")])
        .with_pool(&TemplateId::new("day"), [member("b"), member("d")])
        .with_headcount(&TemplateId::new("day"), 2);

    let mut first_sink: Vec<ShiftOccurrence> = Vec::new();
    let first = build().run(&input, &mut first_sink).unwrap();
    let mut second_sink: Vec<ShiftOccurrence> = Vec::new();
    let second = build().run(&input, &mut second_sink).unwrap();
    assert_eq!(first, second);
    assert_eq!(first_sink, second_sink);
    assert_eq!(first_sink.len(), first.entries.len());
    for pair in first.entries.windows(2) {
        assert!(pair[0].occurrence.start <= pair[1].occurrence.start);
    }
}

#[test]
fn headcount_limits_assignment_and_reports_missing() {
    let tid = TemplateId::new("day");
    let mut scheduler = Scheduler::new(
        vec![day_shift()],
        vec![],
        vec![],
        vec![],
        PlanOptions::default(),
    )
    .unwrap();
    let input = PlanInput::new(date(6), date(7))
        .with_pool(&tid, [member("a"), member("b"), member("c")])
        .with_headcount(&tid, 2);
    let report = scheduler.run(&input, &mut DiscardSink).unwrap();
    assert_eq!(assigned(&report.entries[0].occurrence), vec!["a", "b"]);

    let input = input.with_headcount(&tid, 4);
    let report = scheduler.run(&input, &mut DiscardSink).unwrap();
    assert_eq!(
        report.entries[0].status,
        StaffingStatus::Understaffed { missing: 1 }
    );
    // les membres déjà chargés passent en dernier, mais tous sont pris
    assert_eq!(report.entries[0].occurrence.assigned.len(), 3);
}

#[test]
fn empty_range_is_not_an_error() {
    let mut scheduler =
        Scheduler::new(vec![night()], vec![], vec![], vec![], PlanOptions::default()).unwrap();
    let report = scheduler
        .run(&PlanInput::new(date(6), date(6)), &mut DiscardSink)
        .unwrap();
    assert!(report.entries.is_empty());
    assert!(report.is_fully_staffed());

    let err = scheduler
        .run(&PlanInput::new(date(7), date(6)), &mut DiscardSink)
        .unwrap_err();
    assert!(matches!(err, PlanError::InvalidRange));
}

#[test]
fn zero_headcount_is_a_configuration_error() {
    let tid = TemplateId::new("night");
    let mut scheduler =
        Scheduler::new(vec![night()], vec![], vec![], vec![], PlanOptions::default()).unwrap();
    let input = PlanInput::new(date(6), date(7)).with_headcount(&tid, 0);
    let err = scheduler.run(&input, &mut DiscardSink).unwrap_err();
    assert!(matches!(err, PlanError::Configuration(_)));
}

struct CancelAfter {
    token: CancelToken,
    limit: usize,
    seen: Vec<ShiftOccurrence>,
}

impl PlanCommitSink for CancelAfter {
    fn commit(
        &mut self,
        occurrence: &ShiftOccurrence,
        _assigned: &BTreeSet<MemberId>,
        _status: StaffingStatus,
    ) -> anyhow::Result<()> {
        self.seen.push(occurrence.clone());
        if self.seen.len() >= self.limit {
            self.token.cancel();
        }
        Ok(())
    }
}

#[test]
fn cancellation_keeps_a_valid_partial_plan() {
    let tid = TemplateId::new("night");
    let mut scheduler =
        Scheduler::new(vec![night()], vec![], vec![], vec![], PlanOptions::default()).unwrap();
    let token = CancelToken::new();
    let mut sink = CancelAfter {
        token: token.clone(),
        limit: 2,
        seen: Vec::new(),
    };
    let input = PlanInput::new(date(6), date(13)).with_pool(&tid, [member("a")]);
    let report = scheduler.run_with_cancel(&input, &mut sink, &token).unwrap();
    assert!(report.cancelled);
    assert_eq!(report.entries.len(), 2);
    assert_eq!(sink.seen.len(), 2);
    assert_eq!(scheduler.history().occurrences(&tid).len(), 2);
}

#[test]
fn sink_failure_stops_the_run() {
    struct Failing;
    impl PlanCommitSink for Failing {
        fn commit(
            &mut self,
            _occurrence: &ShiftOccurrence,
            _assigned: &BTreeSet<MemberId>,
            _status: StaffingStatus,
        ) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }
    let mut scheduler =
        Scheduler::new(vec![night()], vec![], vec![], vec![], PlanOptions::default()).unwrap();
    let err = scheduler
        .run(&PlanInput::new(date(6), date(8)), &mut Failing)
        .unwrap_err();
    assert!(matches!(err, PlanError::Sink(_)));
    assert!(err.to_string().contains("disk full"));
}

#[test]
fn partitioned_run_matches_sequential_run() {
    let night_id = TemplateId::new("night");
    let day_id = TemplateId::new("day");
    let constraints = vec![
        ShiftConstraint::new(night_id.clone(), night_id.clone(), 1).unwrap(),
        ShiftConstraint::new(day_id.clone(), day_id.clone(), 1).unwrap(),
    ];
    let build = || {
        Scheduler::new(
            vec![night(), day_shift()],
            constraints.clone(),
            vec![],
            vec![],
            PlanOptions::default(),
        )
        .unwrap()
    };
    let input = PlanInput::new(date(6), date(27))
        .with_pool(&night_id, [member("a"), member("b"), member("c")])
        .with_pool(&day_id, [member("x"), member("y")]);

    let mut sequential_sink: Vec<ShiftOccurrence> = Vec::new();
    let sequential = build().run(&input, &mut sequential_sink).unwrap();
    let mut partitioned_sink: Vec<ShiftOccurrence> = Vec::new();
    let partitioned = build()
        .run_partitioned(&input, &mut partitioned_sink, &CancelToken::new())
        .unwrap();

    assert_eq!(sequential, partitioned);
    assert_eq!(sequential_sink, partitioned_sink);
}

#[test]
fn audit_reports_manual_breakage() {
    let tid = TemplateId::new("night");
    let constraint = ShiftConstraint::new(tid.clone(), tid.clone(), 1).unwrap();
    let constraint_id = constraint.id.clone();
    let mut scheduler = Scheduler::new(
        vec![night()],
        vec![constraint],
        vec![],
        vec![],
        PlanOptions::default(),
    )
    .unwrap();
    let input = PlanInput::new(date(6), date(9)).with_pool(&tid, [member("a"), member("b")]);
    let mut report = scheduler.run(&input, &mut DiscardSink).unwrap();
    assert!(scheduler.audit(&report).is_empty());

    report.entries[1].occurrence.assigned = [member("a")].into_iter().collect();
    let conflicts = scheduler.audit(&report);
    assert!(conflicts.iter().any(|c| {
        c.member.as_ref() == Some(&member("a"))
            && c.occurrence == report.entries[1].occurrence.id
            && c.kind == ConflictKind::ConstraintViolation(constraint_id.clone())
    }));
}

#[test]
fn override_fills_a_gap_but_refuses_new_violations() {
    let tid = TemplateId::new("night");
    let constraint = ShiftConstraint::new(tid.clone(), tid.clone(), 1).unwrap();
    let start = Utc.with_ymd_and_hms(2025, 10, 7, 20, 0, 0).unwrap();
    let leave = MemberRequest::new(member("c"), start, start + Duration::days(1)).unwrap();
    let mut scheduler = Scheduler::new(
        vec![night()],
        vec![constraint],
        vec![leave],
        vec![],
        PlanOptions::default(),
    )
    .unwrap();
    let input = PlanInput::new(date(6), date(9)).with_pool(&tid, [member("a")]);
    let mut report = scheduler.run(&input, &mut DiscardSink).unwrap();
    let gap = report.entries[1].occurrence.id.clone();
    assert!(report.entries[1].status.is_understaffed());

    let err = scheduler
        .override_member(&mut report, &gap, None, &member("a"))
        .unwrap_err();
    assert!(matches!(err, PlanError::Override("introduces constraint violation")));
    assert!(report.entries[1].occurrence.assigned.is_empty());

    let err = scheduler
        .override_member(&mut report, &gap, None, &member("c"))
        .unwrap_err();
    assert!(matches!(err, PlanError::Override("target member unavailable")));

    scheduler
        .override_member(&mut report, &gap, None, &member("b"))
        .unwrap();
    assert_eq!(report.entries[1].status, StaffingStatus::Staffed);
    assert!(scheduler.audit(&report).is_empty());

    let err = scheduler
        .override_member(&mut report, &gap, None, &member("d"))
        .unwrap_err();
    assert!(matches!(err, PlanError::Override("occurrence already fully staffed")));
}

#[test]
fn override_replaces_an_assigned_member() {
    let tid = TemplateId::new("night");
    let mut scheduler =
        Scheduler::new(vec![night()], vec![], vec![], vec![], PlanOptions::default()).unwrap();
    let input = PlanInput::new(date(6), date(7)).with_pool(&tid, [member("a")]);
    let mut report = scheduler.run(&input, &mut DiscardSink).unwrap();
    let id = report.entries[0].occurrence.id.clone();

    let err = scheduler
        .override_member(&mut report, &id, Some(&member("z")), &member("b"))
        .unwrap_err();
    assert!(matches!(err, PlanError::Override("member not assigned to occurrence")));

    scheduler
        .override_member(&mut report, &id, Some(&member("a")), &member("b"))
        .unwrap();
    assert_eq!(assigned(&report.entries[0].occurrence), vec!["b"]);

    let missing = roulement::OccurrenceId::new("night@1999-01-01");
    assert!(matches!(
        scheduler.override_member(&mut report, &missing, None, &member("c")),
        Err(PlanError::UnknownOccurrence(_))
    ));
}

#[test]
fn simultaneous_overlapping_shifts_never_share_a_member() {
    let a = ShiftTemplate::new("A", 9 * 3600, 8 * 3600, vec![1])
        .unwrap()
        .with_id(TemplateId::new("a"));
    let b = ShiftTemplate::new("B", 9 * 3600, 8 * 3600, vec![1])
        .unwrap()
        .with_id(TemplateId::new("b"));
    let constraints = derive_overlap_constraints(&[a.clone(), b.clone()]);
    let mut scheduler =
        Scheduler::new(vec![a, b], constraints, vec![], vec![], PlanOptions::default()).unwrap();
    let input = PlanInput::new(date(6), date(7))
        .with_pool(&TemplateId::new("a"), [member("m")])
        .with_pool(&TemplateId::new("b"), [member("m")]);

    let mut report = scheduler.run(&input, &mut DiscardSink).unwrap();
    assert_eq!(report.entries.len(), 2);
    assert_eq!(assigned(&report.entries[0].occurrence), vec!["m"]);
    assert!(report.entries[1].occurrence.assigned.is_empty());
    assert_eq!(
        report.entries[1].status,
        StaffingStatus::Understaffed { missing: 1 }
    );

    // double affectation forcée à la main : l'audit la signale
    report.entries[1].occurrence.assigned = [member("m")].into_iter().collect();
    let conflicts = scheduler.audit(&report);
    assert!(conflicts.iter().any(|c| {
        c.member.as_ref() == Some(&member("m"))
            && c.occurrence == report.entries[1].occurrence.id
            && matches!(c.kind, ConflictKind::ConstraintViolation(_))
    }));
}
