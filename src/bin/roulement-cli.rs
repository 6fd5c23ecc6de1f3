#![forbid(unsafe_code)]
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use clap::{Parser, Subcommand};
use roulement::{
    calendar, io,
    model::{MemberGroup, ShiftConstraint},
    repository::DiscardSink,
    scheduler::{
        self, CancelToken, ConflictKind, PlanOptions, PlanReport, PlannedOccurrence, Scheduler,
    },
    storage::{Dataset, JsonStorage, Staffing, Storage},
    template::{derive_overlap_constraints, ShiftTemplate},
    AvailabilityIndex, ConstraintTable, HistoryTracker, StaffingStatus,
};
#[cfg(feature = "logging")]
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

/// CLI de planification de gardes récurrentes (sans base de données)
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Active les logs (feature `logging`)
    #[arg(long, global = true)]
    log: bool,

    /// Fichier JSON du jeu de données
    #[arg(long, global = true, default_value = "roulement.json")]
    data: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Créer un groupe de membres
    AddGroup {
        #[arg(long)]
        name: String,
    },

    /// Importer des membres depuis un CSV (`name,email[,group]`)
    ImportMembers {
        #[arg(long)]
        csv: String,
    },

    /// Importer des indisponibilités depuis un CSV (`email,start,end[,description]`)
    ImportRequests {
        #[arg(long)]
        csv: String,
    },

    /// Créer un template de créneau
    AddTemplate {
        #[arg(long)]
        name: String,
        /// Heure de début UTC, `HH:MM`
        #[arg(long)]
        start: String,
        #[arg(long)]
        duration_minutes: i64,
        /// Jours actifs "1,3,5" (0 = dimanche … 6 = samedi)
        #[arg(long)]
        days: String,
    },

    /// Interdire `template` à qui a fait l'un des `within` derniers `linked`
    AddConstraint {
        #[arg(long)]
        template: String,
        #[arg(long)]
        linked: String,
        #[arg(long, default_value_t = 1)]
        within: u32,
    },

    /// Générer les contraintes des templates qui se chevauchent
    DeriveConstraints,

    /// Rattacher des groupes (et un effectif) à un template
    Staff {
        #[arg(long)]
        template: String,
        /// liste "groupe1,groupe2,..."
        #[arg(long)]
        groups: String,
        #[arg(long)]
        headcount: Option<u32>,
    },

    /// Planifier les créneaux de `[start, end)`
    Plan {
        /// YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// YYYY-MM-DD (exclu)
        #[arg(long)]
        end: String,
        /// Ne rien enregistrer
        #[arg(long)]
        dry_run: bool,
        /// Planifier en parallèle les templates indépendants
        #[arg(long)]
        parallel: bool,
        #[arg(long)]
        out_csv: Option<String>,
    },

    /// Lister les créneaux enregistrés
    List {
        #[arg(long)]
        out_json: Option<String>,
    },

    /// Vérifier les créneaux enregistrés
    Check {
        /// Export CSV des conflits (optionnel)
        #[arg(long)]
        report: Option<String>,
    },

    /// Exporter les calendriers ICS (un par membre + all.ics)
    Ics {
        #[arg(long)]
        out_dir: String,
        /// YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// YYYY-MM-DD (exclu)
        #[arg(long)]
        end: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "logging")]
    if cli.log {
        if let Err(err) = Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init()
        {
            eprintln!("logging disabled: {err}");
        }
    }

    let storage = JsonStorage::open(&cli.data)?;
    let mut dataset = if storage.path().exists() {
        storage.load()?
    } else {
        Dataset::default()
    };

    let code = match cli.cmd {
        Commands::AddGroup { name } => {
            let id = dataset.add_group(MemberGroup::new(name)?)?;
            storage.save(&dataset)?;
            println!("{id}");
            0
        }
        Commands::ImportMembers { csv } => {
            let members = io::import_members_csv(csv, &dataset.groups)?;
            let count = members.len();
            for member in members {
                dataset.add_member(member)?;
            }
            storage.save(&dataset)?;
            println!("{count} member(s) imported");
            0
        }
        Commands::ImportRequests { csv } => {
            let requests = io::import_requests_csv(csv, &dataset.members)?;
            let count = requests.len();
            for request in requests {
                dataset.add_request(request)?;
            }
            storage.save(&dataset)?;
            println!("{count} request(s) imported");
            0
        }
        Commands::AddTemplate {
            name,
            start,
            duration_minutes,
            days,
        } => {
            let time = NaiveTime::parse_from_str(&start, "%H:%M")
                .with_context(|| format!("invalid start time: {start}"))?;
            let template = ShiftTemplate::new(
                name,
                time.num_seconds_from_midnight(),
                duration_minutes
                    .checked_mul(60)
                    .with_context(|| format!("duration too large: {duration_minutes} minutes"))?,
                parse_days(&days)?,
            )?;
            let id = dataset.add_template(template)?;
            storage.save(&dataset)?;
            println!("{id}");
            0
        }
        Commands::AddConstraint {
            template,
            linked,
            within,
        } => {
            let owner = template_id(&dataset, &template)?;
            let linked = template_id(&dataset, &linked)?;
            dataset.add_constraint(ShiftConstraint::new(owner, linked, within)?)?;
            storage.save(&dataset)?;
            0
        }
        Commands::DeriveConstraints => {
            let derived = derive_overlap_constraints(&dataset.templates);
            let summary = dataset.merge_constraints(derived);
            storage.save(&dataset)?;
            println!(
                "created {}, updated {}, unchanged {}",
                summary.created, summary.updated, summary.unchanged
            );
            0
        }
        Commands::Staff {
            template,
            groups,
            headcount,
        } => {
            let template = template_id(&dataset, &template)?;
            let mut ids = Vec::new();
            for name in groups.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let group = dataset
                    .find_group_by_name(name)
                    .ok_or_else(|| anyhow::anyhow!("unknown group: {}", name))?;
                ids.push(group.id.clone());
            }
            dataset.set_staffing(Staffing {
                template,
                groups: ids,
                headcount,
            })?;
            storage.save(&dataset)?;
            0
        }
        Commands::Plan {
            start,
            end,
            dry_run,
            parallel,
            out_csv,
        } => {
            let input = dataset.plan_input(parse_date(&start)?, parse_date(&end)?);
            let mut scheduler = Scheduler::load(&dataset, &input, PlanOptions::default())?;
            let cancel = CancelToken::new();
            let report = match (dry_run, parallel) {
                (true, false) => scheduler.run(&input, &mut DiscardSink)?,
                (true, true) => scheduler.run_partitioned(&input, &mut DiscardSink, &cancel)?,
                (false, false) => scheduler.run(&input, &mut dataset)?,
                (false, true) => scheduler.run_partitioned(&input, &mut dataset, &cancel)?,
            };
            if !dry_run {
                storage.save(&dataset)?;
            }
            if let Some(path) = out_csv {
                io::export_plan_csv(path, &report, &dataset)?;
            }
            print_plan(&report, &dataset);
            if report.is_fully_staffed() {
                0
            } else {
                eprintln!("{} understaffed occurrence(s)", report.understaffed().count());
                // Code 2 = WARNING/INCOMPLETE
                2
            }
        }
        Commands::List { out_json } => {
            if let Some(path) = out_json {
                io::export_dataset_json(path, &dataset)?;
            }
            let mut occurrences: Vec<_> = dataset.occurrences.iter().collect();
            occurrences.sort_by(|a, b| {
                a.start
                    .cmp(&b.start)
                    .then_with(|| a.template.cmp(&b.template))
            });
            for o in occurrences {
                println!(
                    "{} | {} → {} | {}",
                    o.id.as_str(),
                    o.start.to_rfc3339(),
                    o.end.to_rfc3339(),
                    member_list(&dataset, o.assigned.iter())
                );
            }
            0
        }
        Commands::Check { report } => {
            let conflicts = check_stored(&dataset)?;
            if conflicts.is_empty() {
                println!("OK: no conflicts");
                0
            } else {
                eprintln!("Found {} conflict(s)", conflicts.len());
                if let Some(path) = report {
                    let mut w = csv::Writer::from_path(path)?;
                    w.write_record(["occurrence", "member", "kind", "detail"])?;
                    for c in &conflicts {
                        let (kind, detail) = match &c.kind {
                            ConflictKind::Unavailable => ("unavailable", String::new()),
                            ConflictKind::ConstraintViolation(id) => ("constraint", id.to_string()),
                            ConflictKind::Understaffed { missing } => {
                                ("understaffed", missing.to_string())
                            }
                        };
                        w.write_record([
                            c.occurrence.as_str(),
                            c.member.as_ref().map(|m| m.as_str()).unwrap_or(""),
                            kind,
                            detail.as_str(),
                        ])?;
                    }
                    w.flush()?;
                }
                2
            }
        }
        Commands::Ics {
            out_dir,
            start,
            end,
        } => {
            let start = Utc.from_utc_datetime(&parse_date(&start)?.and_time(NaiveTime::MIN));
            let end = Utc.from_utc_datetime(&parse_date(&end)?.and_time(NaiveTime::MIN));
            let written =
                calendar::export_all_members_ics(&dataset, out_dir, start, end, Utc::now())?;
            println!("{} calendar file(s) written", written.len());
            0
        }
    };

    std::process::exit(code);
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date (expected YYYY-MM-DD): {raw}"))
}

fn parse_days(raw: &str) -> Result<Vec<u8>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u8>().with_context(|| format!("invalid weekday: {s}")))
        .collect()
}

fn template_id(dataset: &Dataset, name: &str) -> Result<roulement::TemplateId> {
    dataset
        .find_template_by_name(name)
        .map(|t| t.id.clone())
        .ok_or_else(|| anyhow::anyhow!("unknown template: {}", name))
}

fn member_list<'a, I>(dataset: &Dataset, members: I) -> String
where
    I: Iterator<Item = &'a roulement::MemberId>,
{
    let names: Vec<&str> = members
        .map(|id| {
            dataset
                .find_member_by_id(id)
                .map(|m| m.email.as_str())
                .unwrap_or(id.as_str())
        })
        .collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

fn print_plan(report: &PlanReport, dataset: &Dataset) {
    for entry in &report.entries {
        let flag = match entry.status {
            StaffingStatus::Staffed => String::new(),
            StaffingStatus::Understaffed { missing } => format!(" (missing {missing})"),
        };
        println!(
            "{} | {} | {}{}",
            entry.occurrence.id.as_str(),
            entry.occurrence.start.to_rfc3339(),
            member_list(dataset, entry.occurrence.assigned.iter()),
            flag
        );
    }
    for (member, count) in report.member_load() {
        println!("{}: {count}", member_list(dataset, std::iter::once(&member)));
    }
}

/// Rejoue les créneaux enregistrés, dans l'ordre chronologique.
fn check_stored(dataset: &Dataset) -> Result<Vec<scheduler::Conflict>> {
    let constraints = ConstraintTable::build(&dataset.templates, dataset.constraints.clone())?;
    let availability = AvailabilityIndex::build(dataset.requests.clone());
    let default_headcount = PlanOptions::default().default_headcount;
    let entries: Vec<PlannedOccurrence> = dataset
        .occurrences
        .iter()
        .map(|o| {
            let required = dataset
                .headcount_of(&o.template)
                .unwrap_or(default_headcount);
            PlannedOccurrence {
                occurrence: o.clone(),
                required,
                status: StaffingStatus::from_counts(o.assigned.len(), required),
                rejections: Vec::new(),
            }
        })
        .collect();
    Ok(scheduler::audit(
        &entries,
        &constraints,
        &availability,
        &HistoryTracker::new(),
    ))
}
