//! Project-wide aggregation of longitudinal analysis outputs.
//!
//! Walks every subject's analyses, downloads the whitelisted CSV outputs
//! from the runs that completed, and reconciles the results against the full
//! subject/session roster so that every expected session is represented in
//! the combined tables, either by real rows or by a placeholder.

use crate::client::PlatformClient;
use crate::models::{Analysis, Job, JobState, Project, Session, Subject};
use crate::naming::sanitize_label;
use crate::table::Table;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{error, info, warn};

/// CSV outputs collected from each analysis. Each suffix is prefixed with
/// the project label at runtime to form the expected file name.
pub const CSV_WHITELIST: [&str; 7] = [
    "_aparc_thick_left.csv",
    "_aparc_thick_right.csv",
    "_aparc_area_left.csv",
    "_aparc_area_right.csv",
    "_aparc_vol_left.csv",
    "_aparc_vol_right.csv",
    "_aseg_vol.csv",
];

/// Cell value used for synthesized placeholder rows.
const BLANK_CELL: &str = "-";

/// Info key holding the processing-stage marker.
const STEP_KEY: &str = "longitudinal-step";

/// Info key marking the cross-sectional base timepoint.
const BASE_KEY: &str = "BASE";

/// File type tag of CSV outputs.
const TABULAR_TYPE: &str = "tabular data";

/// Options controlling one aggregation run.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Gear whose analyses are collected.
    pub gear_name: String,
    /// Exact-match version filter, if configured.
    pub gear_version: Option<String>,
    /// Analysis-label filter, if configured.
    pub analysis_regex: Option<Regex>,
    /// Where the combined CSV files are written.
    pub output_dir: PathBuf,
}

/// One slot in a per-filename collection: either a parsed CSV or a record of
/// why an analysis produced nothing, resolved into a blank table later.
#[derive(Debug, Clone)]
pub enum TableEntry {
    Loaded(Table),
    Failed {
        subject: String,
        job_id: String,
        message: String,
    },
}

/// Mutable state threaded through one aggregation run.
#[derive(Debug, Default)]
pub struct AggregateState {
    /// Per-filename collections, keyed by expected output name.
    entries: BTreeMap<String, Vec<TableEntry>>,
    /// subject label -> session label -> times seen in analysis info.
    tally: BTreeMap<String, BTreeMap<String, usize>>,
    /// Successful analyses for the subject currently being scanned.
    subject_completed: usize,
    /// Successful analyses across the whole project.
    total_completed: usize,
    /// Per-subject summary lines, replayed at the end of the run.
    summary: Vec<String>,
}

impl AggregateState {
    fn new(csv_names: &[String]) -> Self {
        Self {
            entries: csv_names
                .iter()
                .map(|name| (name.clone(), Vec::new()))
                .collect(),
            ..Self::default()
        }
    }

    /// Record a failed analysis: every whitelisted table gets a pending
    /// placeholder carrying the failure message.
    fn record_failure(&mut self, subject: &str, job_id: &str, message: &str) {
        for list in self.entries.values_mut() {
            list.push(TableEntry::Failed {
                subject: subject.to_string(),
                job_id: job_id.to_string(),
                message: message.to_string(),
            });
        }
    }

    fn push_loaded(&mut self, csv_name: &str, table: Table) {
        if let Some(list) = self.entries.get_mut(csv_name) {
            list.push(TableEntry::Loaded(table));
        }
    }

    fn record_seen(&mut self, subject: String, session: String) {
        *self
            .tally
            .entry(subject)
            .or_default()
            .entry(session)
            .or_insert(0) += 1;
    }
}

/// Expected output file names for a project: each whitelisted suffix
/// prefixed with the project label.
pub fn expected_csv_names(project_label: &str) -> Vec<String> {
    CSV_WHITELIST
        .iter()
        .map(|suffix| format!("{project_label}{suffix}"))
        .collect()
}

/// Decode one analysis info key into a (subject, session) pair.
///
/// The literal `BASE` marks the cross-sectional base timepoint; any other
/// key is a composite `<subject>-<session>` split on the FIRST hyphen, the
/// same way the processing gear composed it. Keys with no hyphen are not
/// decodable and yield `None`.
fn decode_info_key(key: &str, subject_label: &str) -> Option<(String, String)> {
    if key == BASE_KEY {
        return Some((sanitize_label(subject_label), BASE_KEY.to_string()));
    }

    key.split_once('-')
        .map(|(subject, session)| (subject.to_string(), session.to_string()))
}

/// Outcome of vetting one analysis before any further fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Vetting {
    /// Analysis passed every gate; download its outputs.
    Collect,
    /// Excluded entirely: wrong gear, wrong version, or label filtered out.
    Skip,
    /// Analysis is unusable; synthesize a placeholder with this message.
    Fail(String),
}

/// Apply the per-analysis gates in order.
///
/// The regex gate deliberately sits after the state/info gates: a failed
/// analysis still gets its placeholder even when its label would not have
/// matched the filter.
fn vet_analysis(analysis: &Analysis, options: &AggregateOptions) -> Vetting {
    if analysis.gear_info.name != options.gear_name {
        warn!("IGNORING {} gear analysis", analysis.gear_info.name);
        return Vetting::Skip;
    }

    info!(
        "FOUND job id {}  analysis id {}  gear version {}",
        analysis.job.id, analysis.id, analysis.gear_info.version
    );

    if let Some(ref version) = options.gear_version {
        if &analysis.gear_info.version != version {
            warn!(
                "IGNORING {} version {}",
                options.gear_name, analysis.gear_info.version
            );
            return Vetting::Skip;
        }
    }

    if analysis.job.state != JobState::Complete {
        let message = format!("PROBLEM job state = {}", analysis.job.state);
        warn!("{}", message);
        return Vetting::Fail(message);
    }

    if analysis.info.is_empty() {
        let message = "PROBLEM analysis info is empty".to_string();
        warn!("{}", message);
        return Vetting::Fail(message);
    }

    let Some(step) = analysis.info.get(STEP_KEY) else {
        let message = format!("PROBLEM {} not found", STEP_KEY);
        warn!("{}", message);
        return Vetting::Fail(message);
    };

    if !step.contains("completed") {
        let message = format!("PROBLEM {} is {}", STEP_KEY, step);
        warn!("{}", message);
        return Vetting::Fail(message);
    }

    if let Some(ref pattern) = options.analysis_regex {
        if !pattern.is_match(&analysis.label) {
            warn!(
                "analysis-regex \"{}\" mismatch with analysis label \"{}\"",
                pattern.as_str(),
                analysis.label
            );
            return Vetting::Skip;
        }
        info!(
            "analysis-regex \"{}\" match with analysis label \"{}\"",
            pattern.as_str(),
            analysis.label
        );
    }

    Vetting::Collect
}

/// Record every (subject, session) pair named by an info map into the
/// tally. This runs for failed analyses too: the sessions they attempted
/// are accounted for by the failure placeholder, so the roster pass must
/// not report them a second time.
fn tally_info_sessions(
    state: &mut AggregateState,
    info: &BTreeMap<String, String>,
    subject_label: &str,
) {
    for key in info.keys() {
        if key == STEP_KEY {
            continue;
        }

        match decode_info_key(key, subject_label) {
            Some((subj, sess)) => state.record_seen(subj, sess),
            None => warn!("Unrecognized info key \"{}\"", key),
        }
    }
}

/// Run the whole aggregation against a resolved project.
///
/// Returns the process exit code: 0 when at least one analysis produced
/// CSVs and the combined tables were written, 1 when nothing usable was
/// found anywhere in the project.
pub async fn run(
    client: &PlatformClient,
    project: &Project,
    options: &AggregateOptions,
    show_progress: bool,
) -> Result<i32> {
    let csv_names = expected_csv_names(&project.label);
    let mut state = AggregateState::new(&csv_names);

    info!("Gear name \"{}\"", options.gear_name);
    if let Some(ref version) = options.gear_version {
        info!("Gear version \"{}\"", version);
    }

    let subjects = client
        .list_subjects(&project.id)
        .await
        .context("Failed to list project subjects")?;

    let progress = if show_progress {
        let pb = ProgressBar::new(subjects.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} subjects")
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    for subject in &subjects {
        state.subject_completed = 0;

        let analyses = client
            .list_analyses(&subject.id)
            .await
            .with_context(|| format!("Failed to list analyses for subject {}", subject.label))?;

        info!(
            "Subject {} has {} analyses to check for csv files",
            subject.label,
            analyses.len()
        );

        for analysis in &analyses {
            scan_analysis(client, &mut state, options, subject, analysis).await?;
        }

        state.summary.push(format!(
            "Subject {} had {} {} successful analyses",
            subject.label, state.subject_completed, options.gear_name
        ));
        state.total_completed += state.subject_completed;

        if let Some(ref pb) = progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    for line in &state.summary {
        info!("{}", line);
    }
    info!(
        "Project {} had {} {} successful analyses",
        project.label, state.total_completed, options.gear_name
    );

    if state.total_completed == 0 {
        error!("No analyses found.");
        return Ok(1);
    }

    let templates = header_templates(&state);
    resolve_failures(&mut state, &templates, &project.label);

    let sessions = client
        .list_sessions(&project.id)
        .await
        .context("Failed to list project sessions")?;
    reconcile_roster(&mut state, &templates, &project.label, &sessions);

    write_outputs(&state, &templates, &csv_names, &options.output_dir)?;

    Ok(0)
}

/// Vet one analysis and, when it passes, pull its CSV outputs.
async fn scan_analysis(
    client: &PlatformClient,
    state: &mut AggregateState,
    options: &AggregateOptions,
    subject: &Subject,
    analysis: &Analysis,
) -> Result<()> {
    match vet_analysis(analysis, options) {
        Vetting::Skip => Ok(()),
        Vetting::Fail(message) => {
            tally_info_sessions(state, &analysis.info, &subject.label);
            state.record_failure(&subject.label, &analysis.job.id, &message);
            Ok(())
        }
        Vetting::Collect => {
            let job = client
                .get_job(&analysis.job.id)
                .await
                .with_context(|| format!("Failed to fetch job {}", analysis.job.id))?;
            collect_outputs(client, state, subject, analysis, &job).await
        }
    }
}

/// Tally the sessions recorded in the analysis info, then download and
/// parse every whitelisted CSV output into the per-filename collections.
///
/// Downloads land in a scratch directory scoped to this analysis; it is
/// removed when this function returns, on the error paths included.
async fn collect_outputs(
    client: &PlatformClient,
    state: &mut AggregateState,
    subject: &Subject,
    analysis: &Analysis,
    job: &Job,
) -> Result<()> {
    let total_ms = job
        .profile
        .as_ref()
        .and_then(|profile| profile.total_time_ms)
        .unwrap_or(0);

    info!("Info:");
    for (key, value) in &analysis.info {
        info!("  {:>30} : {} ms : {}", key, total_ms, value.trim_end());
    }
    tally_info_sessions(state, &analysis.info, &subject.label);

    let csvs: Vec<_> = analysis
        .files
        .iter()
        .filter(|f| f.file_type == TABULAR_TYPE && state.entries.contains_key(&f.name))
        .collect();

    if csvs.is_empty() {
        let message = "PROBLEM No CSV files".to_string();
        error!("{}", message);
        state.record_failure(&subject.label, &analysis.job.id, &message);
        return Ok(());
    }

    state.subject_completed += 1;

    info!("CSV files:");
    let scratch = TempDir::new().context("Failed to create scratch directory")?;

    for file in csvs {
        info!("  Reading {}", file.name);

        let path = scratch.path().join(&file.name);
        client
            .download_file(&analysis.id, &file.name, &path)
            .await
            .with_context(|| format!("Failed to download {}", file.name))?;

        let table = Table::from_csv_path(&path)
            .with_context(|| format!("Failed to parse {}", file.name))?;
        state.push_loaded(&file.name, table);
    }

    Ok(())
}

/// Header template per filename: the column names of the first parsed table
/// in each collection. Filenames that never saw a real table get no entry.
fn header_templates(state: &AggregateState) -> BTreeMap<String, Vec<String>> {
    let mut templates = BTreeMap::new();

    for (name, list) in &state.entries {
        let headers = list.iter().find_map(|entry| match entry {
            TableEntry::Loaded(table) => Some(table.headers.clone()),
            TableEntry::Failed { .. } => None,
        });
        if let Some(headers) = headers {
            templates.insert(name.clone(), headers);
        }
    }

    templates
}

/// One placeholder row under the given headers: every cell blank, column 0
/// set to the project label.
fn blank_table(headers: &[String], project_label: &str) -> Table {
    let mut table = Table::new(headers.to_vec());
    table.rows.push(vec![BLANK_CELL.to_string(); headers.len()]);
    table.set_cell(0, 0, project_label);
    table
}

/// Resolve every pending failure into a one-row blank table: column 1 is the
/// subject label, column 2 composes the job id with the failure message.
fn resolve_failures(
    state: &mut AggregateState,
    templates: &BTreeMap<String, Vec<String>>,
    project_label: &str,
) {
    for (name, list) in state.entries.iter_mut() {
        let Some(headers) = templates.get(name) else {
            continue;
        };

        for entry in list.iter_mut() {
            if let TableEntry::Failed {
                subject,
                job_id,
                message,
            } = entry
            {
                let mut table = blank_table(headers, project_label);
                table.set_cell(0, 1, subject);
                table.set_cell(0, 2, &format!("job.id={job_id} {message}"));
                *entry = TableEntry::Loaded(table);
            }
        }
    }
}

/// Compare the tally against the full roster of sessions. Pairs never seen
/// in any analysis info get a placeholder row in every table; pairs seen
/// more than once are logged as an anomaly and left alone.
fn reconcile_roster(
    state: &mut AggregateState,
    templates: &BTreeMap<String, Vec<String>>,
    project_label: &str,
    sessions: &[Session],
) {
    for session in sessions {
        let session_label = sanitize_label(&session.label);
        let subject_label = sanitize_label(&session.subject.label);

        let count = state
            .tally
            .get(&subject_label)
            .and_then(|sessions| sessions.get(&session_label))
            .copied();

        match count {
            None => {
                if state.tally.contains_key(&subject_label) {
                    error!(
                        "Session \"{}\" for Subject \"{}\" was not processed",
                        session_label, subject_label
                    );
                } else {
                    error!(
                        "Subject \"{}\", Session \"{}\" was not processed",
                        subject_label, session_label
                    );
                }

                for (name, list) in state.entries.iter_mut() {
                    let Some(headers) = templates.get(name) else {
                        continue;
                    };
                    let mut table = blank_table(headers, project_label);
                    table.set_cell(0, 1, &subject_label);
                    table.set_cell(0, 2, &session_label);
                    list.push(TableEntry::Loaded(table));
                }
            }
            Some(n) if n > 1 => {
                error!(
                    "Session \"{}\" for Subject \"{}\" was processed {} times",
                    session_label, subject_label, n
                );
            }
            Some(_) => {}
        }
    }
}

/// Concatenate each filename's tables in insertion order and write them to
/// the output directory. Filenames with no header template are skipped with
/// a warning, since there is nothing to shape their placeholder rows with.
fn write_outputs(
    state: &AggregateState,
    templates: &BTreeMap<String, Vec<String>>,
    csv_names: &[String],
    output_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;

    for name in csv_names {
        let Some(headers) = templates.get(name) else {
            warn!(
                "No analysis produced {} anywhere in the project, skipping it",
                name
            );
            continue;
        };

        let mut combined = Table::new(headers.clone());
        if let Some(list) = state.entries.get(name) {
            for entry in list {
                if let TableEntry::Loaded(table) = entry {
                    combined.extend_rows(table);
                }
            }
        }

        info!("Writing {}", name);
        combined.write_csv_path(&output_dir.join(name))?;
    }

    Ok(())
}
