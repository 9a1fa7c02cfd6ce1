//! Data models for the platform's REST resources.
//!
//! These are read-only views of what the platform returns while one run is
//! in flight: the destination container, the owning project, its subjects
//! and sessions, and each subject's analyses.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Parent references attached to every container.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerParents {
    /// Owning project id, if the container sits under a project.
    #[serde(default)]
    pub project: Option<String>,
    /// Owning subject id, if any.
    #[allow(dead_code)] // Response field
    #[serde(default)]
    pub subject: Option<String>,
    /// Owning session id, if any.
    #[allow(dead_code)] // Response field
    #[serde(default)]
    pub session: Option<String>,
}

/// A generic container, fetched when resolving the gear destination.
#[derive(Debug, Clone, Deserialize)]
pub struct Container {
    #[allow(dead_code)] // Response field
    pub id: String,
    #[serde(rename = "type")]
    pub container_type: String,
    #[allow(dead_code)] // Response field
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub parents: ContainerParents,
}

/// A project, the root of one aggregation run.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: String,
    pub label: String,
}

/// A subject belonging to a project.
#[derive(Debug, Clone, Deserialize)]
pub struct Subject {
    pub id: String,
    pub label: String,
}

/// A session belonging to a subject.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    #[allow(dead_code)] // Response field
    pub id: String,
    pub label: String,
    pub subject: SubjectRef,
}

/// Shallow subject reference embedded in a session.
#[derive(Debug, Clone, Deserialize)]
pub struct SubjectRef {
    #[allow(dead_code)] // Response field
    pub id: String,
    pub label: String,
}

/// Name and version of the gear that produced an analysis.
#[derive(Debug, Clone, Deserialize)]
pub struct GearInfo {
    pub name: String,
    pub version: String,
}

/// Execution state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Complete,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Complete => write!(f, "complete"),
            JobState::Failed => write!(f, "failed"),
            JobState::Cancelled => write!(f, "cancelled"),
            JobState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Shallow job reference embedded in an analysis.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRef {
    pub id: String,
    pub state: JobState,
}

/// A full job record, fetched for its profile timings.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    #[allow(dead_code)] // Response field
    pub id: String,
    #[allow(dead_code)] // Response field
    pub state: JobState,
    #[serde(default)]
    pub profile: Option<JobProfile>,
}

/// Runtime profile recorded with a finished job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobProfile {
    #[serde(default)]
    pub total_time_ms: Option<u64>,
}

/// An output file attached to an analysis.
#[derive(Debug, Clone, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: String,
}

/// One execution record of a gear against a subject.
///
/// The `info` map records per-(subject, session) processing steps; a
/// `BTreeMap` keeps iteration order stable so repeated runs over the same
/// project log and tally in the same order.
#[derive(Debug, Clone, Deserialize)]
pub struct Analysis {
    pub id: String,
    pub label: String,
    pub gear_info: GearInfo,
    pub job: JobRef,
    #[serde(default)]
    pub info: BTreeMap<String, String>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_display() {
        assert_eq!(JobState::Complete.to_string(), "complete");
        assert_eq!(JobState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_job_state_unknown_catch_all() {
        let state: JobState = serde_json::from_str("\"retried\"").unwrap();
        assert_eq!(state, JobState::Unknown);
    }

    #[test]
    fn test_parse_analysis() {
        let json = r#"{
            "id": "a1",
            "label": "longitudinal step 3",
            "gear_info": {"name": "freesurfer-long", "version": "1.2.0"},
            "job": {"id": "j1", "state": "complete"},
            "info": {
                "longitudinal-step": "3 completed",
                "s1-w00": "done"
            },
            "files": [
                {"name": "StudyA_aseg_vol.csv", "type": "tabular data"},
                {"name": "recon.log", "type": "log"}
            ]
        }"#;

        let analysis: Analysis = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.gear_info.name, "freesurfer-long");
        assert_eq!(analysis.job.state, JobState::Complete);
        assert_eq!(analysis.info.len(), 2);
        assert_eq!(analysis.files[0].file_type, "tabular data");
    }

    #[test]
    fn test_parse_container_without_project_parent() {
        let json = r#"{"id": "c1", "type": "subject", "parents": {"subject": "s1"}}"#;
        let container: Container = serde_json::from_str(json).unwrap();
        assert_eq!(container.container_type, "subject");
        assert!(container.parents.project.is_none());
    }

    #[test]
    fn test_parse_session_with_subject_ref() {
        let json = r#"{
            "id": "ses1",
            "label": "w52",
            "subject": {"id": "s1", "label": "subject one"}
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.subject.label, "subject one");
    }
}
