use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Environment variable carrying the JSON encoded [JobSpec].
pub const JOB_SPEC_ENV: &str = "JOB_SPEC";

/// How the job was triggered. Decides where in object storage the job's output lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Periodic,
    Postsubmit,
    Presubmit,
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pull {
    pub number: u64,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refs {
    pub org: String,
    pub repo: String,
    #[serde(default)]
    pub base_ref: String,
    #[serde(default)]
    pub base_sha: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pulls: Vec<Pull>,
}

/// Metadata describing the job this pod belongs to, handed down by the job scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub job: String,
    #[serde(rename = "buildid")]
    pub build_id: String,
    #[serde(rename = "prowjobid")]
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<Refs>,
}

impl JobSpec {
    /// Resolve the job spec from [JOB_SPEC_ENV].
    pub fn from_env() -> anyhow::Result<Self> {
        let raw = std::env::var(JOB_SPEC_ENV)
            .with_context(|| format!("Environment variable `{JOB_SPEC_ENV}` is not set"))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).with_context(|| format!("Malformed `{JOB_SPEC_ENV}`"))
    }

    /// The name of the test pod launched for this job.
    pub fn pod_name(&self) -> String {
        pod_name_for(&self.job_id)
    }
}

pub fn pod_name_for(job_id: &str) -> String {
    format!("pod-{job_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_presubmit_spec() {
        let spec = JobSpec::from_json(
            r#"{
                "type": "presubmit",
                "job": "e2e-consensus",
                "buildid": "1024",
                "prowjobid": "f3a1",
                "refs": {
                    "org": "owlchain",
                    "repo": "sebak",
                    "base_ref": "master",
                    "pulls": [{"number": 17, "author": "someone", "sha": "abc"}]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(spec.job_type, JobType::Presubmit);
        assert_eq!(spec.pod_name(), "pod-f3a1");
        assert_eq!(spec.refs.unwrap().pulls[0].number, 17);
    }

    #[test]
    fn rejects_malformed_spec() {
        let err = JobSpec::from_json(r#"{"type": "nightly"}"#).unwrap_err();
        assert!(err.to_string().contains(JOB_SPEC_ENV));
    }
}
