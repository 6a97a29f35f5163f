use serde::Deserialize;

use super::profile::Profile;

#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub input: String,
    pub output: String,
    pub profile: Option<Profile>,
    pub text_threshold: Option<usize>,
}

impl JobFile {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        let job_file: JobFile = serde_yml::from_str(yaml)?;
        for job in &job_file.jobs {
            job.validate()?;
        }
        Ok(job_file)
    }
}

impl Job {
    /// 入力と出力が同じパスのジョブは拒否する（入力は読み取り専用）。
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.input.trim().is_empty() || self.output.trim().is_empty() {
            return Err(crate::error::CompressError::config(
                "Job input and output must not be empty",
            ));
        }
        if self.input == self.output {
            return Err(crate::error::CompressError::config(format!(
                "Job output must differ from input: '{}'",
                self.input
            )));
        }
        Ok(())
    }
}
