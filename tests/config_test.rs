// 設定ファイル解析テスト: settings.yaml / jobs.yaml / マージ / プロファイル表

use std::io::Write;
use std::time::Duration;

use pdf_shrink::config::job::JobFile;
use pdf_shrink::config::load_settings_for_job;
use pdf_shrink::config::merged::MergedConfig;
use pdf_shrink::config::profile::{DEFAULT_TEXT_THRESHOLD, Profile};
use pdf_shrink::config::settings::Settings;
use pdf_shrink::error::CompressError;

// ============================================================
// 1. Settings 構造体のデシリアライズ
// ============================================================

#[test]
fn test_settings_full_yaml() {
    let yaml = r#"
profile: compact
sample_pages: 20
batch_size: 5
streaming_threshold: 100
small_document_pages: 3
parallel_workers: 4
max_escalations: 2
progress_interval_ms: 250
text_threshold: 60
"#;
    let settings = Settings::from_yaml(yaml).expect("should parse full YAML");
    assert_eq!(settings.profile, Profile::Compact);
    assert_eq!(settings.sample_pages, 20);
    assert_eq!(settings.batch_size, 5);
    assert_eq!(settings.streaming_threshold, 100);
    assert_eq!(settings.small_document_pages, 3);
    assert_eq!(settings.parallel_workers, 4);
    assert_eq!(settings.max_escalations, 2);
    assert_eq!(settings.progress_interval_ms, 250);
    assert_eq!(settings.text_threshold, Some(60));
}

#[test]
fn test_settings_empty_yaml() {
    // "{}" はserde_ymlで空のマッピングを意味する
    let settings = Settings::from_yaml("{}").expect("should use defaults for empty YAML");
    assert_eq!(settings.profile, Profile::Balanced);
    assert_eq!(settings.sample_pages, 50);
    assert_eq!(settings.batch_size, 10);
    assert_eq!(settings.parallel_workers, 0);
    assert_eq!(settings.max_escalations, 3);
    assert_eq!(settings.progress_interval_ms, 100);
    assert!(settings.text_threshold.is_none());
}

#[test]
fn test_settings_unknown_profile_is_config_error() {
    let err = Settings::from_yaml("profile: ultra").expect_err("unknown profile");
    assert!(matches!(err, CompressError::ConfigError(_)));
}

// ============================================================
// 2. Job 構造体のデシリアライズ
// ============================================================

#[test]
fn test_job_required_fields_only() {
    let yaml = r#"
jobs:
  - input: "input.pdf"
    output: "output.pdf"
"#;
    let job_file = JobFile::from_yaml(yaml).expect("should parse required fields");
    assert_eq!(job_file.jobs.len(), 1);
    let job = &job_file.jobs[0];
    assert_eq!(job.input, "input.pdf");
    assert_eq!(job.output, "output.pdf");
    assert!(job.profile.is_none());
    assert!(job.text_threshold.is_none());
}

#[test]
fn test_job_missing_required_field() {
    let yaml = r#"
jobs:
  - output: "output.pdf"
"#;
    assert!(JobFile::from_yaml(yaml).is_err());
}

#[test]
fn test_job_output_must_differ_from_input() {
    let yaml = r#"
jobs:
  - input: "same.pdf"
    output: "same.pdf"
"#;
    let err = JobFile::from_yaml(yaml).expect_err("same path");
    assert!(matches!(err, CompressError::ConfigError(_)));
}

// ============================================================
// 3. 設定マージロジック
// ============================================================

#[test]
fn test_merge_job_profile_overrides_settings() {
    let settings = Settings::from_yaml("profile: high").expect("parse settings");
    let job_file = JobFile::from_yaml(
        r#"
jobs:
  - input: "in.pdf"
    output: "out.pdf"
    profile: minimum
    text_threshold: 30
"#,
    )
    .expect("parse job");

    let merged = MergedConfig::new(&settings, &job_file.jobs[0]);
    assert_eq!(merged.compression.profile, Profile::Minimum);
    assert_eq!(merged.compression.text_threshold, 30);
    assert!(!merged.compression.preserve_vectors);
}

#[test]
fn test_merge_no_overrides_uses_settings() {
    let settings = Settings::from_yaml("progress_interval_ms: 40\nbatch_size: 0").expect("parse");
    let job_file = JobFile::from_yaml(
        r#"
jobs:
  - input: "in.pdf"
    output: "out.pdf"
"#,
    )
    .expect("parse job");

    let merged = MergedConfig::new(&settings, &job_file.jobs[0]);
    assert_eq!(merged.compression, Profile::Balanced.config());
    assert_eq!(merged.compression.text_threshold, DEFAULT_TEXT_THRESHOLD);
    assert_eq!(merged.engine.progress_interval, Duration::from_millis(40));
    // a zero batch would never advance
    assert_eq!(merged.engine.batch_size, 1);
}

// ============================================================
// 4. settings.yaml の自動検出
// ============================================================

#[test]
fn test_load_settings_next_to_job_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut f = std::fs::File::create(dir.path().join("settings.yaml")).expect("create");
    writeln!(f, "profile: compact").expect("write");
    let job_path = dir.path().join("jobs.yaml");

    let settings = load_settings_for_job(&job_path).expect("load");
    assert_eq!(settings.profile, Profile::Compact);
}

#[test]
fn test_load_settings_defaults_without_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = load_settings_for_job(&dir.path().join("jobs.yaml")).expect("load");
    assert_eq!(settings.profile, Profile::Balanced);
}

// ============================================================
// 5. プロファイル表
// ============================================================

#[test]
fn test_profiles_escalate_to_minimum() {
    let chain: Vec<Profile> =
        std::iter::successors(Some(Profile::High), |p| p.escalate()).collect();
    assert_eq!(chain, Profile::ALL.to_vec());
}

#[test]
fn test_profile_parameters_derive_from_one_table() {
    let high = Profile::High.config();
    let minimum = Profile::Minimum.config();
    assert!(high.jpeg_quality() > minimum.jpeg_quality());
    assert!(high.background_dpi() > minimum.background_dpi());
    assert!(high.video_crf() < minimum.video_crf());
    assert!(high.image_long_edge() > minimum.image_long_edge());
}
