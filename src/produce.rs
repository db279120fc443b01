//! `clearview report` and `clearview narrate`.
//!
//! One-shot CLI runs of the pipeline flows. The artifact is written to disk
//! and stored in the record database, and a short summary goes to stdout.
//! `clearview report --narrate` runs both flows over one extraction.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::get::write_output;
use crate::models::{suggested_filename, ArtifactKind, AssessmentResult};
use crate::pipeline::{AudioOutcome, FullOutcome, Pipeline, ReportOutcome};

pub async fn run_report(config: &Config, input: &str, out: Option<PathBuf>) -> Result<()> {
    let pipeline = Pipeline::from_config(config).await?;
    let outcome = pipeline.analyze_and_report(input).await?;
    let path = save_report(&outcome, out)?;
    print_report(&outcome, &path);
    Ok(())
}

pub async fn run_narrate(
    config: &Config,
    input: &str,
    voice: Option<&str>,
    out: Option<PathBuf>,
) -> Result<()> {
    let pipeline = Pipeline::from_config(config).await?;
    let outcome = pipeline.analyze_and_narrate(input, voice).await?;
    let path = save_audio(&outcome, out)?;
    print_audio(&outcome, &path);
    Ok(())
}

/// Report and narration produced concurrently. Whichever side succeeds is
/// written even if the other fails; the command fails if either did.
pub async fn run_report_and_narrate(
    config: &Config,
    input: &str,
    voice: Option<&str>,
    out: Option<PathBuf>,
) -> Result<()> {
    let pipeline = Pipeline::from_config(config).await?;
    let full = pipeline.analyze_full(input, voice).await?;
    let (report_path, audio_path) = save_full(&full, out)?;

    if let (Ok(outcome), Some(path)) = (&full.report, &report_path) {
        print_report(outcome, path);
    }
    if let (Ok(outcome), Some(path)) = (&full.audio, &audio_path) {
        println!();
        print_audio(outcome, path);
    }

    match (full.report, full.audio) {
        (Err(e), _) => Err(anyhow::anyhow!("report failed: {}", e)),
        (_, Err(e)) => Err(anyhow::anyhow!("narration failed: {}", e)),
        _ => Ok(()),
    }
}

/// Write whichever artifacts a full run produced. The audio file sits next
/// to the report with an `.mp3` extension.
pub fn save_full(
    full: &FullOutcome,
    out: Option<PathBuf>,
) -> Result<(Option<PathBuf>, Option<PathBuf>)> {
    let report_path = out.unwrap_or_else(|| {
        PathBuf::from(suggested_filename(&full.extraction.title, ArtifactKind::Report))
    });
    let audio_path = companion_audio_path(&report_path);

    let written_report = match &full.report {
        Ok(outcome) => Some(save_report(outcome, Some(report_path))?),
        Err(e) => {
            tracing::error!(error = %e, "report not written");
            None
        }
    };
    let written_audio = match &full.audio {
        Ok(outcome) => Some(save_audio(outcome, Some(audio_path))?),
        Err(e) => {
            tracing::error!(error = %e, "audio not written");
            None
        }
    };
    Ok((written_report, written_audio))
}

pub fn companion_audio_path(report_path: &Path) -> PathBuf {
    report_path.with_extension(ArtifactKind::Audio.extension())
}

fn save_report(outcome: &ReportOutcome, out: Option<PathBuf>) -> Result<PathBuf> {
    let path = out.unwrap_or_else(|| {
        PathBuf::from(suggested_filename(&outcome.extraction.title, ArtifactKind::Report))
    });
    write_output(&path, &outcome.pdf)?;
    Ok(path)
}

fn save_audio(outcome: &AudioOutcome, out: Option<PathBuf>) -> Result<PathBuf> {
    let path = out.unwrap_or_else(|| {
        PathBuf::from(suggested_filename(&outcome.extraction.title, ArtifactKind::Audio))
    });
    write_output(&path, &outcome.audio)?;
    Ok(path)
}

fn print_report(outcome: &ReportOutcome, path: &Path) {
    let extraction = &outcome.extraction;
    println!("--- Report ---");
    println!("title:      {}", extraction.title);
    println!("source:     {}", extraction.source);
    println!("input_type: {}", extraction.input_type);
    println!("method:     {}", extraction.extraction_method);
    println!("words:      {}", extraction.word_count);
    println!();
    for (aspect, result) in &outcome.results {
        match result {
            AssessmentResult::Completed { .. } => println!("  {:<13} ok", aspect.as_str()),
            AssessmentResult::Failed { error } => {
                println!("  {:<13} failed: {}", aspect.as_str(), error)
            }
        }
    }
    println!();
    if let Some(id) = &outcome.id {
        println!("id:         {}", id);
    }
    if let Some(err) = &outcome.error {
        println!("warning:    {}", err);
    }
    println!("written to: {}", path.display());
}

fn print_audio(outcome: &AudioOutcome, path: &Path) {
    println!("--- Audio ---");
    println!("title:      {}", outcome.extraction.title);
    println!("provider:   {}", outcome.provider);
    println!("bytes:      {}", outcome.audio.len());
    if let Some(id) = &outcome.id {
        println!("id:         {}", id);
    }
    if let Some(err) = &outcome.error {
        println!("warning:    {}", err);
    }
    println!("written to: {}", path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_lands_next_to_report() {
        assert_eq!(
            companion_audio_path(Path::new("out/notice.pdf")),
            PathBuf::from("out/notice.mp3")
        );
        assert_eq!(
            companion_audio_path(Path::new("notice")),
            PathBuf::from("notice.mp3")
        );
    }
}
