//! Csound command-line backend

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::{fill_template, DrumRequest, DrumSynth, SynthError};

/// Renders a `.csd` drum template with the `csound` executable
#[derive(Debug, Clone)]
pub struct CsoundRenderer {
    template: PathBuf,
    binary: String,
}

impl CsoundRenderer {
    pub fn new(template: PathBuf, binary: String) -> Self {
        Self { template, binary }
    }

    /// Template file with placeholders filled in for `request`
    fn score(&self, request: &DrumRequest, output: &Path) -> Result<tempfile::NamedTempFile, SynthError> {
        let template = std::fs::read_to_string(&self.template).map_err(|source| SynthError::Template {
            path: self.template.clone(),
            source,
        })?;

        let score = tempfile::Builder::new()
            .prefix("automix_drums_")
            .suffix(".csd")
            .tempfile()
            .map_err(SynthError::Score)?;
        std::fs::write(score.path(), fill_template(&template, output, request))
            .map_err(SynthError::Score)?;
        Ok(score)
    }
}

impl DrumSynth for CsoundRenderer {
    fn render(&self, request: &DrumRequest, output: &Path) -> Result<(), SynthError> {
        request.validate()?;
        log::info!(
            "CsoundRenderer: {} beats at {:.2} BPM from {:?}",
            request.number_of_beats(),
            request.bpm,
            self.template
        );

        // Removed when dropped, whichever way this returns
        let score = self.score(request, output)?;

        let result = Command::new(&self.binary)
            .arg(score.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| SynthError::Launch {
                binary: self.binary.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(SynthError::CompileFailed {
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        if !output.exists() {
            return Err(SynthError::MissingOutput(output.to_path_buf()));
        }

        log::info!("CsoundRenderer: rendered {:?}", output);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "csound"
    }
}
