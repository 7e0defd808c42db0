use std::io::ErrorKind;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use super::{ConversionJob, ConvertError, PdfStrategy};
use crate::config::OfficeSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Highest-fidelity state: a headless office suite renders the DOCX itself.
pub struct OfficeConverter {
    settings: OfficeSettings,
}

impl OfficeConverter {
    pub fn new(settings: OfficeSettings) -> Self {
        Self { settings }
    }
}

impl PdfStrategy for OfficeConverter {
    fn name(&self) -> &'static str {
        "office"
    }

    fn convert(&self, job: &ConversionJob<'_>) -> Result<Vec<u8>, ConvertError> {
        if !self.settings.enabled {
            return Err(ConvertError::MissingDependency(
                "office converter (disabled)".to_string(),
            ));
        }

        // Output directory and a private profile so parallel conversions do not
        // contend for the suite's user-installation lock.
        let scratch = tempfile::Builder::new()
            .prefix("office_")
            .tempdir_in(job.work_dir)?;
        let out_dir = scratch.path().join("out");
        let profile_dir = scratch.path().join("profile");
        std::fs::create_dir_all(&out_dir)?;

        let spawned = Command::new(&self.settings.binary)
            .arg(format!(
                "-env:UserInstallation=file://{}",
                profile_dir.display()
            ))
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(&out_dir)
            .arg(job.document)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConvertError::MissingDependency(format!(
                    "office converter ({})",
                    self.settings.binary.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        // Bounded wait: a wedged converter is killed instead of holding the request.
        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.settings.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ConvertError::Failed(format!(
                    "office converter timed out after {}s",
                    self.settings.timeout.as_secs()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        };
        if !status.success() {
            return Err(ConvertError::Failed(format!(
                "office converter exited with {}",
                status
            )));
        }

        let stem = job
            .document
            .file_stem()
            .ok_or_else(|| ConvertError::Failed("document has no file name".to_string()))?;
        let pdf_path = out_dir.join(format!("{}.pdf", stem.to_string_lossy()));
        std::fs::read(&pdf_path).map_err(|e| {
            ConvertError::Failed(format!("office converter produced no PDF: {}", e))
        })
    }
}
