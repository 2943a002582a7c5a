//! Submission checks and normalization.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tm_core::SubmissionError;

use crate::state::MixInput;

/// Output container extensions mkvmerge can write.
pub const OUTPUT_EXTENSIONS: &[&str] = &["mkv", "mka", "mks", "webm"];

/// A mix as the caller describes it, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixRequest {
    pub output_path: PathBuf,
    pub inputs: Vec<MixInput>,
}

impl MixRequest {
    pub fn new(output_path: impl Into<PathBuf>, inputs: Vec<MixInput>) -> Self {
        Self {
            output_path: output_path.into(),
            inputs,
        }
    }
}

/// Normalize a request into the output path and inputs a job is built from.
///
/// The output path gets a `.mkv` extension when it has none. Track ids are
/// trimmed, blank ids are dropped and repeats collapsed; inputs left without
/// tracks are dropped. Language overrides for ids that are not mixed, and
/// blank overrides, are ignored.
pub fn validate(request: MixRequest) -> Result<(PathBuf, Vec<MixInput>), SubmissionError> {
    let output_path = validate_output(request.output_path)?;

    let mut inputs = Vec::with_capacity(request.inputs.len());
    for (index, input) in request.inputs.into_iter().enumerate() {
        if input.path.as_os_str().to_string_lossy().trim().is_empty() {
            return Err(SubmissionError::InvalidInput {
                index,
                reason: "source path is empty".into(),
            });
        }

        let mut track_ids: Vec<String> = Vec::with_capacity(input.track_ids.len());
        for id in &input.track_ids {
            let id = id.trim();
            if !id.is_empty() && !track_ids.iter().any(|t| t == id) {
                track_ids.push(id.to_string());
            }
        }
        if track_ids.is_empty() {
            continue;
        }

        let track_langs: BTreeMap<String, String> = input
            .track_langs
            .iter()
            .map(|(id, lang)| (id.trim().to_string(), lang.trim().to_string()))
            .filter(|(id, lang)| !lang.is_empty() && track_ids.contains(id))
            .collect();

        if input.path == output_path {
            return Err(SubmissionError::InvalidInput {
                index,
                reason: "source is the output file".into(),
            });
        }

        inputs.push(MixInput {
            path: input.path,
            kind: input.kind,
            track_ids,
            track_langs,
        });
    }

    if inputs.is_empty() {
        return Err(SubmissionError::EmptyInputs);
    }
    Ok((output_path, inputs))
}

fn validate_output(mut path: PathBuf) -> Result<PathBuf, SubmissionError> {
    let raw = path.to_string_lossy().into_owned();
    if raw.trim().is_empty() {
        return Err(SubmissionError::InvalidOutputPath("output path is empty".into()));
    }
    if raw.ends_with(std::path::MAIN_SEPARATOR) {
        return Err(SubmissionError::InvalidOutputPath(format!(
            "{raw} is a directory"
        )));
    }

    match path.extension().map(|e| e.to_string_lossy().to_lowercase()) {
        None => {
            path.set_extension("mkv");
        }
        Some(ext) if OUTPUT_EXTENSIONS.contains(&ext.as_str()) => {}
        Some(ext) => {
            return Err(SubmissionError::InvalidOutputPath(format!(
                "unsupported output extension .{ext} (expected one of {})",
                OUTPUT_EXTENSIONS.join(", ")
            )));
        }
    }

    if path.is_dir() {
        return Err(SubmissionError::InvalidOutputPath(format!(
            "{} is a directory",
            path.display()
        )));
    }
    Ok(path)
}
