//! Submission discovery: folders in, entry files out.
//!
//! Discovery only reads the filesystem. A malformed folder never aborts the
//! batch; it becomes a submission without an entry file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::types::SubmissionFolder;

/// Resolve each requested folder to a submission, preserving request order.
#[instrument(skip_all, fields(folders = folders.len(), extension = %extension))]
pub fn locate(folders: &[PathBuf], extension: &str) -> Vec<SubmissionFolder> {
    folders
        .iter()
        .enumerate()
        .map(|(index, folder)| locate_one(index, folder, extension))
        .collect()
}

fn locate_one(index: usize, folder: &Path, extension: &str) -> SubmissionFolder {
    let label = folder
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("submission-{}", index + 1));

    let mut submission = SubmissionFolder {
        path: folder.to_path_buf(),
        label,
        entry: None,
        passed_over: Vec::new(),
        note: None,
    };

    if !folder.is_dir() {
        warn!(folder = %folder.display(), "submission folder is not a directory");
        submission.note = Some("folder does not exist or is not a directory".to_string());
        return submission;
    }

    let mut candidates = match matching_files(folder, extension) {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(folder = %folder.display(), err = %err, "failed to read submission folder");
            submission.note = Some(format!("{err:#}"));
            return submission;
        }
    };

    if candidates.is_empty() {
        debug!(folder = %folder.display(), "no entry file found");
        submission.note = Some(format!("no .{extension} file found"));
        return submission;
    }

    candidates.sort();
    let entry = candidates.remove(0);
    if !candidates.is_empty() {
        debug!(
            folder = %folder.display(),
            entry = %entry.display(),
            passed_over = candidates.len(),
            "multiple entry files, picked first"
        );
        submission.note = Some(format!(
            "{} candidate .{extension} files, selected the first by name",
            candidates.len() + 1
        ));
    }
    submission.entry = Some(entry);
    submission.passed_over = candidates;
    submission
}

fn matching_files(folder: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(folder).with_context(|| format!("read {}", folder.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", folder.display()))?;
        let path = entry.path();
        if path.is_file() && has_extension(&path, extension) {
            files.push(path);
        }
    }
    Ok(files)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// List the immediate subfolders of `parent`, sorted by path.
pub fn find_folders(parent: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(parent).with_context(|| format!("read {}", parent.display()))? {
        let entry = entry.context("read entry")?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
