//! Chart root discovery over an extracted archive

use super::{CHART_DESCRIPTOR, VALUES_DESCRIPTOR};
use crate::models::ChartCandidate;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Find chart roots below `root`, sorted by relative path.
///
/// A directory holding a values descriptor is yielded whether or not it also
/// holds a chart descriptor, so incomplete charts still show up in the
/// report. Directories with only a chart descriptor carry no resource
/// profile and are skipped. Symlinks are never followed.
///
/// `root_release_name` names a chart that sits directly at `root`.
pub fn locate_charts(root: &Path, root_release_name: &str) -> io::Result<Vec<ChartCandidate>> {
    let mut candidates = Vec::new();
    let mut pending = vec![(root.to_path_buf(), Vec::<String>::new())];

    while let Some((dir, segments)) = pending.pop() {
        let mut has_chart = false;
        let mut has_values = false;

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if file_type.is_dir() {
                let mut child = segments.clone();
                child.push(name);
                pending.push((entry.path(), child));
            } else if file_type.is_file() {
                match name.as_str() {
                    CHART_DESCRIPTOR => has_chart = true,
                    VALUES_DESCRIPTOR => has_values = true,
                    _ => {}
                }
            }
        }

        if !has_values {
            if has_chart {
                debug!(path = %dir.display(), "Chart without values descriptor, nothing to gate");
            }
            continue;
        }

        let release_name = segments
            .last()
            .cloned()
            .unwrap_or_else(|| root_release_name.to_string());
        let relative_path = if segments.is_empty() {
            ".".to_string()
        } else {
            segments.join("/")
        };

        candidates.push(ChartCandidate {
            path: dir,
            relative_path,
            release_name,
            has_chart_descriptor: has_chart,
            has_values_descriptor: has_values,
        });
    }

    candidates.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    debug!(root = %root.display(), count = candidates.len(), "Located chart candidates");
    Ok(candidates)
}
