//! Work item enumeration for the post-processing stage.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::error::ProbeResult;

/// One unit of post-processing work: a rendered HDR file inside a job-type
/// group directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    pub group: String,
    pub file_name: String,
}

impl WorkItem {
    pub fn input_path(&self, input_dir: &Path) -> PathBuf {
        input_dir.join(&self.group).join(&self.file_name)
    }

    /// Mirrored output location with the HDR extension swapped for `.png`.
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir
            .join(&self.group)
            .join(Path::new(&self.file_name).with_extension("png"))
    }
}

/// List `input_dir/<group>/*.exr` for every group, in the caller's group
/// order with file names sorted within each group. The result is the same on
/// every machine, which is what makes sharded runs line up.
pub fn enumerate_work_items(input_dir: &Path, groups: &[String]) -> ProbeResult<Vec<WorkItem>> {
    let mut items = Vec::new();
    for group in groups {
        let dir = input_dir.join(group);
        let mut names = list_exr_names(&dir)?;
        names.sort();
        items.extend(names.into_iter().map(|file_name| WorkItem {
            group: group.clone(),
            file_name,
        }));
    }
    Ok(items)
}

/// Count the environment maps feeding the render stage (a flat directory of
/// `.exr` files). This is the `total_items` the sharding formula runs on.
pub fn count_render_inputs(input_dir: &Path) -> ProbeResult<usize> {
    Ok(list_exr_names(input_dir)?.len())
}

fn list_exr_names(dir: &Path) -> ProbeResult<Vec<String>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("list input dir '{}'", dir.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in '{}'", dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.ends_with(".exr") {
            names.push(name.to_string());
        }
    }
    Ok(names)
}
