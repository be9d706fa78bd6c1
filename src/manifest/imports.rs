use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::graph::build_graph;
use crate::index::InstalledIndex;
use crate::runtime::Runtime;

use super::MANIFEST_FILE;

/// File generated in every installation root, importing each installed manifest.
pub const IMPORTS_FILE: &str = "packages.yaml";

const HEADER: &str = "# This file is generated automatically by archpkg.\n\
                      # It is not recommended to make changes to it.\n";

#[derive(Serialize)]
struct ImportsFile {
    imports: Vec<String>,
}

/// Write `root/packages.yaml` listing installed manifests, dependencies first.
#[tracing::instrument(skip(runtime, index))]
pub fn make_imports_file<R: Runtime>(
    runtime: &R,
    index: &mut InstalledIndex,
    root: &Path,
) -> Result<PathBuf> {
    let graph = build_graph(runtime, index, root)?;
    let entries = index.fetch(runtime, root)?;

    let mut imports: Vec<String> = Vec::new();
    for node in &graph {
        // Built-in packages have no installed entry
        let Some(entry) = entries.iter().find(|e| e.metadata.contains(&node.id)) else {
            continue;
        };
        let Some(folder) = entry.source.file_name() else {
            continue;
        };
        let link = format!("{}/{}", folder.to_string_lossy(), MANIFEST_FILE);
        if !imports.contains(&link) {
            imports.push(link);
        }
    }

    let body = serde_yaml::to_string(&ImportsFile { imports })
        .context("Failed to serialize imports file")?;

    runtime.create_dir_all(root)?;
    let path = root.join(IMPORTS_FILE);
    runtime.write(&path, format!("{}{}", HEADER, body).as_bytes())?;
    info!("Imports file written to {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    fn write_package(root: &Path, folder: &str, manifest: &str) {
        std::fs::create_dir_all(root.join(folder)).unwrap();
        std::fs::write(root.join(folder).join(MANIFEST_FILE), manifest).unwrap();
    }

    #[test]
    fn test_imports_are_dependencies_first() {
        let dir = tempdir().unwrap();
        write_package(
            dir.path(),
            "a",
            "$package:\n  a:\n    version: 1.0.0\n    dependencies:\n      b: ^1.0.0\n",
        );
        write_package(
            dir.path(),
            "b",
            "$package:\n  b:\n    version: 1.0.0\n    dependencies:\n      c: ^1.0.0\n      runtime: \"*\"\n",
        );
        write_package(
            dir.path(),
            "c",
            "$package:\n  c:\n    version: 1.0.0\n  c-docs:\n    version: 1.0.0\n",
        );

        let mut index = InstalledIndex::new();
        let path = make_imports_file(&RealRuntime, &mut index, dir.path()).unwrap();
        assert_eq!(path, dir.path().join(IMPORTS_FILE));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# This file is generated automatically"));

        let parsed: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        let imports: Vec<&str> = parsed["imports"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        // "runtime" is not installed and "c-docs" shares the folder of "c"
        assert_eq!(imports, vec!["c/dochub.yaml", "b/dochub.yaml", "a/dochub.yaml"]);
    }

    #[test]
    fn test_empty_root_writes_empty_list() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("_metamodel_");

        let mut index = InstalledIndex::new();
        let path = make_imports_file(&RealRuntime, &mut index, &root).unwrap();

        let parsed: serde_yaml::Value =
            serde_yaml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert!(parsed["imports"].as_sequence().unwrap().is_empty());
    }
}
