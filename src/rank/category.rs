//! Folder category labels shown next to candidates.

use serde::Serialize;
use std::fmt;
use std::path::{Component, Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    NodePackages,
    PythonCache,
    PipCache,
    CondaPackages,
    NpmCache,
    TempFiles,
    Downloads,
    WindowsTemp,
    General,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::NodePackages => "Node.js packages",
            Category::PythonCache => "Python cache",
            Category::PipCache => "Python pip cache",
            Category::CondaPackages => "Conda packages",
            Category::NpmCache => "NPM cache",
            Category::TempFiles => "Temporary files",
            Category::Downloads => "Downloads folder",
            Category::WindowsTemp => "Windows temp files",
            Category::General => "General folder",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Component sequences checked in order; the first one found anywhere in the path wins.
const PATTERNS: &[(&[&str], Category)] = &[
    (&["node_modules"], Category::NodePackages),
    (&["__pycache__"], Category::PythonCache),
    (&[".pip"], Category::PipCache),
    (&[".conda"], Category::CondaPackages),
    (&[".npm"], Category::NpmCache),
    (&["appdata", "local", "temp"], Category::TempFiles),
    (&["tmp"], Category::TempFiles),
    (&["downloads"], Category::Downloads),
    (&["windows", "temp"], Category::WindowsTemp),
];

pub fn categorize(path: &Path) -> Category {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_lowercase()),
            _ => None,
        })
        .collect();
    PATTERNS
        .iter()
        .find(|(seq, _)| parts.windows(seq.len()).any(|w| w.iter().zip(seq.iter()).all(|(a, b)| a == b)))
        .map(|(_, c)| *c)
        .unwrap_or(Category::General)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_folders_get_labels() {
        assert_eq!(categorize(Path::new("/home/u/proj/node_modules")), Category::NodePackages);
        assert_eq!(categorize(Path::new("/home/u/proj/node_modules/x/y")), Category::NodePackages);
        assert_eq!(categorize(Path::new("/home/u/.npm")).label(), "NPM cache");
        assert_eq!(categorize(Path::new("/home/u/Downloads")), Category::Downloads);
        assert_eq!(
            categorize(Path::new("/mnt/c/Users/u/AppData/Local/Temp")),
            Category::TempFiles
        );
    }

    #[test]
    fn matching_is_per_component() {
        assert_eq!(categorize(Path::new("/home/u/my_node_modules_backup")), Category::General);
        assert_eq!(categorize(Path::new("/home/u/projects")), Category::General);
    }
}
