// Extension locator: case-insensitive glob over extension roots, version detection

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ExtensionLocator {
    roots: Vec<PathBuf>,
    patterns: Vec<String>,
}

/// Outcome of one scan. Missing roots are warnings; zero matches is "not found", not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionScan {
    pub matches: Vec<PathBuf>,
    pub missing_roots: Vec<PathBuf>,
    /// Roots that exist but could not be listed, with the I/O error text.
    pub unreadable_roots: Vec<(PathBuf, String)>,
}

impl ExtensionScan {
    pub fn is_not_found(&self) -> bool {
        self.matches.is_empty()
    }
}

impl ExtensionLocator {
    pub fn new(roots: Vec<PathBuf>, patterns: Vec<String>) -> Self {
        let patterns = patterns.into_iter().map(|p| p.to_lowercase()).collect();
        Self { roots, patterns }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn scan(&self) -> ExtensionScan {
        let mut scan = ExtensionScan::default();
        for root in &self.roots {
            if !root.is_dir() {
                scan.missing_roots.push(root.clone());
                continue;
            }
            let entries = match std::fs::read_dir(root) {
                Ok(e) => e,
                Err(e) => {
                    scan.unreadable_roots.push((root.clone(), e.to_string()));
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_lowercase();
                if self.patterns.iter().any(|p| glob_match(p, &name)) {
                    scan.matches.push(path);
                }
            }
        }
        scan.matches.sort();
        scan.matches.dedup();
        scan
    }

    /// First match in root order, then name order.
    pub fn find_first(&self) -> Option<PathBuf> {
        for root in &self.roots {
            let single = ExtensionLocator {
                roots: vec![root.clone()],
                patterns: self.patterns.clone(),
            };
            if let Some(first) = single.scan().matches.into_iter().next() {
                return Some(first);
            }
        }
        None
    }
}

/// Shell-style match supporting `*` and `?`. Callers lowercase both sides.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[derive(Deserialize)]
struct PackageManifest {
    version: Option<String>,
}

/// Version from the directory name (`publisher.name-1.2.3`), else package.json, else "unknown".
pub fn extension_version(dir: &Path) -> String {
    if let Some(name) = dir.file_name().map(|n| n.to_string_lossy()) {
        let from_name = name.split('-').find(|part| {
            !part.is_empty()
                && part.chars().any(|c| c.is_ascii_digit())
                && part.chars().all(|c| c.is_ascii_digit() || c == '.')
        });
        if let Some(v) = from_name {
            return v.to_string();
        }
    }
    std::fs::read_to_string(dir.join("package.json"))
        .ok()
        .and_then(|s| serde_json::from_str::<PackageManifest>(&s).ok())
        .and_then(|m| m.version)
        .unwrap_or_else(|| "unknown".into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionClass {
    Stable,
    Problematic,
    Unknown,
}

/// `problematic` entries ending in `.x` match any patch of that minor.
pub fn classify_version(version: &str, stable: &str, problematic: &[String]) -> VersionClass {
    if version == stable {
        return VersionClass::Stable;
    }
    let bad = problematic.iter().any(|p| match p.strip_suffix(".x") {
        Some(prefix) => version
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.')),
        None => p == version,
    });
    if bad {
        VersionClass::Problematic
    } else {
        VersionClass::Unknown
    }
}
