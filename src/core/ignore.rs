use crate::domain::models::IgnoreConfig;
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::path::Path;

/// Compiled exclusion rules: ignored names, hidden entries and
/// `.contextignore` patterns.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    names: BTreeSet<String>,
    include_hidden: bool,
    patterns: GlobSet,
    dir_patterns: GlobSet,
}

impl IgnoreRules {
    pub fn new(config: &IgnoreConfig) -> Self {
        let mut patterns = GlobSetBuilder::new();
        let mut dir_patterns = GlobSetBuilder::new();

        for raw in &config.patterns {
            let (pattern, dir_only) = match raw.strip_suffix('/') {
                Some(p) => (p, true),
                None => (raw.as_str(), false),
            };
            match Glob::new(pattern) {
                Ok(glob) if dir_only => {
                    dir_patterns.add(glob);
                }
                Ok(glob) => {
                    patterns.add(glob);
                }
                Err(e) => warn!("Ignoring invalid ignore pattern '{}': {}", raw, e),
            }
        }

        IgnoreRules {
            names: config.names.clone(),
            include_hidden: config.include_hidden,
            patterns: build_set(patterns),
            dir_patterns: build_set(dir_patterns),
        }
    }

    /// Whether an entry at `rel_path` (relative to the tree root) is excluded.
    pub fn is_ignored(&self, rel_path: &Path, is_dir: bool) -> bool {
        let components: Vec<String> = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let Some(name) = components.last() else {
            return false;
        };

        if self.names.contains(name) {
            debug!("Ignoring {} (ignored name)", rel_path.display());
            return true;
        }
        if !self.include_hidden && name.starts_with('.') {
            return true;
        }

        let posix = components.join("/");
        if self.patterns.is_match(&posix) || self.patterns.is_match(name) {
            debug!("Ignoring {} (pattern)", posix);
            return true;
        }

        let parents = &components[..components.len() - 1];
        if parents.iter().any(|part| self.dir_patterns.is_match(part))
            || (is_dir && self.dir_patterns.is_match(name))
        {
            debug!("Ignoring {} (directory pattern)", posix);
            return true;
        }

        false
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::new(&IgnoreConfig::default())
    }
}

fn build_set(builder: GlobSetBuilder) -> GlobSet {
    builder.build().unwrap_or_else(|e| {
        warn!("Failed to compile ignore patterns: {}", e);
        GlobSet::empty()
    })
}
