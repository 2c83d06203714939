//! Hot-reloadable rule set (§4.4).
//!
//! A rule file's fourth line (index 3) is comma-split into individual fields; every other
//! line becomes one verbatim (trimmed) field. Change detection compares (filename, mtime)
//! pairs across the whole directory; a missing directory retains whatever rule set is
//! currently loaded. Reload is an atomic whole-structure swap via `CowCell`, never a
//! partial/in-place mutation (§5 "shared-resource policy").

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use concread::cowcell::{CowCell, CowCellReadTxn};
use tracing::{debug, info, warn};

pub type Rule = Vec<String>;

/// (filename -> last modified time) snapshot used to detect directory changes between ticks.
pub type FilesHash = HashMap<String, SystemTime>;

fn scan_directory(directory: &Path) -> Option<FilesHash> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(_) => return None,
    };
    let mut hash = FilesHash::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        hash.insert(name.to_string(), modified);
    }
    Some(hash)
}

/// Returns `(changed, new_hash)`. If `directory` does not exist, reports no change and hands
/// `old_hash` back untouched (§4.4 "if the directory does not exist, the current rule set is
/// retained").
pub fn find_changed_files(directory: &Path, old_hash: &FilesHash) -> (bool, FilesHash) {
    let Some(new_hash) = scan_directory(directory) else {
        return (false, old_hash.clone());
    };
    let changed = old_hash.keys().collect::<std::collections::HashSet<_>>()
        != new_hash.keys().collect::<std::collections::HashSet<_>>()
        || old_hash
            .iter()
            .any(|(name, time)| new_hash.get(name) != Some(time));
    if changed {
        info!("refreshing rules due to changes in {}", directory.display());
        (true, new_hash)
    } else {
        (false, old_hash.clone())
    }
}

fn parse_rule_file(path: &Path) -> std::io::Result<Rule> {
    let contents = fs::read_to_string(path)?;
    let mut rule = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if index == 3 {
            rule.extend(line.split(',').map(|s| s.to_string()));
        } else {
            rule.push(line.to_string());
        }
    }
    Ok(rule)
}

pub fn load_rules_files(directory: &Path, files_hash: &FilesHash) -> Vec<Rule> {
    let mut rules = Vec::new();
    for filename in files_hash.keys() {
        match parse_rule_file(&directory.join(filename)) {
            Ok(rule) => rules.push(rule),
            Err(err) => warn!("failed to load rule file {filename}: {err}"),
        }
    }
    rules
}

/// The live, hot-swappable rule set plus the bookkeeping needed to detect the next change.
pub struct RuleSet {
    directory: PathBuf,
    files_hash: FilesHash,
    rules: CowCell<Vec<Rule>>,
}

impl RuleSet {
    pub fn load(directory: PathBuf) -> Self {
        let files_hash = scan_directory(&directory).unwrap_or_default();
        let rules = load_rules_files(&directory, &files_hash);
        debug!("loaded {} rules from {}", rules.len(), directory.display());
        RuleSet {
            directory,
            files_hash,
            rules: CowCell::new(rules),
        }
    }

    /// A read-only snapshot of the current rules, safe to hold across a `found` message build
    /// without racing a concurrent reload (§8 property 5 "reload atomicity").
    pub fn read(&self) -> CowCellReadTxn<Vec<Rule>> {
        self.rules.read()
    }

    /// Check for directory changes and, if any, reload and atomically swap in the new rule
    /// set. Returns true if a reload happened.
    pub fn refresh_if_changed(&mut self) -> bool {
        let (changed, new_hash) = find_changed_files(&self.directory, &self.files_hash);
        if !changed {
            return false;
        }
        self.files_hash = new_hash;
        let new_rules = load_rules_files(&self.directory, &self.files_hash);
        let mut write_txn = self.rules.write();
        *write_txn = new_rules;
        write_txn.commit();
        true
    }
}
