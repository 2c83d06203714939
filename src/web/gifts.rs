//! Gift loading and date/level lookup (§4.8, §10.5).

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use regex::Regex;
use tracing::warn;

struct GiftPeriod {
    start: NaiveDate,
    end: NaiveDate,
    /// level -> gift body, keyed so "closest level at or below the requested one" is a simple
    /// `range(..=level).next_back()` lookup.
    levels: BTreeMap<i64, String>,
}

/// The full set of gift periods currently loaded, rebuilt whole on every reload (§5 "shared-
/// resource policy": read-only after load, swapped wholesale rather than mutated in place).
pub struct GiftStore {
    periods: Vec<GiftPeriod>,
}

fn date_range_re() -> Regex {
    Regex::new(r"(\d{4}-\d{2}-\d{2})\s*-\s*(\d{4}-\d{2}-\d{2})").expect("static regex")
}

fn level_header_re() -> Regex {
    Regex::new(r"(?i)#\s*Gift\s+Lv\s+(\d+)").expect("static regex")
}

fn parse_gift_file(contents: &str) -> Result<GiftPeriod, String> {
    let date_re = date_range_re();
    let header_re = level_header_re();

    let first_line = contents.lines().next().unwrap_or_default();
    let caps = date_re
        .captures(first_line)
        .ok_or_else(|| format!("no date range found in first line {first_line:?}"))?;
    let start = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").map_err(|e| e.to_string())?;
    let end = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d").map_err(|e| e.to_string())?;

    let mut levels = BTreeMap::new();
    let mut current_level: Option<i64> = None;
    let mut current_body: Vec<&str> = Vec::new();

    let flush = |level: Option<i64>, body: &[&str], levels: &mut BTreeMap<i64, String>| {
        if let Some(level) = level {
            levels.insert(level, body.join("\n"));
        }
    };

    for line in contents.lines().skip(1) {
        if let Some(caps) = header_re.captures(line) {
            flush(current_level, &current_body, &mut levels);
            current_level = caps[1].parse().ok();
            current_body = Vec::new();
        } else if current_level.is_some() {
            current_body.push(line);
        }
    }
    flush(current_level, &current_body, &mut levels);

    Ok(GiftPeriod { start, end, levels })
}

impl GiftStore {
    /// Load every `*.txt` file in `directory`. A missing directory is tolerated (empty store);
    /// a malformed file is logged and skipped rather than aborting the whole load (§10.5).
    pub fn load(directory: &Path) -> Self {
        let mut periods = Vec::new();
        let Ok(entries) = std::fs::read_dir(directory) else {
            warn!("gifts directory {} not found, starting empty", directory.display());
            return GiftStore { periods };
        };
        let mut paths: Vec<_> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"))
            .collect();
        paths.sort();
        for path in paths {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match parse_gift_file(&contents) {
                    Ok(period) => periods.push(period),
                    Err(err) => warn!("skipping unparsable gift file {}: {err}", path.display()),
                },
                Err(err) => warn!("failed to read gift file {}: {err}", path.display()),
            }
        }
        GiftStore { periods }
    }

    pub fn period_count(&self) -> usize {
        self.periods.len()
    }

    /// Find the gift for `level` valid on `today`: exact level match, else the highest level
    /// at or below `level`, else the highest level defined at all (§4.8).
    pub fn get_for_level(&self, today: NaiveDate, level: i64) -> Option<&str> {
        let period = self
            .periods
            .iter()
            .find(|p| p.start <= today && today <= p.end)?;
        if let Some(body) = period.levels.get(&level) {
            return Some(body);
        }
        if let Some((_, body)) = period.levels.range(..=level).next_back() {
            return Some(body);
        }
        period.levels.values().next_back().map(|s| s.as_str())
    }
}
