// src/replay/index.rs
//! Replay index
//!
//! Built once per replay session by scanning a trace file top to bottom.
//! Request entries (those recorded with the incoming marker) open a new
//! response group under their trimmed description; repeats of the same key
//! append further groups, preserving call-order-dependent outcomes.
//! Response entries accumulate into the group most recently opened.

use crate::replay::matcher;
use crate::traffic::wire;
use crate::utils::errors::{EngineError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// All recorded answers for one request description
#[derive(Debug, Default)]
struct ResponseSet {
    /// One group of raw trace entries per request occurrence, in order
    groups: Vec<Vec<String>>,

    /// How often this description has been chosen, for group cycling and
    /// fuzzy tie-breaking
    times_chosen: usize,
}

impl ResponseSet {
    fn open_group(&mut self) {
        self.groups.push(Vec::new());
    }

    fn add_response(&mut self, entry: String) {
        if let Some(group) = self.groups.last_mut() {
            group.push(entry);
        }
    }

    /// The group answering the next occurrence; repeats cycle through the
    /// recorded groups in order
    fn next_group(&mut self) -> Vec<String> {
        if self.groups.is_empty() {
            return Vec::new();
        }
        let group = self.groups[self.times_chosen % self.groups.len()].clone();
        self.times_chosen += 1;
        group
    }
}

/// Lookup table from request description to recorded response groups.
/// Insertion order is preserved; fuzzy ties at equal score and equal usage
/// keep the earliest-recorded candidate.
#[derive(Debug, Default)]
pub struct ReplayIndex {
    entries: Vec<(String, ResponseSet)>,
}

impl ReplayIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from a trace file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            EngineError::ReplayFileError(format!("Cannot open {}: {}", path.display(), e))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Build the index from any line source
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut index = Self::new();
        let mut current: Option<usize> = None;
        let mut pending: Option<String> = None;
        for line in reader.lines() {
            let mut line = line
                .map_err(|e| EngineError::ReplayFileError(format!("Read failed: {}", e)))?;
            line.push('\n');
            if wire::starts_record(&line) {
                if let Some(entry) = pending.take() {
                    index.insert_entry(entry, &mut current);
                }
                pending = Some(line);
            } else if let Some(entry) = pending.as_mut() {
                // Lines without a direction marker, malformed or not, extend
                // the previous payload
                entry.push_str(&line);
            } else {
                warn!("Ignoring leading line without a record marker: {:?}", line);
            }
        }
        if let Some(entry) = pending {
            index.insert_entry(entry, &mut current);
        }
        debug!("Replay index built with {} request keys", index.entries.len());
        Ok(index)
    }

    fn insert_entry(&mut self, entry: String, current: &mut Option<usize>) {
        if entry.starts_with(wire::INCOMING_MARKER) {
            let key = entry.trim_end().to_string();
            let position = match self.entries.iter().position(|(k, _)| *k == key) {
                Some(position) => position,
                None => {
                    self.entries.push((key, ResponseSet::default()));
                    self.entries.len() - 1
                }
            };
            self.entries[position].1.open_group();
            *current = Some(position);
        } else if let Some(position) = *current {
            self.entries[position].1.add_response(entry);
        } else {
            warn!("Ignoring response entry before any request: {:?}", entry);
        }
    }

    /// Number of distinct request keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Answer a request description with the raw entries of the best
    /// matching group, advancing that key's usage counter
    pub fn lookup(&mut self, description: &str) -> Vec<String> {
        let description = description.trim_end();
        let Some(position) = self.best_match(description) else {
            debug!("No replay candidate for {:?}", description);
            return Vec::new();
        };
        debug!(
            "Replaying {:?} for {:?}",
            self.entries[position].0, description
        );
        self.entries[position].1.next_group()
    }

    /// Exact key match first; otherwise the highest-scoring candidate of the
    /// same wire type, ties broken by fewest times chosen
    fn best_match(&self, description: &str) -> Option<usize> {
        if let Some(position) = self
            .entries
            .iter()
            .position(|(key, _)| key == description)
        {
            debug!("Found exact match");
            return Some(position);
        }
        let mut best = None;
        let mut best_score = 0.0;
        let mut fewest_chosen = usize::MAX;
        for (position, (key, set)) in self.entries.iter().enumerate() {
            if !matcher::same_kind(description, key) {
                continue;
            }
            let score = matcher::match_percentage(key, description);
            debug!("Match percentage {:.1} with {:?}", score, key);
            if score > best_score || (score == best_score && set.times_chosen < fewest_chosen) {
                best = Some(position);
                best_score = score;
                fewest_chosen = set.times_chosen;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn index_from(text: &str) -> ReplayIndex {
        ReplayIndex::from_reader(Cursor::new(text.to_string())).unwrap()
    }

    #[test]
    fn test_exact_match_replays_recorded_group() {
        let mut index = index_from("<-CLI:ping\n->SRV:pong\n->SRV:tail\n");
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.lookup("<-CLI:ping"),
            vec!["->SRV:pong\n", "->SRV:tail\n"]
        );
    }

    #[test]
    fn test_repeated_requests_cycle_through_groups() {
        let mut index = index_from(
            "<-CLI:next\n->SRV:first\n<-CLI:next\n->SRV:second\n",
        );
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup("<-CLI:next"), vec!["->SRV:first\n"]);
        assert_eq!(index.lookup("<-CLI:next"), vec!["->SRV:second\n"]);
        assert_eq!(index.lookup("<-CLI:next"), vec!["->SRV:first\n"]);
        assert_eq!(index.lookup("<-CLI:next"), vec!["->SRV:second\n"]);
    }

    #[test]
    fn test_continuation_lines_extend_payload() {
        let mut index = index_from("<-CLI:ask\n->SRV:line one\nline two\n");
        assert_eq!(index.lookup("<-CLI:ask"), vec!["->SRV:line one\nline two\n"]);
    }

    #[test]
    fn test_malformed_leading_lines_tolerated() {
        let index = index_from("garbage without marker\n<-CLI:ok\n->SRV:fine\n");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_fuzzy_match_prefers_shared_tokens() {
        let mut index = index_from(
            "<-CMD:cp src.txt dst.txt\n->OUT:copied\n<-CMD:rm junk\n->OUT:removed\n",
        );
        let replayed = index.lookup("<-CMD:cp src.txt elsewhere.txt");
        assert_eq!(replayed, vec!["->OUT:copied\n"]);
    }

    #[test]
    fn test_fuzzy_match_restricted_to_same_kind() {
        let mut index = index_from("<-CMD:login please\n->OUT:done\n");
        assert!(index.lookup("<-CLI:login please now").is_empty());
    }

    #[test]
    fn test_fuzzy_tie_break_reverses_after_selection() {
        let mut index = index_from(
            "<-CLI:login(bob)\n->SRV:hello bob\n<-CLI:login(alice)\n->SRV:hello alice\n",
        );
        // Token-wise both candidates score the same against this request;
        // the less-used one wins, which alternates as counters advance
        assert_eq!(index.lookup("<-CLI:login(eve)"), vec!["->SRV:hello bob\n"]);
        assert_eq!(index.lookup("<-CLI:login(eve)"), vec!["->SRV:hello alice\n"]);
        assert_eq!(index.lookup("<-CLI:login(eve)"), vec!["->SRV:hello bob\n"]);
    }

    #[test]
    fn test_higher_score_beats_lower_usage() {
        let mut index = index_from(
            "<-CLI:fetch a b\n->SRV:ab\n<-CLI:fetch c d\n->SRV:cd\n",
        );
        // Exhaust the first key so its counter is ahead
        assert_eq!(index.lookup("<-CLI:fetch a b"), vec!["->SRV:ab\n"]);
        // Still chosen: full token overlap outranks the unused candidate
        assert_eq!(index.lookup("<-CLI:fetch a b extra"), vec!["->SRV:ab\n"]);
    }

    #[test]
    fn test_empty_and_missing_lookups() {
        let mut empty = ReplayIndex::new();
        assert!(empty.is_empty());
        assert!(empty.lookup("<-CLI:anything").is_empty());

        let mut index = index_from("<-CLI:ping\n");
        // A request recorded with no responses replays to an empty group
        assert!(index.lookup("<-CLI:ping").is_empty());
    }

    #[test]
    fn test_trailing_whitespace_normalized() {
        let mut index = index_from("<-CLI:ping\n->SRV:pong\n");
        assert_eq!(index.lookup("<-CLI:ping\n"), vec!["->SRV:pong\n"]);
    }
}
