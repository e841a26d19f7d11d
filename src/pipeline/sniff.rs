//! Delimiter sniffing.
//!
//! The sample is split into records (newlines inside double quotes do not
//! end a record) and, for each candidate, the number of occurrences outside
//! quotes is counted per record. A candidate is *consistent* when its most
//! common per-record count is non-zero and shared by at least 90% of the
//! records. Candidates are ranked: the first consistent one wins, and with
//! none consistent the first-ranked candidate is returned unchanged.
//!
//! A record cut off by the end of the sample is ignored unless it is the
//! only one.

use std::collections::HashMap;

/// Fraction of records (in tenths) that must share the modal count.
const CONSISTENCY_TENTHS: usize = 9;

/// Pick a delimiter for `sample` from `candidates` (best first).
///
/// Returns `,` when `candidates` is empty.
pub fn sniff(sample: &str, candidates: &[u8]) -> u8 {
    let Some(&fallback) = candidates.first() else {
        return b',';
    };
    let records = count_per_record(sample, candidates);
    if records.is_empty() {
        return fallback;
    }

    candidates
        .iter()
        .enumerate()
        .find(|&(i, _)| is_consistent(records.iter().map(|r| r[i]), records.len()))
        .map_or(fallback, |(_, &d)| d)
}

/// First `n` characters of `text`.
pub fn sample_prefix(text: &str, n: usize) -> &str {
    text.char_indices().nth(n).map_or(text, |(at, _)| &text[..at])
}

fn count_per_record(sample: &str, candidates: &[u8]) -> Vec<Vec<usize>> {
    let mut records = Vec::new();
    let mut current = vec![0usize; candidates.len()];
    let mut has_content = false;
    let mut in_quotes = false;

    for ch in sample.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_content = true;
            }
            '\n' if !in_quotes => {
                if has_content {
                    records.push(std::mem::replace(&mut current, vec![0; candidates.len()]));
                }
                has_content = false;
            }
            '\r' if !in_quotes => {}
            c => {
                has_content |= !c.is_whitespace();
                if !in_quotes && c.is_ascii() {
                    for (i, &d) in candidates.iter().enumerate() {
                        if d as char == c {
                            current[i] += 1;
                        }
                    }
                }
            }
        }
    }
    // Unterminated last record: only trusted when it is all we have.
    if has_content && records.is_empty() {
        records.push(current);
    }
    records
}

fn is_consistent(counts: impl Iterator<Item = usize>, total: usize) -> bool {
    let mut freq: HashMap<usize, usize> = HashMap::new();
    for c in counts {
        *freq.entry(c).or_default() += 1;
    }
    // Ties prefer the larger count.
    let Some((mode, hits)) = freq
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
    else {
        return false;
    };
    mode > 0 && hits * 10 >= total * CONSISTENCY_TENTHS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DELIMITERS;

    #[test]
    fn dollar_delimited() {
        assert_eq!(sniff("a$b$c\n1$2$3\n4$5$6\n", DEFAULT_DELIMITERS), b'$');
    }

    #[test]
    fn comma_delimited() {
        assert_eq!(sniff("col1,col2\n1,2\n3,4", DEFAULT_DELIMITERS), b',');
    }

    #[test]
    fn semicolon_beats_comma_by_rank() {
        // Both are consistent; `;` is ranked higher.
        assert_eq!(sniff("a;b,c\n1;2,3\n", DEFAULT_DELIMITERS), b';');
    }

    #[test]
    fn tab_and_pipe() {
        assert_eq!(sniff("a\tb\n1\t2\n", DEFAULT_DELIMITERS), b'\t');
        assert_eq!(sniff("a|b|c\n1|2|3\n", DEFAULT_DELIMITERS), b'|');
    }

    #[test]
    fn no_structure_falls_back_to_first_candidate() {
        assert_eq!(sniff("just words\nmore words\n", DEFAULT_DELIMITERS), b'$');
        assert_eq!(sniff("", DEFAULT_DELIMITERS), b'$');
        assert_eq!(sniff("a,b\n", b""), b',');
    }

    #[test]
    fn quoted_delimiters_are_ignored() {
        let sample = "name;note\n\"Smith, J\";\"a, b, c\"\n\"Doe, A\";x\n";
        assert_eq!(sniff(sample, DEFAULT_DELIMITERS), b';');
    }

    #[test]
    fn quoted_newlines_do_not_split_records() {
        let sample = "id,text\n1,\"line one\nline two\"\n2,plain\n";
        assert_eq!(sniff(sample, DEFAULT_DELIMITERS), b',');
    }

    #[test]
    fn truncated_last_record_is_ignored() {
        // The cut-off tail has no commas at all.
        let sample = "a,b,c\n1,2,3\n4,5,6\n7";
        assert_eq!(sniff(sample, DEFAULT_DELIMITERS), b',');
    }

    #[test]
    fn one_stray_line_in_ten_is_tolerated() {
        let mut sample = String::from("a,b\n");
        for i in 0..8 {
            sample.push_str(&format!("{i},{i}\n"));
        }
        sample.push_str("no separator here\n");
        assert_eq!(sniff(&sample, DEFAULT_DELIMITERS), b',');
    }

    #[test]
    fn prefix_counts_characters() {
        assert_eq!(sample_prefix("héllo", 2), "hé");
        assert_eq!(sample_prefix("abc", 10), "abc");
    }
}
