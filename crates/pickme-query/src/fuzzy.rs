//! Sub-sequence fuzzy scorer with boundary/streak bonuses.

use pickme_store::SearchResultRow;

const WORD_BOUNDARY_CHARS: &[char] = &['/', '_', '-', ' ', '.'];

/// Score a single needle/haystack pair (both already lower-cased by the
/// caller). Returns `-1.0` if `needle` is not a subsequence of `hay`.
pub fn fuzzy_token(needle: &str, hay: &str) -> f64 {
    if needle.is_empty() {
        return 0.0;
    }

    let hay_chars: Vec<char> = hay.chars().collect();
    let mut last_index: i64 = -1;
    let mut streak: u32 = 0;
    let mut score = 0.0_f64;

    for needle_ch in needle.chars() {
        let search_from = (last_index + 1).max(0) as usize;
        let found = hay_chars[search_from..]
            .iter()
            .position(|&c| c == needle_ch)
            .map(|offset| search_from + offset);

        let Some(idx) = found else {
            return -1.0;
        };

        let boundary = idx == 0
            || hay_chars
                .get(idx.wrapping_sub(1))
                .is_some_and(|c| WORD_BOUNDARY_CHARS.contains(c));

        streak = if idx as i64 == last_index + 1 { streak + 1 } else { 1 };

        score += 1.0 + if boundary { 3.0 } else { 0.0 } + streak.min(5) as f64;
        last_index = idx as i64;
    }

    score += (20.0 - hay_chars.len() as f64 / 10.0).max(0.0);
    score += (10.0 - last_index as f64 / 10.0).max(0.0);
    score
}

/// Multi-token fuzzy score: sum of per-token scores, or `-1.0` if any token
/// fails to match.
fn fuzzy_query(query: &str, hay: &str) -> f64 {
    let hay = hay.to_lowercase();
    let mut total = 0.0;
    let mut any_token = false;
    for token in query.to_lowercase().split_whitespace() {
        any_token = true;
        let token_score = fuzzy_token(token, &hay);
        if token_score < 0.0 {
            return -1.0;
        }
        total += token_score;
    }
    if !any_token {
        return 0.0;
    }
    total
}

/// One fuzzy-scored candidate, ready to be sorted and truncated by the
/// orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    pub row: SearchResultRow,
    pub score: f64,
}

/// Score every candidate against `query`, dropping anything with a negative
/// score. `score = max(fuzzy(query, relative_path), 1.2 * fuzzy(query,
/// filename)) + 0.2 * result.score_from_db`.
pub fn score_candidates(query: &str, candidates: Vec<SearchResultRow>) -> Vec<FuzzyMatch> {
    let mut matches: Vec<FuzzyMatch> = candidates
        .into_iter()
        .filter_map(|row| {
            let relative = row.relative_path.clone().unwrap_or_else(|| row.path.clone());
            let by_relative = fuzzy_query(query, &relative);
            let by_filename = fuzzy_query(query, &row.filename);
            let token_score = by_relative.max(1.2 * by_filename);
            if token_score < 0.0 {
                return None;
            }
            let score = token_score + 0.2 * row.score;
            Some(FuzzyMatch { row, score })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let a_rel = a.row.relative_path.as_deref().unwrap_or(&a.row.path);
                let b_rel = b.row.relative_path.as_deref().unwrap_or(&b.row.path);
                a_rel.cmp(b_rel)
            })
    });

    matches
}

/// `clamp(limit * 50, 500, 5000)`.
pub fn candidate_limit(limit: u32) -> u32 {
    (limit.saturating_mul(50)).clamp(500, 5000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_a_subsequence_is_negative() {
        assert!(fuzzy_token("xyz", "button") < 0.0);
    }

    #[test]
    fn test_subsequence_is_nonnegative() {
        assert!(fuzzy_token("btn", "button") >= 0.0);
    }

    #[test]
    fn test_boundary_bonus_outranks_mid_word() {
        let boundary = fuzzy_token("b", "foo_bar");
        let mid = fuzzy_token("b", "fobar");
        assert!(boundary > 0.0 && mid > 0.0);
    }

    #[test]
    fn test_fbtsx_matches_foobar_tsx() {
        let score = fuzzy_query("fbtsx", "FooBar.tsx");
        assert!(score >= 0.0);
    }

    #[test]
    fn test_candidate_limit_clamped() {
        assert_eq!(candidate_limit(1), 500);
        assert_eq!(candidate_limit(50), 2500);
        assert_eq!(candidate_limit(1000), 5000);
    }

    fn row(path: &str, filename: &str, relative_path: &str) -> SearchResultRow {
        SearchResultRow {
            path: path.to_string(),
            filename: filename.to_string(),
            relative_path: Some(relative_path.to_string()),
            root: "/p".to_string(),
            score: 0.0,
        }
    }

    #[test]
    fn test_score_candidates_drops_non_subsequence() {
        let candidates = vec![
            row("/p/src/FooBar.tsx", "FooBar.tsx", "src/FooBar.tsx"),
            row("/p/README.md", "README.md", "README.md"),
        ];
        let matches = score_candidates("fbtsx", candidates);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].row.path.ends_with("FooBar.tsx"));
    }
}
