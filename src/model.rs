//! Model checkpoint name matching.

/// Ratcliff/Obershelp similarity of two strings, in `0.0..=1.0`.
///
/// Twice the number of matching characters divided by the total length,
/// where matches are found by repeatedly taking the longest common block
/// and recursing on both sides of it. Two empty strings are identical.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, size) = longest_block(a, b);
    if size == 0 {
        return 0;
    }
    size + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + size..], &b[j + size..])
}

/// Longest common block as `(start_in_a, start_in_b, len)`. Ties keep the
/// block that starts earliest in `a`, then earliest in `b`.
fn longest_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                let len = prev[j] + 1;
                row[j + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        prev = row;
    }
    best
}

/// Pick the candidate most similar to `name`. Later candidates win ties.
#[must_use]
pub fn closest_match<'a>(name: &str, candidates: &'a [String]) -> Option<&'a str> {
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = similarity(name, candidate);
        match best {
            Some((_, top)) if score < top => {}
            _ => best = Some((candidate.as_str(), score)),
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Resolve a requested model name against the available titles.
///
/// An exact match always wins. Otherwise, with `find_closest`, the
/// lower-cased name is matched against the titles by [`similarity`].
#[must_use]
pub fn resolve_model<'a>(name: &str, titles: &'a [String], find_closest: bool) -> Option<&'a str> {
    let name = if find_closest { name.to_lowercase() } else { name.to_string() };
    if let Some(exact) = titles.iter().find(|t| **t == name) {
        return Some(exact.as_str());
    }
    if find_closest {
        closest_match(&name, titles)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles() -> Vec<String> {
        vec![
            "anything-v4.5.safetensors [1d1e459f9f]".to_string(),
            "sd-v1-5-inpainting.ckpt [c6bbc15e32]".to_string(),
            "v1-5-pruned-emaonly.safetensors [6ce0161689]".to_string(),
        ]
    }

    #[test]
    fn similarity_bounds() {
        assert!((similarity("abc", "abc") - 1.0).abs() < f64::EPSILON);
        assert!(similarity("abc", "xyz").abs() < f64::EPSILON);
        assert!((similarity("", "") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn similarity_matches_sequence_matcher() {
        // "abcd" vs "bcde": one block "bcd" => 2*3/8
        assert!((similarity("abcd", "bcde") - 0.75).abs() < 1e-9);
        // "abxcd" vs "abcd": blocks "ab" and "cd" => 2*4/9
        assert!((similarity("abxcd", "abcd") - 8.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn exact_match_preferred() {
        let titles = titles();
        assert_eq!(
            resolve_model("sd-v1-5-inpainting.ckpt [c6bbc15e32]", &titles, false),
            Some("sd-v1-5-inpainting.ckpt [c6bbc15e32]")
        );
    }

    #[test]
    fn closest_match_is_case_insensitive() {
        let titles = titles();
        assert_eq!(
            resolve_model("Anything-V4.5", &titles, true),
            Some("anything-v4.5.safetensors [1d1e459f9f]")
        );
    }

    #[test]
    fn no_fuzzy_without_find_closest() {
        assert_eq!(resolve_model("anything", &titles(), false), None);
    }

    #[test]
    fn ties_go_to_later_candidate() {
        let candidates = vec!["ab".to_string(), "ba".to_string()];
        assert_eq!(closest_match("a", &candidates), Some("ba"));
    }

    #[test]
    fn empty_candidates() {
        assert_eq!(closest_match("anything", &[]), None);
        assert_eq!(resolve_model("anything", &[], true), None);
    }
}
