//! Ratcliff/Obershelp similarity, matching Python's `difflib.SequenceMatcher.ratio`.
//!
//! `ratio = 2·M / (|a| + |b|)` where `M` counts characters in the matching
//! blocks found by repeatedly taking the longest common substring and
//! recursing on both sides of it. Ties go to the earliest block in `a`,
//! then in `b`. Inputs here are short name tokens, so there is no junk
//! heuristic.

/// Similarity in `[0, 1]` between two strings, compared by `char`.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common run in `a[alo..ahi]` × `b[blo..bhi]` as `(i, j, len)`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best) = (alo, blo, 0);
    let span = bhi - blo;
    let mut prev = vec![0usize; span + 1];
    let mut cur = vec![0usize; span + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo;
            if a[i] == b[j] {
                let k = prev[col] + 1;
                cur[col + 1] = k;
                if k > best {
                    best = k;
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                }
            } else {
                cur[col + 1] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    (best_i, best_j, best)
}
