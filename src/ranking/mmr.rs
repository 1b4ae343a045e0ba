//! Maximal Marginal Relevance selection.
//!
//! Pairwise candidate similarity is computed lazily: each round only compares
//! the remaining candidates with the item picked in the previous round, and a
//! running maximum per candidate stands in for `max_{j in selected} sim_doc[i][j]`.

use serde::Serialize;

/// 选择模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// 相关性与多样性平衡
    Relevance,
    /// 返回与查询负相关的全部候选，忽略 top_k
    Contradiction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MmrOutcome {
    /// 按选择顺序排列的候选下标，顺序即重要性排名
    pub selected: Vec<usize>,
    /// 每个候选与查询的余弦相似度
    pub similarities: Vec<f32>,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..len {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// 贪心 MMR 选择；`lambda` 不做校验，由调用方保证
pub fn select<V: AsRef<[f32]>>(
    query: &[f32],
    candidates: &[V],
    lambda: f32,
    top_k: usize,
    mode: SelectionMode,
) -> MmrOutcome {
    let similarities: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c.as_ref()))
        .collect();

    let selected = match mode {
        SelectionMode::Contradiction => similarities
            .iter()
            .enumerate()
            .filter(|(_, s)| **s < 0.0)
            .map(|(i, _)| i)
            .collect(),
        SelectionMode::Relevance => greedy(candidates, &similarities, lambda, top_k),
    };

    MmrOutcome { selected, similarities }
}

fn greedy<V: AsRef<[f32]>>(candidates: &[V], sim_q: &[f32], lambda: f32, top_k: usize) -> Vec<usize> {
    let n = candidates.len();
    let k = top_k.min(n);
    let mut selected = Vec::with_capacity(k);
    let mut taken = vec![false; n];
    // Highest similarity of each candidate to anything selected so far
    let mut max_sim = vec![f32::NEG_INFINITY; n];

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for i in (0..n).filter(|i| !taken[*i]) {
            let score = if selected.is_empty() {
                sim_q[i]
            } else {
                lambda * sim_q[i] - (1.0 - lambda) * max_sim[i]
            };
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((i, score));
            }
        }

        let Some((pick, _)) = best else {
            break;
        };
        taken[pick] = true;
        selected.push(pick);

        for i in (0..n).filter(|i| !taken[*i]) {
            let sim = cosine_similarity(candidates[i].as_ref(), candidates[pick].as_ref());
            if sim > max_sim[i] {
                max_sim[i] = sim;
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit vectors whose cosine with `[1, 0]` equals each given value
    fn with_similarities(values: &[f32]) -> Vec<Vec<f32>> {
        values.iter().map(|s| vec![*s, (1.0 - s * s).max(0.0).sqrt()]).collect()
    }

    const QUERY: [f32; 2] = [1.0, 0.0];

    #[test]
    fn empty_candidates_select_nothing() {
        let empty: Vec<Vec<f32>> = Vec::new();
        let outcome = select(&QUERY, &empty, 0.72, 5, SelectionMode::Relevance);
        assert!(outcome.selected.is_empty());
        assert!(outcome.similarities.is_empty());
    }

    #[test]
    fn zero_k_selects_nothing() {
        let candidates = with_similarities(&[0.2, 0.9]);
        let outcome = select(&QUERY, &candidates, 0.72, 0, SelectionMode::Relevance);
        assert!(outcome.selected.is_empty());
        assert_eq!(outcome.similarities.len(), 2);
    }

    #[test]
    fn first_pick_is_max_similarity_lowest_index_on_ties() {
        let candidates = with_similarities(&[0.2, 0.9, 0.9, 0.1]);
        let outcome = select(&QUERY, &candidates, 0.72, 1, SelectionMode::Relevance);
        assert_eq!(outcome.selected, vec![1]);
    }

    #[test]
    fn k_beyond_len_returns_everything() {
        let candidates = with_similarities(&[0.3, 0.8, -0.2, 0.5]);
        let outcome = select(&QUERY, &candidates, 0.5, 10, SelectionMode::Relevance);
        assert_eq!(outcome.selected.len(), 4);
        assert_eq!(outcome.selected[0], 1);
        let mut sorted = outcome.selected.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn lambda_one_is_plain_top_k() {
        let values = [0.4, 0.9, 0.1, 0.9, 0.7, 0.4];
        let candidates = with_similarities(&values);
        let outcome = select(&QUERY, &candidates, 1.0, values.len(), SelectionMode::Relevance);
        assert_eq!(outcome.selected, vec![1, 3, 4, 0, 5, 2]);
    }

    #[test]
    fn diversity_penalizes_duplicates() {
        let candidates = vec![
            vec![1.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.6, 0.8, 0.0],
        ];
        let query = [0.9, 0.436, 0.0];
        let outcome = select(&query, &candidates, 0.5, 2, SelectionMode::Relevance);
        assert_eq!(outcome.selected, vec![0, 2]);
    }

    #[test]
    fn contradiction_mode_returns_negative_in_order() {
        let candidates = with_similarities(&[0.5, -0.3, 0.0, -0.1]);
        for k in [0, 1, 10] {
            let outcome = select(&QUERY, &candidates, 0.72, k, SelectionMode::Contradiction);
            assert_eq!(outcome.selected, vec![1, 3]);
            assert_eq!(outcome.similarities.len(), 4);
        }
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[3.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
