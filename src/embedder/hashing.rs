use super::{normalize, Embedder};
use crate::utils::DocsiftResult;

/// 离线向量化：词和字符三元组做特征哈希，结果确定且可复现
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        for token in &tokens {
            self.add(&mut vector, token.as_bytes(), 1.0);

            let chars: Vec<char> = format!("^{}$", token).chars().collect();
            for window in chars.windows(3) {
                let gram: String = window.iter().collect();
                self.add(&mut vector, gram.as_bytes(), 0.5);
            }
        }

        normalize(vector)
    }

    fn add(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> DocsiftResult<Vec<f32>> {
        Ok(self.vectorize(text))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::mmr::cosine_similarity;

    #[test]
    fn vectors_are_deterministic_and_unit_length() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder.vectorize("Travel planning for a group of friends");
        let b = embedder.vectorize("Travel planning for a group of friends");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn related_texts_score_higher() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.vectorize("coastal beach activities");
        let close = embedder.vectorize("Beach activities along the coastal towns");
        let far = embedder.vectorize("Tax filing deadlines for corporations");
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }
}
