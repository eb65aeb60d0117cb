//! Similarity metrics used to rank stored entries against a query.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric used to score a stored vector against a query vector.
///
/// Every metric reports a score where **higher is more similar**, so search
/// results can always be sorted in descending order regardless of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine similarity in `[-1, 1]`.
    ///
    /// The right choice for sentence-embedding models, which is what the
    /// retrieval pipeline stores.
    #[default]
    Cosine,

    /// Euclidean distance mapped to `1 / (1 + d)`.
    Euclidean,

    /// Raw inner product. Equivalent to cosine for normalized embeddings.
    DotProduct,
}

impl DistanceMetric {
    /// Score `b` against `a`. Higher means closer.
    ///
    /// Callers must pass vectors of equal length; the index validates
    /// dimensions before any vector reaches this function.
    #[inline]
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");

        match self {
            DistanceMetric::Cosine => cosine_similarity(a, b),
            DistanceMetric::Euclidean => 1.0 / (1.0 + euclidean_distance(a, b)),
            DistanceMetric::DotProduct => dot_product(a, b),
        }
    }

    /// Stable lowercase name, used in the persisted manifest.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::DotProduct => "dot_product",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" | "cos" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "dot" | "dot_product" | "inner" => Ok(DistanceMetric::DotProduct),
            _ => Err(format!("Unknown distance metric: {}", s)),
        }
    }
}

#[inline]
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold((0.0f32, 0.0f32, 0.0f32), |acc, (x, y)| {
        (acc.0 + x * y, acc.1 + x * x, acc.2 + y * y)
    });

    let denom = (norm_a * norm_b).sqrt();
    if denom == 0.0 {
        // A zero vector has no direction; treat it as unrelated to everything.
        0.0
    } else {
        dot / denom
    }
}

#[inline]
fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let sim = DistanceMetric::Cosine.similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((sim - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = DistanceMetric::Cosine.similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 0.0001);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let sim = DistanceMetric::Cosine.similarity(&[0.0, 0.0], &[1.0, 0.0]);
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_euclidean_is_inverted() {
        let same = DistanceMetric::Euclidean.similarity(&[1.0, 2.0], &[1.0, 2.0]);
        let far = DistanceMetric::Euclidean.similarity(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((same - 1.0).abs() < 0.0001);
        // distance 5 -> 1 / 6
        assert!((far - 1.0 / 6.0).abs() < 0.0001);
    }

    #[test]
    fn test_dot_product() {
        let sim = DistanceMetric::DotProduct.similarity(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);
        assert!((sim - 32.0).abs() < 0.0001);
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!("l2".parse::<DistanceMetric>().unwrap(), DistanceMetric::Euclidean);
        assert_eq!("dot".parse::<DistanceMetric>().unwrap(), DistanceMetric::DotProduct);
        assert!("hamming".parse::<DistanceMetric>().is_err());
    }
}
