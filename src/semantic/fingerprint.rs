//! Style fingerprints: the mean of the image embeddings of one style code.

/// Element-wise mean of `vectors`.
///
/// Returns `None` for an empty input or when the vectors disagree on length.
pub fn average(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dimensions = first.len();
    if vectors.iter().any(|v| v.len() != dimensions) {
        return None;
    }

    let mut sum = vec![0.0f64; dimensions];
    for vector in vectors {
        for (acc, value) in sum.iter_mut().zip(vector) {
            *acc += f64::from(*value);
        }
    }

    let count = vectors.len() as f64;
    Some(sum.into_iter().map(|v| (v / count) as f32).collect())
}
