use crate::core::errors::ProviderError;

pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, ProviderError> {
    if query.len() != candidate.len() {
        return Err(ProviderError::DimensionMismatch {
            expected: query.len(),
            actual: candidate.len(),
        });
    }
    if query.is_empty() {
        return Ok(0.0);
    }

    let dot: f32 = query.iter().zip(candidate).map(|(a, b)| a * b).sum();
    let denom = l2_norm(query) * l2_norm(candidate);
    if denom <= f32::EPSILON {
        return Ok(0.0);
    }

    Ok(dot / denom)
}

/// Stable sort, highest score first. NaN scores go last.
pub fn sort_by_score_desc<T, F>(items: &mut [T], score: F)
where
    F: Fn(&T) -> f32,
{
    items.sort_by(|left, right| {
        let (l, r) = (score(left), score(right));
        match (l.is_nan(), r.is_nan()) {
            (false, false) => r.total_cmp(&l),
            (l_nan, r_nan) => l_nan.cmp(&r_nan),
        }
    });
}

pub fn ensure_dimension(expected: usize, vector: &[f32]) -> Result<(), ProviderError> {
    if vector.len() != expected {
        return Err(ProviderError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}
