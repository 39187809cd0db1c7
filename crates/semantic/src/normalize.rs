/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize_in_place(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 {
        let inv_norm = norm_sq.sqrt().recip();
        for x in v.iter_mut() {
            *x *= inv_norm;
        }
    }
}

/// True when every component is finite.
pub fn is_finite_vector(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn normalizes_three_four_five() {
        let mut v = vec![3.0f32, -4.0];
        l2_normalize_in_place(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] + 0.8).abs() < 1e-6);
    }

    #[test]
    fn result_has_unit_length() {
        let mut v: Vec<f32> = (1..=384).map(|i| (i as f32).sin()).collect();
        l2_normalize_in_place(&mut v);
        assert!((norm(&v) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_and_empty_vectors_unchanged() {
        let mut zero = vec![0.0f32; 4];
        l2_normalize_in_place(&mut zero);
        assert_eq!(zero, vec![0.0; 4]);

        let mut empty: Vec<f32> = Vec::new();
        l2_normalize_in_place(&mut empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let mut v = vec![1.0f32, 2.0, 3.0];
        l2_normalize_in_place(&mut v);
        let once = v.clone();
        l2_normalize_in_place(&mut v);
        for (a, b) in v.iter().zip(once.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn finite_check() {
        assert!(is_finite_vector(&[0.1, -2.0]));
        assert!(!is_finite_vector(&[0.1, f32::NAN]));
        assert!(!is_finite_vector(&[f32::INFINITY]));
    }
}
