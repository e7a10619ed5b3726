/// Euclidean (L2) distance between two vectors.
///
/// Accumulates in f64. Only the common prefix is compared when the lengths
/// differ; callers are expected to have checked dimensions already.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut sum: f64 = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let d = (y as f64) - (x as f64);
        sum += d * d;
    }
    sum.sqrt() as f32
}
