use ndarray::ArrayViewMut1;

/// Numerically stable softmax over one lane, in place.
pub(crate) fn softmax_in_place(mut lane: ArrayViewMut1<f32>) {
    let max = lane.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    lane.mapv_inplace(|x| (x - max).exp());
    let sum: f32 = lane.sum();
    if sum > 1e-10 {
        lane.mapv_inplace(|x| x / sum);
    }
}

/// Rounds a probability to a percentage with one decimal.
pub(crate) fn to_percent(probability: f32) -> f32 {
    (probability * 1000.0).round() / 10.0
}
