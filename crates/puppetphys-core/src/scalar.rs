pub type Scalar = f32;

/// 1e-6 quantization for cross-platform repeatable controller outputs.
#[inline]
pub fn quantize(x: Scalar) -> Scalar {
    (x * 1.0e6_f32).round() * 1.0e-6_f32
}
