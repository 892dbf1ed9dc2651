pub fn sparse_to_dense_data<T>(sparse: Vec<(usize, T)>, len: usize) -> Vec<Option<T>> {
  let mut dense = Vec::from_iter((0..len).map(|_| None));
  sparse.into_iter().for_each(|(i, t)| dense[i] = Some(t));
  dense
}

/// Default relative tolerance of [`is_close`].
pub const RTOL: f64 = 1e-5;
/// Default absolute tolerance of [`is_close`].
pub const ATOL: f64 = 1e-8;

/// $|a - b| <= "atol" + "rtol" |b|$
pub fn is_close(a: f64, b: f64) -> bool {
  (a - b).abs() <= ATOL + RTOL * b.abs()
}
