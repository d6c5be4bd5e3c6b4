use core::fmt::Debug;

/// Maximum number of characters of an argument or result rendering that end
/// up in the logs.
pub(crate) const ABBREVIATE_LIMIT: usize = 120;

/// `Debug` rendering of `value`, cut to `limit` characters.
pub(crate) fn abbreviate(value: &impl Debug, limit: usize) -> String {
    let rendered = format!("{value:?}");
    match rendered.char_indices().nth(limit) {
        None => rendered,
        Some((cut, _)) => format!("{}...", &rendered[..cut]),
    }
}

/// Row-major position of a combination of per-input indexes.
///
/// `position = sum(idx[k] * prod(sizes[k + 1..]))`, so the numbering only
/// depends on the input sizes and never on arrival order.
pub(crate) fn flat_position(indexes: &[usize], sizes: &[usize]) -> usize {
    debug_assert_eq!(indexes.len(), sizes.len(), "flat_position");
    indexes
        .iter()
        .zip(sizes)
        .fold(0, |acc, (&idx, &size)| acc * size + idx)
}

/// Product of `sizes`, or `None` on overflow. The empty product is 1.
pub(crate) fn checked_product(sizes: &[usize]) -> Option<usize> {
    sizes.iter().try_fold(1usize, |acc, &size| acc.checked_mul(size))
}

/// Iterates every index combination of `lens` in row-major order.
///
/// Yields nothing if any length is zero, and a single empty combination if
/// `lens` is empty.
pub(crate) struct Odometer<'a> {
    lens: &'a [usize],
    current: Option<Vec<usize>>,
}

impl<'a> Odometer<'a> {
    pub(crate) fn new(lens: &'a [usize]) -> Self {
        let current = lens.iter().all(|&len| len > 0).then(|| vec![0; lens.len()]);
        Self { lens, current }
    }
}

impl Iterator for Odometer<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.take()?;
        let mut next = current.clone();
        for digit in (0..next.len()).rev() {
            next[digit] += 1;
            if next[digit] < self.lens[digit] {
                self.current = Some(next);
                break;
            }
            next[digit] = 0;
        }
        Some(current)
    }
}
