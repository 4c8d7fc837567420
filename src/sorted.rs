//! Merge-based set algebra over sorted, duplicate-free slices.
//!
//! Rectangle components, brick key lists, register lines and partition
//! member lists are all kept sorted and unique, so every set operation in
//! the crate is a linear merge or a galloping search.

use std::cmp::Ordering;

/// Position of the first element `>= target` in `slice`, probing at
/// exponentially growing offsets before the final binary search.
///
/// Cheap when the answer is close to the front, which is the common case
/// when a cursor walks forward through a long list.
#[inline]
pub fn gallop<T: Ord>(slice: &[T], target: &T) -> usize {
    let mut hi = 1;
    while hi < slice.len() && slice[hi - 1] < *target {
        hi <<= 1;
    }
    let lo = hi >> 1;
    let hi = hi.min(slice.len());
    lo + slice[lo..hi].partition_point(|x| x < target)
}

/// Calls `visit(position_in_keys)` for every value present in both `keys`
/// and `probe`, in increasing order.
///
/// The shorter list is walked and each of its values is galloped into the
/// longer one from the current cursor, so the cost is
/// `O(short * log(long / short))` instead of `O(short + long)`.
pub fn for_each_common<T: Ord>(keys: &[T], probe: &[T], mut visit: impl FnMut(usize)) {
    if probe.len() < keys.len() {
        let mut cursor = 0;
        for value in probe {
            cursor += gallop(&keys[cursor..], value);
            if cursor == keys.len() {
                return;
            }
            if keys[cursor] == *value {
                visit(cursor);
                cursor += 1;
            }
        }
    } else {
        let mut cursor = 0;
        for (pos, key) in keys.iter().enumerate() {
            cursor += gallop(&probe[cursor..], key);
            if cursor == probe.len() {
                return;
            }
            if probe[cursor] == *key {
                visit(pos);
                cursor += 1;
            }
        }
    }
}

/// Sorted intersection `a ∩ b`
pub fn intersection<T: Ord + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    for_each_common(a, b, |pos| out.push(a[pos]));
    out
}

/// Sorted difference `a \ b`
pub fn difference<T: Ord + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out
}

/// Sorted union `a ∪ b`
pub fn union<T: Ord + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Insert `value` into a sorted unique vector. Returns false if already present.
pub fn insert<T: Ord>(vec: &mut Vec<T>, value: T) -> bool {
    match vec.binary_search(&value) {
        Ok(_) => false,
        Err(pos) => {
            vec.insert(pos, value);
            true
        }
    }
}

/// Remove `value` from a sorted unique vector. Returns false if absent.
pub fn remove<T: Ord>(vec: &mut Vec<T>, value: &T) -> bool {
    match vec.binary_search(value) {
        Ok(pos) => {
            vec.remove(pos);
            true
        }
        Err(_) => false,
    }
}

/// True iff the slice is strictly increasing
pub fn is_strictly_sorted<T: Ord>(slice: &[T]) -> bool {
    slice.windows(2).all(|w| w[0] < w[1])
}
