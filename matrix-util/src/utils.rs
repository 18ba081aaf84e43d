use std::collections::BTreeMap;

/// partition membership vector into groups of indexes
/// # Arguments
/// * `membership` - a vector of membership (E.g., cluster assignment)
/// # Returns
/// An ordered map: cluster/group name -> indexes of the elements
pub fn partition_by_membership<T>(membership: &[T]) -> BTreeMap<T, Vec<usize>>
where
    T: Ord + Clone,
{
    let mut pb_elems: BTreeMap<T, Vec<usize>> = BTreeMap::new();
    for (elem, k) in membership.iter().enumerate() {
        pb_elems.entry(k.clone()).or_default().push(elem);
    }
    pb_elems
}

/// Relabel so that labels are `0..k` in order of first appearance.
/// Returns the relabelled vector and `k`.
pub fn compact_labels(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut remap: BTreeMap<usize, usize> = BTreeMap::new();
    let out = labels
        .iter()
        .map(|l| {
            let next = remap.len();
            *remap.entry(*l).or_insert(next)
        })
        .collect();
    (out, remap.len())
}
