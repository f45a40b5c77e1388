//! Removal of regions smaller than the cluster size.

use std::collections::VecDeque;

use hyseg_core::{Label, LabelGrid};

/// Merge every 6-connected component of a non-zero label with fewer than `min_size`
/// voxels into the label it borders most often (ties go to the smaller label), or into
/// background when it borders nothing. Returns the number of relabelled voxels.
///
/// Components are visited in storage order of their first voxel and merges are applied
/// immediately. A merged region counts towards the size of the region it joined when that
/// region has not been measured yet; otherwise it stays settled with it.
pub fn erase_small_regions(labels: &mut LabelGrid, min_size: usize) -> usize {
    if min_size <= 1 {
        return 0;
    }
    let extent = labels.extent();
    let mut visited = vec![false; extent.len()];
    let mut component = Vec::new();
    let mut queue = VecDeque::new();
    let mut border: Vec<(Label, usize)> = Vec::new();
    let mut erased = 0;

    for start in 0..extent.len() {
        let label = labels[start];
        if label == 0 || visited[start] {
            continue;
        }

        component.clear();
        border.clear();
        visited[start] = true;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            component.push(idx);
            for n in extent.neighbors(idx) {
                let nl = labels[n];
                if nl == label {
                    if !visited[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                } else {
                    match border.iter_mut().find(|(l, _)| *l == nl) {
                        Some((_, count)) => *count += 1,
                        None => border.push((nl, 1)),
                    }
                }
            }
        }

        if component.len() >= min_size {
            continue;
        }

        let target = border
            .iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|&(l, _)| l)
            .unwrap_or(0);
        // Only a target region that is still unmeasured may pick the merged voxels up again.
        let rejoin = target != 0
            && component.iter().any(|&idx| {
                extent
                    .neighbors(idx)
                    .any(|n| labels[n] == target && !visited[n])
            });
        for &idx in &component {
            labels[idx] = target;
            visited[idx] = !rejoin;
        }
        erased += component.len();
    }

    erased
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyseg_core::GridExtent;

    #[test]
    fn test_small_island_merges_into_surrounding_label() {
        let extent = GridExtent::new(5, 5, 1);
        let mut labels = LabelGrid::filled(extent, 1);
        labels.set(2, 2, 0, 2);
        let erased = erase_small_regions(&mut labels, 3);
        assert_eq!(erased, 1);
        assert_eq!(labels.count_label(1), 25);
    }

    #[test]
    fn test_multi_voxel_island_merges_once() {
        let extent = GridExtent::new(5, 5, 1);
        let mut labels = LabelGrid::filled(extent, 1);
        labels.set(2, 2, 0, 2);
        labels.set(3, 2, 0, 2);
        let erased = erase_small_regions(&mut labels, 3);
        assert_eq!(erased, 2);
        assert_eq!(labels.count_label(1), 25);
        assert_eq!(labels.count_label(0), 0);
    }

    #[test]
    fn test_merged_voxels_count_towards_later_region() {
        // The leading 2 joins the pair of 1s, which then reaches the minimum size.
        let extent = GridExtent::new(6, 1, 1);
        let mut labels = LabelGrid::from_vec(extent, vec![2, 1, 1, 0, 0, 0]).unwrap();
        assert_eq!(erase_small_regions(&mut labels, 3), 1);
        assert_eq!(labels.as_slice(), &[1, 1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_isolated_region_becomes_background() {
        let extent = GridExtent::new(3, 1, 1);
        let mut labels = LabelGrid::filled(extent, 1);
        assert_eq!(erase_small_regions(&mut labels, 5), 3);
        assert_eq!(labels.count_label(0), 3);
    }

    #[test]
    fn test_large_regions_and_background_are_kept() {
        let extent = GridExtent::new(6, 6, 1);
        let mut labels = LabelGrid::from_fn(extent, |x, _, _| if x < 3 { 0 } else { 1 });
        let before = labels.clone();
        assert_eq!(erase_small_regions(&mut labels, 10), 0);
        assert_eq!(labels, before);
    }

    #[test]
    fn test_tie_prefers_smaller_label() {
        // The single 2 borders 1 once and 3 once.
        let extent = GridExtent::new(7, 1, 1);
        let mut labels = LabelGrid::from_vec(extent, vec![1, 1, 1, 2, 3, 3, 3]).unwrap();
        assert_eq!(erase_small_regions(&mut labels, 2), 1);
        assert_eq!(labels.as_slice(), &[1, 1, 1, 1, 3, 3, 3]);
    }
}
