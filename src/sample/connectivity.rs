//! Triangulation and hull extraction for tensor-product point grids.

use rustc_hash::FxHashMap;

/// Simplices covering a tensor grid with `counts[i]` points along axis `i`.
///
/// Points are numbered row-major (last axis fastest). Every grid cell is cut
/// into `d!` simplices by the Freudenthal/Kuhn split: one simplex per
/// permutation of the axes, walking from the cell's lowest corner one unit
/// step at a time. Axes with fewer than two points yield no cells.
pub(crate) fn tensor_simplices(counts: &[usize]) -> Vec<Vec<usize>> {
    let d = counts.len();
    if d == 0 || counts.iter().any(|&n| n < 2) {
        return Vec::new();
    }
    let mut strides = vec![1; d];
    for i in (0..d.saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * counts[i + 1];
    }
    let cells: Vec<usize> = counts.iter().map(|&n| n - 1).collect();
    let orders = permutations(d);

    let mut simplices = Vec::with_capacity(cells.iter().product::<usize>() * orders.len());
    let mut cell = vec![0; d];
    loop {
        let corner: usize = cell.iter().zip(&strides).map(|(c, s)| c * s).sum();
        for order in &orders {
            let mut vertex = corner;
            let mut simplex = Vec::with_capacity(d + 1);
            simplex.push(vertex);
            for &axis in order {
                vertex += strides[axis];
                simplex.push(vertex);
            }
            simplices.push(simplex);
        }
        if !advance(&mut cell, &cells) {
            break;
        }
    }
    simplices
}

/// Odometer increment of a multi-index; false once it wraps around
fn advance(index: &mut [usize], limits: &[usize]) -> bool {
    for i in (0..index.len()).rev() {
        index[i] += 1;
        if index[i] < limits[i] {
            return true;
        }
        index[i] = 0;
    }
    false
}

/// All permutations of `0..n` in lexicographic order
fn permutations(n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        return vec![Vec::new()];
    }
    let mut result = Vec::new();
    for first in 0..n {
        for rest in permutations(n - 1) {
            let mut perm = Vec::with_capacity(n);
            perm.push(first);
            perm.extend(rest.into_iter().map(|r| if r >= first { r + 1 } else { r }));
            result.push(perm);
        }
    }
    result
}

/// Facets that belong to exactly one simplex, in order of first occurrence.
///
/// A facet is a simplex with one vertex dropped. Facets are matched on their
/// sorted vertex set, so orientation does not matter.
pub(crate) fn hull(tri: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut counts: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
    let mut facets: Vec<(Vec<usize>, Vec<usize>)> = Vec::new();
    for simplex in tri {
        if simplex.len() < 2 {
            continue;
        }
        for skip in 0..simplex.len() {
            let facet: Vec<usize> = simplex
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != skip)
                .map(|(_, &v)| v)
                .collect();
            let mut key = facet.clone();
            key.sort_unstable();
            let count = counts.entry(key.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                facets.push((key, facet));
            }
        }
    }
    facets
        .into_iter()
        .filter(|(key, _)| counts.get(key) == Some(&1))
        .map(|(_, facet)| facet)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_square_splits_into_two_triangles() {
        let tri = tensor_simplices(&[2, 2]);
        assert_eq!(tri, vec![vec![0, 2, 3], vec![0, 1, 3]]);
    }

    #[test]
    fn simplex_count_is_cells_times_factorial() {
        assert_eq!(tensor_simplices(&[3, 3]).len(), 8);
        assert_eq!(tensor_simplices(&[2, 2, 2]).len(), 6);
        assert_eq!(tensor_simplices(&[3, 2, 4]).len(), 2 * 3 * 6);
        assert_eq!(tensor_simplices(&[5]).len(), 4);
        assert!(tensor_simplices(&[1, 3]).is_empty());
    }

    #[test]
    fn square_hull_has_four_edges() {
        let hull = hull(&tensor_simplices(&[2, 2]));
        assert_eq!(hull.len(), 4);
        // the diagonal is interior
        assert!(!hull.iter().any(|f| {
            let mut f = f.clone();
            f.sort_unstable();
            f == vec![0, 3]
        }));
    }

    #[test]
    fn cube_hull_has_twelve_triangles() {
        // six faces, two triangles each
        assert_eq!(hull(&tensor_simplices(&[2, 2, 2])).len(), 12);
    }

    #[test]
    fn line_hull_is_its_endpoints() {
        assert_eq!(hull(&tensor_simplices(&[4])), vec![vec![0], vec![3]]);
    }
}
