//! Gibbs energy of a labelling.
//!
//! The energy of label `l` at voxel `i` is
//!
//! ```text
//! U(i, l) + boundary_weight * #{ j in N(i) : no edge between i and j, l != l_j }
//!         + gibbs_prior_weight * [l != seed_i]
//! ```
//!
//! where `U` is the Gaussian negative log likelihood of the voxel intensity under the
//! statistics of class `l`. Every neighbor pair appears in the local energy of both of
//! its voxels, but only once in [`EnergyModel::total`], so changing one voxel's label
//! changes the total by exactly the change in its local energy.

use hyseg_core::{GridExtent, Label};

use super::statistics::RegionStatistics;

/// Likelihood cost of an empty class. Finite so that sums stay comparable.
pub const UNFAVORABLE_ENERGY: f64 = 1e12;

const LN_TWO_PI: f64 = 1.837_877_066_409_345_5;

/// Gaussian negative log likelihood of `x` under `stats`.
pub fn likelihood(stats: &RegionStatistics, x: f64) -> f64 {
    if stats.is_empty() {
        return UNFAVORABLE_ENERGY;
    }
    let d = x - stats.mean;
    0.5 * (LN_TWO_PI + stats.variance.ln()) + d * d / (2.0 * stats.variance)
}

/// Borrowed view of everything the energy depends on except the labels themselves.
pub(crate) struct EnergyModel<'a> {
    pub extent: GridExtent,
    pub intensity: &'a [f32],
    pub seed: &'a [Label],
    pub stats: &'a [RegionStatistics],
    pub boundary_weight: f64,
    pub prior_weight: f64,
    pub edge_threshold: f64,
}

impl<'a> EnergyModel<'a> {
    #[inline]
    fn is_edge(&self, i: usize, j: usize) -> bool {
        (self.intensity[i] as f64 - self.intensity[j] as f64).abs() > self.edge_threshold
    }

    /// Likelihood plus seed prior.
    pub fn unary(&self, index: usize, label: Label) -> f64 {
        let u = match self.stats.get(label as usize) {
            Some(stats) => likelihood(stats, self.intensity[index] as f64),
            None => UNFAVORABLE_ENERGY,
        };
        let prior = if label != self.seed[index] {
            self.prior_weight
        } else {
            0.0
        };
        u + prior
    }

    /// Energy of assigning `label` to `index` with all other labels as in `labels`.
    pub fn local(&self, labels: &[Label], index: usize, label: Label) -> f64 {
        let disagreements = self
            .extent
            .neighbors(index)
            .filter(|&j| labels[j] != label && !self.is_edge(index, j))
            .count();
        self.unary(index, label) + self.boundary_weight * disagreements as f64
    }

    /// Lowest-energy label for `index` if it is strictly better than the current one.
    ///
    /// Candidates are the labels present in the clique. Ties keep the earlier candidate,
    /// so the current label always wins a tie.
    pub fn best_label(&self, labels: &[Label], index: usize) -> Option<(Label, f64)> {
        let current = labels[index];
        let mut candidates: [Label; 6] = [current; 6];
        let mut n = 0;
        for j in self.extent.neighbors(index) {
            let l = labels[j];
            if l != current && !candidates[..n].contains(&l) {
                candidates[n] = l;
                n += 1;
            }
        }
        if n == 0 {
            return None;
        }

        let current_energy = self.local(labels, index, current);
        let mut best = (current, current_energy);
        for &candidate in &candidates[..n] {
            let e = self.local(labels, index, candidate);
            if e < best.1 {
                best = (candidate, e);
            }
        }
        if best.0 != current {
            Some((best.0, current_energy - best.1))
        } else {
            None
        }
    }

    /// Total energy of a labelling, each neighbor pair counted once.
    pub fn total(&self, labels: &[Label]) -> f64 {
        let mut energy = 0.0;
        for i in 0..labels.len() {
            energy += self.unary(i, labels[i]);
            for j in self.extent.neighbors(i) {
                if j > i && labels[i] != labels[j] && !self.is_edge(i, j) {
                    energy += self.boundary_weight;
                }
            }
        }
        energy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(label: Label, count: usize, mean: f64, variance: f64) -> RegionStatistics {
        RegionStatistics {
            label,
            count,
            mean,
            variance,
            boundary_gradient: f64::INFINITY,
        }
    }

    #[test]
    fn test_likelihood_minimum_at_mean() {
        let s = stats(1, 10, 5.0, 2.0);
        assert!(likelihood(&s, 5.0) < likelihood(&s, 6.0));
        assert!((likelihood(&s, 6.0) - likelihood(&s, 4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_class_is_unfavorable() {
        let s = stats(2, 0, 0.0, 1.0);
        assert_eq!(likelihood(&s, 0.0), UNFAVORABLE_ENERGY);
    }

    #[test]
    fn test_local_change_matches_total_change() {
        let extent = GridExtent::new(3, 3, 1);
        let intensity = vec![0.0, 0.0, 9.0, 0.0, 5.0, 9.0, 0.0, 9.0, 9.0];
        let seed = vec![0; 9];
        let class_stats = vec![stats(0, 4, 0.0, 4.0), stats(1, 5, 9.0, 4.0)];
        let model = EnergyModel {
            extent,
            intensity: &intensity,
            seed: &seed,
            stats: &class_stats,
            boundary_weight: 1.5,
            prior_weight: 0.5,
            edge_threshold: 8.0,
        };

        let before: Vec<Label> = vec![0, 0, 1, 0, 0, 1, 0, 1, 1];
        let mut after = before.clone();
        after[4] = 1;

        let delta_total = model.total(&after) - model.total(&before);
        let delta_local = model.local(&before, 4, 1) - model.local(&before, 4, 0);
        assert!((delta_total - delta_local).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_clique_has_no_candidate() {
        let extent = GridExtent::new(3, 1, 1);
        let intensity = vec![9.0, 9.0, 9.0];
        let seed = vec![0; 3];
        let class_stats = vec![stats(0, 3, 0.0, 1.0), stats(1, 0, 0.0, 1.0)];
        let model = EnergyModel {
            extent,
            intensity: &intensity,
            seed: &seed,
            stats: &class_stats,
            boundary_weight: 1.0,
            prior_weight: 0.0,
            edge_threshold: f64::INFINITY,
        };
        assert!(model.best_label(&[0, 0, 0], 1).is_none());
    }
}
