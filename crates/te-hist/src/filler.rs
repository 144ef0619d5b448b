//! Bulk histogram filling from column data with optional selection masks and weights.

use te_core::{Error, Result};

use crate::axis::BinAxis;
use crate::hist::{Bins, Hist, ravel};

impl Hist {
    /// Fill every row of `values` (one column per binned axis) under the
    /// categorical coordinate `key`.
    ///
    /// Rows with any value outside its axis range are dropped and their weight
    /// is added to [`Bins::dropped`].
    pub fn fill(&mut self, key: &[&str], values: &[&[f64]], weights: Option<&[f64]>) -> Result<()> {
        self.fill_masked(key, values, None, weights)
    }

    /// Like [`Hist::fill`], but only rows with `mask[row] == true` are filled.
    pub fn fill_masked(
        &mut self,
        key: &[&str],
        values: &[&[f64]],
        mask: Option<&[bool]>,
        weights: Option<&[f64]>,
    ) -> Result<()> {
        if key.len() != self.categories().len() {
            return Err(Error::Config(format!(
                "fill key has {} categories, histogram expects {}",
                key.len(),
                self.categories().len()
            )));
        }
        if values.len() != self.axes().len() {
            return Err(Error::Config(format!(
                "fill provides {} value columns, histogram has {} binned axes",
                values.len(),
                self.axes().len()
            )));
        }
        let n_rows = values.first().map(|v| v.len()).unwrap_or(0);
        let lengths_ok = values.iter().all(|v| v.len() == n_rows)
            && mask.is_none_or(|m| m.len() == n_rows)
            && weights.is_none_or(|w| w.len() == n_rows);
        if !lengths_ok {
            return Err(Error::Data("fill columns, mask and weights must have equal lengths".into()));
        }

        let shape: Vec<usize> = self.axes().iter().map(BinAxis::n_bins).collect();
        let located: Vec<Option<usize>> = (0..n_rows)
            .map(|row| {
                let idx: Option<Vec<usize>> =
                    self.axes().iter().zip(values).map(|(ax, col)| ax.find_bin(col[row])).collect();
                idx.map(|i| ravel(&i, &shape))
            })
            .collect();

        let size = self.dense_size();
        let owned: Vec<String> = key.iter().map(|s| s.to_string()).collect();
        let bins = self.bins.entry(owned).or_insert_with(|| Bins::zeros(size));

        for (row, slot) in located.into_iter().enumerate() {
            if let Some(m) = mask
                && !m[row]
            {
                continue;
            }
            let w = weights.map_or(1.0, |w| w[row]);
            match slot {
                Some(b) => {
                    bins.sumw[b] += w;
                    bins.sumw2[b] += w * w;
                    bins.entries += 1;
                }
                None => bins.dropped += w,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::axis::{BinAxis, CatAxis};
    use crate::hist::Hist;
    use te_core::Error;

    fn hist_1d(edges: Vec<f64>) -> Hist {
        Hist::new(
            "Counts",
            vec![CatAxis::new("region", "Selection region")],
            vec![BinAxis::variable("x", "x", edges).unwrap()],
        )
        .unwrap()
    }

    #[test]
    fn fill_simple() {
        let mut h = hist_1d(vec![0.0, 1.0, 2.0, 3.0]);
        h.fill(&["r"], &[&[0.5, 1.5, 2.5, 0.5, -1.0, 3.5]], None).unwrap();
        let bins = h.get(&["r"]).unwrap();
        assert_eq!(bins.sumw, vec![2.0, 1.0, 1.0]);
        assert_eq!(bins.dropped, 2.0);
        assert_eq!(bins.entries, 4);
    }

    #[test]
    fn fill_with_weight() {
        let mut h = hist_1d(vec![0.0, 1.0, 2.0]);
        h.fill(&["r"], &[&[0.5, 1.5, 0.5]], Some(&[2.0, 3.0, 1.0])).unwrap();
        let bins = h.get(&["r"]).unwrap();
        assert_eq!(bins.sumw, vec![3.0, 3.0]);
        assert_eq!(bins.sumw2, vec![5.0, 9.0]);
    }

    #[test]
    fn fill_with_selection() {
        let mut h = hist_1d(vec![0.0, 1.0, 2.0, 3.0]);
        let x = [0.5, 1.5, 2.5, 0.3];
        let mask: Vec<bool> = x.iter().map(|&v| v > 1.0).collect();
        h.fill_masked(&["r"], &[&x], Some(&mask), None).unwrap();
        let bins = h.get(&["r"]).unwrap();
        assert_eq!(bins.sumw, vec![0.0, 1.0, 1.0]);
        assert_eq!(bins.entries, 2);
    }

    #[test]
    fn fill_all_masked_creates_empty_coordinate() {
        let mut h = hist_1d(vec![0.0, 1.0]);
        h.fill_masked(&["r"], &[&[0.5]], Some(&[false]), None).unwrap();
        assert_eq!(h.values(&["r"]), vec![0.0]);
        assert_eq!(h.get(&["r"]).unwrap().entries, 0);
    }

    #[test]
    fn fill_rejects_wrong_shapes() {
        let mut h = hist_1d(vec![0.0, 1.0, 2.0]);
        let err = h.fill(&["a", "b"], &[&[0.5]], None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = h.fill(&["r"], &[&[0.5], &[0.5]], None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = h.fill(&["r"], &[&[0.5, 1.5]], Some(&[1.0])).unwrap_err();
        assert!(matches!(err, Error::Data(_)));
    }

    #[test]
    fn fill_two_axes_drops_row_if_any_value_out_of_range() {
        let mut h = Hist::new(
            "Counts",
            vec![],
            vec![
                BinAxis::regular("eta", "", 2, -1.0, 1.0).unwrap(),
                BinAxis::regular("pt", "", 2, 0.0, 10.0).unwrap(),
            ],
        )
        .unwrap();
        h.fill(&[], &[&[0.5, 0.5, -0.5], &[7.0, 20.0, 1.0]], None).unwrap();
        let bins = h.get(&[]).unwrap();
        assert_eq!(bins.sumw, vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(bins.dropped, 1.0);
    }
}
