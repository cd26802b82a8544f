//! Index-accumulation rules: reductions that report where the winner is.

use std::fmt;

/// Selects one element and reports its position.
///
/// Values are compared through [`key`](IndexAccumulationRule::key); a
/// candidate replaces the current best only when it is strictly better, so
/// ties keep the first position.
pub trait IndexAccumulationRule: Clone + Send + Sync + fmt::Debug + 'static {
    fn name(&self) -> &'static str;

    fn key(&self, x: f64) -> f64 {
        x
    }

    /// Whether key `candidate` beats key `best`.
    fn better(&self, candidate: f64, best: f64) -> bool;

    /// Merges two `(position, value)` partials; ties resolve to the lower position.
    fn pick(&self, a: (usize, f64), b: (usize, f64)) -> (usize, f64) {
        let (ka, kb) = (self.key(a.1), self.key(b.1));
        if self.better(kb, ka) || (kb == ka && b.0 < a.0) {
            b
        } else {
            a
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IMax;

impl IndexAccumulationRule for IMax {
    fn name(&self) -> &'static str {
        "imax"
    }

    fn better(&self, candidate: f64, best: f64) -> bool {
        candidate > best
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IMin;

impl IndexAccumulationRule for IMin {
    fn name(&self) -> &'static str {
        "imin"
    }

    fn better(&self, candidate: f64, best: f64) -> bool {
        candidate < best
    }
}

/// Position of the largest absolute value.
#[derive(Debug, Clone, Copy, Default)]
pub struct IAMax;

impl IndexAccumulationRule for IAMax {
    fn name(&self) -> &'static str {
        "iamax"
    }

    fn key(&self, x: f64) -> f64 {
        x.abs()
    }

    fn better(&self, candidate: f64, best: f64) -> bool {
        candidate > best
    }
}

/// Position of the smallest absolute value.
#[derive(Debug, Clone, Copy, Default)]
pub struct IAMin;

impl IndexAccumulationRule for IAMin {
    fn name(&self) -> &'static str {
        "iamin"
    }

    fn key(&self, x: f64) -> f64 {
        x.abs()
    }

    fn better(&self, candidate: f64, best: f64) -> bool {
        candidate < best
    }
}

#[derive(Debug, Clone, Copy)]
pub enum IndexReduction {
    IMax(IMax),
    IMin(IMin),
    IAMax(IAMax),
    IAMin(IAMin),
}

impl IndexAccumulationRule for IndexReduction {
    fn name(&self) -> &'static str {
        match self {
            IndexReduction::IMax(r) => r.name(),
            IndexReduction::IMin(r) => r.name(),
            IndexReduction::IAMax(r) => r.name(),
            IndexReduction::IAMin(r) => r.name(),
        }
    }

    fn key(&self, x: f64) -> f64 {
        match self {
            IndexReduction::IMax(r) => r.key(x),
            IndexReduction::IMin(r) => r.key(x),
            IndexReduction::IAMax(r) => r.key(x),
            IndexReduction::IAMin(r) => r.key(x),
        }
    }

    fn better(&self, candidate: f64, best: f64) -> bool {
        match self {
            IndexReduction::IMax(r) => r.better(candidate, best),
            IndexReduction::IMin(r) => r.better(candidate, best),
            IndexReduction::IAMax(r) => r.better(candidate, best),
            IndexReduction::IAMin(r) => r.better(candidate, best),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan<R: IndexAccumulationRule>(rule: &R, xs: &[f64]) -> Option<(usize, f64)> {
        xs.iter()
            .copied()
            .enumerate()
            .fold(None, |best, cand| match best {
                None => Some(cand),
                Some(b) => Some(rule.pick(b, cand)),
            })
    }

    #[test]
    fn test_rules() {
        let xs = [1.0, -7.0, 5.0, 0.5];
        assert_eq!(scan(&IMax, &xs), Some((2, 5.0)));
        assert_eq!(scan(&IMin, &xs), Some((1, -7.0)));
        assert_eq!(scan(&IAMax, &xs), Some((1, -7.0)));
        assert_eq!(scan(&IAMin, &xs), Some((3, 0.5)));
        assert_eq!(scan(&IMax, &[]), None);
    }

    #[test]
    fn test_ties_keep_first_position() {
        assert_eq!(scan(&IMax, &[3.0, 1.0, 3.0]), Some((0, 3.0)));
        assert_eq!(IAMax.pick((4, -2.0), (1, 2.0)), (1, 2.0));
        assert_eq!(IAMax.pick((1, 2.0), (4, -2.0)), (1, 2.0));
    }
}
