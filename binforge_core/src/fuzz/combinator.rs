//! Lazy index iterators the engine walks: k-subsets and Cartesian products.

/// All `k`-element subsets of `0..n` as ascending index vectors, in
/// lexicographic order. `k == 0` yields a single empty subset; `k > n` yields
/// nothing.
#[derive(Debug, Clone)]
pub struct Combinations {
    n: usize,
    indices: Vec<usize>,
    done: bool,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            done: k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self.indices.clone();
        let k = self.indices.len();
        match (0..k).rev().find(|&i| self.indices[i] != i + self.n - k) {
            Some(i) => {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
            }
            None => self.done = true,
        }
        Some(current)
    }
}

/// Odometer over `lens[0] x lens[1] x ...`, last position turning fastest.
/// Any zero length empties the product; no lengths at all yield one empty tuple.
#[derive(Debug, Clone)]
pub struct CartesianProduct {
    lens: Vec<usize>,
    counters: Vec<usize>,
    done: bool,
}

impl CartesianProduct {
    pub fn new(lens: Vec<usize>) -> Self {
        let done = lens.contains(&0);
        Self {
            counters: vec![0; lens.len()],
            lens,
            done,
        }
    }

    /// Number of tuples the product yields in total, saturating.
    pub fn total(&self) -> u64 {
        self.lens
            .iter()
            .fold(1u64, |acc, &len| acc.saturating_mul(len as u64))
    }
}

impl Iterator for CartesianProduct {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self.counters.clone();
        let mut position = self.counters.len();
        loop {
            if position == 0 {
                self.done = true;
                break;
            }
            position -= 1;
            self.counters[position] += 1;
            if self.counters[position] < self.lens[position] {
                break;
            }
            self.counters[position] = 0;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combinations_are_lexicographic() {
        let all: Vec<_> = Combinations::new(4, 2).collect();
        assert_eq!(
            all,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert_eq!(Combinations::new(3, 3).count(), 1);
        assert_eq!(Combinations::new(2, 3).count(), 0);
        assert_eq!(Combinations::new(0, 0).collect::<Vec<_>>(), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn product_turns_last_position_fastest() {
        let product = CartesianProduct::new(vec![2, 3]);
        assert_eq!(product.total(), 6);
        let all: Vec<_> = product.collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 0]);
        assert_eq!(all[1], vec![0, 1]);
        assert_eq!(all[3], vec![1, 0]);
        assert_eq!(all[5], vec![1, 2]);
    }

    #[test]
    fn product_edge_cases() {
        assert_eq!(CartesianProduct::new(vec![3, 0]).count(), 0);
        assert_eq!(CartesianProduct::new(Vec::new()).count(), 1);
    }
}
