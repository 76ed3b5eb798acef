//! Significance of divergent responses
//!
//! A noisy target occasionally answers the same input differently, so a
//! single outlier among many repetitions is no evidence of an oracle.
//! [`DistributionTest`] checks whether the observed distribution of distinct
//! responses deviates from what a given noise rate explains: Fisher's exact
//! test when exactly two distinct responses were seen, a chi-squared test
//! otherwise.

use super::ResponseVector;

/// One distinct response and how often it was observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCounter<'a> {
    pub vector: &'a ResponseVector,
    pub count: usize,
}

/// Goodness of fit of repeated responses against an expected noise rate
#[derive(Debug, Clone)]
pub struct DistributionTest<'a> {
    /// Most frequent first; ties keep first-seen order
    counters: Vec<ResponseCounter<'a>>,
    total: usize,
    noise_probability: f64,
}

impl<'a> DistributionTest<'a> {
    /// `noise_probability` is the share of responses expected to differ
    /// from the majority by chance; it is clamped to `0.0..=1.0`
    pub fn new(vectors: &'a [ResponseVector], noise_probability: f64) -> Self {
        let mut counters: Vec<ResponseCounter<'a>> = Vec::new();
        for vector in vectors {
            match counters.iter_mut().find(|c| c.vector == vector) {
                Some(counter) => counter.count += 1,
                None => counters.push(ResponseCounter { vector, count: 1 }),
            }
        }
        counters.sort_by(|a, b| b.count.cmp(&a.count));

        Self {
            counters,
            total: vectors.len(),
            noise_probability: noise_probability.clamp(0.0, 1.0),
        }
    }

    pub fn distinct_responses(&self) -> &[ResponseCounter<'a>] {
        &self.counters
    }

    pub fn is_fisher_exact_usable(&self) -> bool {
        self.counters.len() == 2
    }

    /// Expected (majority, outlier) counts under pure noise
    fn expected(&self) -> (usize, usize) {
        let outliers = ((self.noise_probability * self.total as f64) as usize).min(self.total);
        (self.total - outliers, outliers)
    }

    /// Probability of seeing a distribution at least this far from the
    /// noise expectation by chance; 1.0 for a single distinct response
    pub fn p_value(&self) -> f64 {
        if self.counters.len() < 2 {
            return 1.0;
        }

        let (expected_a, expected_b) = self.expected();
        if self.is_fisher_exact_usable() {
            fisher_exact_p_value(
                self.counters[0].count,
                self.counters[1].count,
                expected_a,
                expected_b,
            )
        } else {
            let mut expected = vec![0; self.counters.len()];
            expected[0] = expected_a;
            expected[1] = expected_b;
            let measured: Vec<usize> = self.counters.iter().map(|c| c.count).collect();
            chi_squared_survival(chi_square_data_sets(&expected, &measured))
        }
    }

    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value() < alpha
    }
}

fn ln_factorials(n: usize) -> Vec<f64> {
    let mut table = Vec::with_capacity(n + 1);
    table.push(0.0);
    for k in 1..=n {
        table.push(table[k - 1] + (k as f64).ln());
    }
    table
}

/// Two-sided Fisher exact test of the table `[[a, b], [c, d]]`
pub fn fisher_exact_p_value(a: usize, b: usize, c: usize, d: usize) -> f64 {
    let n = a + b + c + d;
    if n == 0 {
        return 1.0;
    }
    let ln_fact = ln_factorials(n);
    let row_a = a + b;
    let row_c = c + d;
    let column = a + c;

    // hypergeometric probability of the table with `x` in the top left cell
    let ln_p = |x: usize| {
        ln_fact[row_a] + ln_fact[row_c] + ln_fact[column] + ln_fact[n - column]
            - ln_fact[n]
            - ln_fact[x]
            - ln_fact[row_a - x]
            - ln_fact[column - x]
            - ln_fact[row_c + x - column]
    };

    let observed = ln_p(a);
    let low = column.saturating_sub(row_c);
    let high = row_a.min(column);
    let p: f64 = (low..=high)
        .map(ln_p)
        .filter(|ln| *ln <= observed + 1e-7)
        .map(f64::exp)
        .sum();
    p.min(1.0)
}

/// Chi-squared statistic comparing two binned data sets
fn chi_square_data_sets(first: &[usize], second: &[usize]) -> f64 {
    let sum_first: usize = first.iter().sum();
    let sum_second: usize = second.iter().sum();
    let weight = if sum_first != sum_second && sum_first > 0 && sum_second > 0 {
        Some((sum_first as f64 / sum_second as f64).sqrt())
    } else {
        None
    };

    first
        .iter()
        .zip(second)
        .filter(|(x, y)| **x + **y > 0)
        .map(|(&x, &y)| {
            let (x, y) = (x as f64, y as f64);
            let deviation = match weight {
                Some(w) => x / w - y * w,
                None => x - y,
            };
            deviation * deviation / (x + y)
        })
        .sum()
}

/// Upper tail of the chi-squared distribution with one degree of freedom
fn chi_squared_survival(statistic: f64) -> f64 {
    if statistic <= 0.0 {
        return 1.0;
    }
    erfc((statistic / 2.0).sqrt())
}

/// Complementary error function, fractional error below 1.2e-7
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let result = t * poly.exp();
    if x >= 0.0 {
        result
    } else {
        2.0 - result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{MessageObservation, SocketState};

    fn response(alert: u8) -> ResponseVector {
        ResponseVector::new()
            .with_message(MessageObservation::new("Alert", vec![2u8, alert]))
            .with_socket_state(SocketState::Closed)
    }

    fn repeated(counts: &[(u8, usize)]) -> Vec<ResponseVector> {
        counts
            .iter()
            .flat_map(|(alert, count)| std::iter::repeat(response(*alert)).take(*count))
            .collect()
    }

    #[test]
    fn test_fisher_exact_known_tables() {
        // [[5, 5], [10, 0]]: 2 * 252 / 15504
        let p = fisher_exact_p_value(5, 5, 10, 0);
        assert!((p - 0.032_507).abs() < 1e-4, "p = {}", p);

        // [[9, 1], [10, 0]] is as likely as its mirror image
        assert!((fisher_exact_p_value(9, 1, 10, 0) - 1.0).abs() < 1e-9);
        assert!((fisher_exact_p_value(0, 0, 0, 0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_erfc_reference_values() {
        assert!((erfc(0.0) - 1.0).abs() < 1e-6);
        assert!((erfc(1.0) - 0.157_299_2).abs() < 1e-6);
        assert!((erfc(-1.0) - 1.842_700_8).abs() < 1e-6);
        // 3.841 is the 5% critical value with one degree of freedom
        assert!((chi_squared_survival(3.841_459) - 0.05).abs() < 1e-4);
    }

    #[test]
    fn test_counters_are_sorted_by_frequency() {
        let vectors = repeated(&[(20, 2), (51, 5), (10, 1)]);
        let test = DistributionTest::new(&vectors, 0.0);

        let counts: Vec<usize> = test.distinct_responses().iter().map(|c| c.count).collect();
        assert_eq!(counts, vec![5, 2, 1]);
        assert_eq!(test.distinct_responses()[0].vector, &response(51));
        assert!(!test.is_fisher_exact_usable());
    }

    #[test]
    fn test_identical_responses_are_never_significant() {
        let vectors = repeated(&[(20, 10)]);
        let test = DistributionTest::new(&vectors, 0.0);
        assert!((test.p_value() - 1.0).abs() < f64::EPSILON);
        assert!(!test.is_significant(0.05));
    }

    #[test]
    fn test_single_outlier_is_noise() {
        let vectors = repeated(&[(20, 9), (51, 1)]);
        assert!(!DistributionTest::new(&vectors, 0.0).is_significant(0.05));
    }

    #[test]
    fn test_even_split_is_significant() {
        let vectors = repeated(&[(20, 5), (51, 5)]);
        let test = DistributionTest::new(&vectors, 0.0);
        assert!(test.is_fisher_exact_usable());
        assert!(test.is_significant(0.05));

        // the same split is expected when half the responses are noise
        assert!(!DistributionTest::new(&vectors, 0.5).is_significant(0.05));
    }

    #[test]
    fn test_many_distinct_responses_use_chi_squared() {
        // (10 - 4)^2 / 14 + 3 + 3 = 8.57
        let vectors = repeated(&[(20, 4), (51, 3), (10, 3)]);
        let p = DistributionTest::new(&vectors, 0.0).p_value();
        assert!((p - 0.003_415).abs() < 1e-4, "p = {}", p);
    }
}
