// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Complex sample type shared by the filter and the discriminator.
//!
//! Samples are `num_complex::Complex<f64>`, the same type `rustfft`
//! transforms in place, so filter blocks never need converting.

pub type Complex = num_complex::Complex<f64>;

/// Magnitude helpers under the names the demodulator uses.
pub trait ComplexExt {
    fn magnitude(&self) -> f64;
    fn magnitude_squared(&self) -> f64;
}

impl ComplexExt for Complex {
    #[inline]
    fn magnitude(&self) -> f64 {
        self.magnitude_squared().sqrt()
    }

    #[inline]
    fn magnitude_squared(&self) -> f64 {
        self.re * self.re + self.im * self.im
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_complex_eq(a: Complex, b: Complex, tol: f64) {
        assert!(
            (a.re - b.re).abs() <= tol && (a.im - b.im).abs() <= tol,
            "expected {} ~ {} (tol {})",
            a,
            b,
            tol
        );
    }

    #[test]
    fn mul_then_div_round_trips() {
        let a = Complex::new(3.5, -1.25);
        for b in [
            Complex::new(2.0, 0.5),
            Complex::new(-0.001, 7.0),
            Complex::new(1e6, -1e-3),
        ] {
            assert_complex_eq((a * b) / b, a, 1e-9);
        }
    }

    #[test]
    fn add_negation_is_zero() {
        let a = Complex::new(-12.0, 0.75);
        assert_eq!(a + (-a), Complex::new(0.0, 0.0));
        assert_eq!(a - a, Complex::new(0.0, 0.0));
    }

    #[test]
    fn scalar_ops() {
        let mut a = Complex::new(2.0, -4.0);
        assert_eq!(a * 0.5, Complex::new(1.0, -2.0));
        assert_eq!(a / 2.0, Complex::new(1.0, -2.0));
        a *= 3.0;
        assert_eq!(a, Complex::new(6.0, -12.0));
        a /= 6.0;
        assert_eq!(a, Complex::new(1.0, -2.0));
    }

    #[test]
    fn complex_division_formula() {
        // (1 + 2i) / (3 + 4i) = (11 + 2i) / 25
        let q = Complex::new(1.0, 2.0) / Complex::new(3.0, 4.0);
        assert_complex_eq(q, Complex::new(11.0 / 25.0, 2.0 / 25.0), 1e-12);
    }

    #[test]
    fn magnitude() {
        let a = Complex::new(3.0, -4.0);
        assert_eq!(a.magnitude_squared(), 25.0);
        assert_eq!(a.magnitude(), 5.0);
        assert_eq!(Complex::new(0.0, 0.0).magnitude(), 0.0);
    }
}
