//! Analytic, continuous-phase shape functions.
//!
//! Every function takes `cycles = f·t`, the number of waveform periods elapsed
//! since the cursor origin, and returns a value in `[-1, 1]`.

use cadence_core::WaveShape;
use std::f64::consts::TAU;

#[inline]
pub fn sine(cycles: f64) -> f64 {
    (TAU * cycles).sin()
}

/// `sign(sin(2π·cycles))` with `sign(0) = 0`.
#[inline]
pub fn square(cycles: f64) -> f64 {
    let s = sine(cycles);
    if s > 0.0 {
        1.0
    } else if s < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[inline]
pub fn triangle(cycles: f64) -> f64 {
    2.0 * (2.0 * centered_fraction(cycles)).abs() - 1.0
}

#[inline]
pub fn sawtooth(cycles: f64) -> f64 {
    2.0 * centered_fraction(cycles)
}

/// Distance to the nearest whole cycle, in `[-0.5, 0.5)`.
#[inline]
fn centered_fraction(cycles: f64) -> f64 {
    cycles - (cycles + 0.5).floor()
}

#[inline]
pub fn evaluate(shape: WaveShape, cycles: f64) -> f64 {
    match shape {
        WaveShape::Sine => sine(cycles),
        WaveShape::Square => square(cycles),
        WaveShape::Triangle => triangle(cycles),
        WaveShape::Sawtooth => sawtooth(cycles),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sine_landmarks() {
        assert_eq!(sine(0.0), 0.0);
        assert_abs_diff_eq!(sine(0.25), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(sine(0.75), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_square_sign_of_zero_is_zero() {
        assert_eq!(square(0.0), 0.0);
        assert_eq!(square(0.1), 1.0);
        assert_eq!(square(0.6), -1.0);
    }

    #[test]
    fn test_triangle_landmarks() {
        assert_abs_diff_eq!(triangle(0.0), -1.0);
        assert_abs_diff_eq!(triangle(0.25), 0.0);
        assert_abs_diff_eq!(triangle(0.5), 1.0);
        assert_abs_diff_eq!(triangle(0.75), 0.0);
        assert_abs_diff_eq!(triangle(1.0), -1.0);
    }

    #[test]
    fn test_sawtooth_landmarks() {
        assert_abs_diff_eq!(sawtooth(0.0), 0.0);
        assert_abs_diff_eq!(sawtooth(0.25), 0.5);
        assert_abs_diff_eq!(sawtooth(0.5), -1.0);
        assert_abs_diff_eq!(sawtooth(0.75), -0.5);
    }

    #[test]
    fn test_shapes_are_periodic() {
        for shape in WaveShape::ALL {
            for i in 0..16 {
                let x = i as f64 / 16.0 + 0.01;
                assert_abs_diff_eq!(evaluate(shape, x), evaluate(shape, x + 3.0), epsilon = 1e-9);
            }
        }
    }
}
