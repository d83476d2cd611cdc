//! Special functions behind the p-values.
//!
//! Iterative routines stop after [`MAX_ITERATIONS`] or once a step changes the
//! result by less than [`EPSILON`]. A routine that runs out of iterations
//! returns its current estimate without signalling.

use std::f64::consts::{PI, SQRT_2};

pub const MAX_ITERATIONS: usize = 200;
pub const EPSILON: f64 = 1e-14;
/// Floor on Lentz denominators.
const TINY: f64 = 1e-30;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Error function approximation (Abramowitz & Stegun 7.1.26, max error ~1.5e-7)
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    sign * (1.0 - erfc_abs(x.abs()))
}

/// 1 - erf(|x|) from the same rational approximation, without cancellation.
fn erfc_abs(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;
    let t = 1.0 / (1.0 + p * x);
    (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp()
}

/// Standard normal CDF: Φ(z) = 0.5 * (1 + erf(z / sqrt(2)))
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / SQRT_2))
}

/// Two-sided normal tail probability 2 * (1 - Φ(|z|)).
pub fn normal_two_sided_p(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    erfc_abs(z.abs() / SQRT_2).clamp(0.0, 1.0)
}

/// ln Γ(x) via Lanczos (g = 7, nine coefficients), with reflection below 0.5.
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        return PI.ln() - (PI * x).sin().abs().ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let series = LANCZOS_COEFFS[1..]
        .iter()
        .enumerate()
        .fold(LANCZOS_COEFFS[0], |acc, (i, c)| acc + c / (x + i as f64 + 1.0));
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

/// Regularized incomplete beta I_x(a, b).
///
/// Evaluates the continued fraction directly when x < (a+1)/(a+b+2) and
/// through the symmetry I_x(a,b) = 1 - I_{1-x}(b,a) otherwise.
pub fn incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x.is_nan() || a <= 0.0 || b <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = a * x.ln() + b * (1.0 - x).ln() - ln_beta(a, b);
    if x < (a + 1.0) / (a + b + 2.0) {
        ln_front.exp() * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - ln_front.exp() * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

fn floor_tiny(v: f64) -> f64 {
    if v.abs() < TINY {
        TINY
    } else {
        v
    }
}

/// Modified Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    let mut c = 1.0;
    let mut d = 1.0 / floor_tiny(1.0 - (a + b) * x / (a + 1.0));
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let two_m = 2.0 * m;

        let even = m * (b - m) * x / ((a + two_m - 1.0) * (a + two_m));
        d = 1.0 / floor_tiny(1.0 + even * d);
        c = floor_tiny(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (a + b + m) * x / ((a + two_m) * (a + two_m + 1.0));
        d = 1.0 / floor_tiny(1.0 + odd * d);
        c = floor_tiny(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPSILON {
            return h;
        }
    }
    log::trace!("incomplete beta did not converge (x={}, a={}, b={})", x, a, b);
    h
}

/// Regularized lower incomplete gamma P(s, x).
pub fn incomplete_gamma_lower(s: f64, x: f64) -> f64 {
    if x.is_nan() || s <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 0.0;
    }
    if x < s + 1.0 {
        gamma_series(s, x)
    } else {
        1.0 - gamma_continued_fraction(s, x)
    }
}

/// Series for P(s, x), used below x = s + 1.
fn gamma_series(s: f64, x: f64) -> f64 {
    let mut term = 1.0 / s;
    let mut sum = term;
    for n in 1..=MAX_ITERATIONS {
        term *= x / (s + n as f64);
        sum += term;
        if term.abs() < sum.abs() * EPSILON {
            break;
        }
    }
    sum * (s * x.ln() - x - ln_gamma(s)).exp()
}

/// Lentz continued fraction for Q(s, x) = 1 - P(s, x).
fn gamma_continued_fraction(s: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - s;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / floor_tiny(b);
    let mut h = d;

    for i in 1..=MAX_ITERATIONS {
        let i = i as f64;
        let an = -i * (i - s);
        b += 2.0;
        d = 1.0 / floor_tiny(an * d + b);
        c = floor_tiny(b + an / c);
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    h * (s * x.ln() - x - ln_gamma(s)).exp()
}

/// Two-sided Student-t p-value: P(|T| >= |t|) = I_{df/(df+t²)}(df/2, 1/2).
pub fn student_t_two_sided_p(t: f64, df: f64) -> f64 {
    if t.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    let x = df / (df + t * t);
    incomplete_beta(x, df / 2.0, 0.5).clamp(0.0, 1.0)
}

/// Chi-square upper tail: 1 - P(dof/2, stat/2).
pub fn chi_square_sf(stat: f64, dof: f64) -> f64 {
    if stat.is_nan() || dof <= 0.0 {
        return f64::NAN;
    }
    if stat <= 0.0 {
        return 1.0;
    }
    (1.0 - incomplete_gamma_lower(dof / 2.0, stat / 2.0)).clamp(0.0, 1.0)
}
