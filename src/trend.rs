//! Least-squares trend fitting and the short-horizon kinematic forecast.
//!
//! Points are `(time, price)` pairs, time being epoch milliseconds. Fits are
//! computed over a centred and scaled copy of the basis variable so that
//! epoch-sized inputs stay well conditioned; [`TrendLine::coefficients`]
//! converts back to the caller's basis.

use crate::core::error::TrendError;
use tracing::debug;

const MILLIS_PER_DAY: f64 = 86_400_000.0;
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Shape of the fitted curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendModel {
    /// `y = c0 + c1 x + ... + cd x^d`
    Polynomial { degree: usize },
    /// `y = a + b ln x`, defined for `x > 0` only.
    Logarithmic,
}

impl Default for TrendModel {
    fn default() -> Self {
        TrendModel::Polynomial { degree: 2 }
    }
}

impl TrendModel {
    fn degree(&self) -> usize {
        match self {
            TrendModel::Polynomial { degree } => *degree,
            TrendModel::Logarithmic => 1,
        }
    }

    fn basis(&self, x: f64) -> f64 {
        match self {
            TrendModel::Polynomial { .. } => x,
            TrendModel::Logarithmic => x.ln(),
        }
    }
}

/// A fitted trend.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendLine {
    model: TrendModel,
    center: f64,
    scale: f64,
    // Coefficients over u = (basis(x) - center) / scale, constant term first
    scaled: Vec<f64>,
}

impl TrendLine {
    pub fn fit(points: &[(f64, f64)], model: TrendModel) -> Result<Self, TrendError> {
        let degree = model.degree();
        let needed = degree + 1;
        if points.len() < needed {
            return Err(TrendError::InsufficientPoints {
                needed,
                got: points.len(),
            });
        }

        let mut basis = Vec::with_capacity(points.len());
        for &(x, y) in points {
            if !x.is_finite() || !y.is_finite() {
                return Err(TrendError::InvalidInput(format!(
                    "non-finite point ({x}, {y})"
                )));
            }
            if model == TrendModel::Logarithmic && x <= 0.0 {
                return Err(TrendError::InvalidInput(format!(
                    "logarithmic trend needs x > 0, got {x}"
                )));
            }
            basis.push(model.basis(x));
        }

        let center = basis.iter().sum::<f64>() / basis.len() as f64;
        let spread = basis
            .iter()
            .map(|b| (b - center).abs())
            .fold(0.0_f64, f64::max);
        // All x equal: leave u at zero and let elimination report it
        let scale = if spread > 0.0 { spread } else { 1.0 };

        let mut gram = vec![vec![0.0; needed]; needed];
        let mut rhs = vec![0.0; needed];
        for (b, &(_, y)) in basis.iter().zip(points) {
            let u = (b - center) / scale;
            let powers: Vec<f64> = std::iter::successors(Some(1.0), |p| Some(p * u))
                .take(needed)
                .collect();
            for row in 0..needed {
                rhs[row] += powers[row] * y;
                for col in 0..needed {
                    gram[row][col] += powers[row] * powers[col];
                }
            }
        }

        let scaled = solve(gram, rhs)?;
        debug!("Fitted {:?} trend over {} points", model, points.len());
        Ok(Self {
            model,
            center,
            scale,
            scaled,
        })
    }

    pub fn model(&self) -> TrendModel {
        self.model
    }

    /// Evaluates the trend at `x`. For the logarithmic model `x` must be
    /// positive, otherwise the result is NaN.
    pub fn predict(&self, x: f64) -> f64 {
        let u = (self.model.basis(x) - self.center) / self.scale;
        self.scaled.iter().rev().fold(0.0, |acc, c| acc * u + c)
    }

    /// Coefficients in the unscaled basis (`x` or `ln x`), constant term
    /// first.
    pub fn coefficients(&self) -> Vec<f64> {
        // c_k ((b - m) / s)^k expands to sum_j c_k s^-k C(k, j) b^j (-m)^(k - j)
        let n = self.scaled.len();
        let mut out = vec![0.0; n];
        for (k, c) in self.scaled.iter().enumerate() {
            let factor = c / self.scale.powi(k as i32);
            let mut binomial = 1.0;
            for j in 0..=k {
                out[j] += factor * binomial * (-self.center).powi((k - j) as i32);
                binomial = binomial * (k - j) as f64 / (j + 1) as f64;
            }
        }
        out
    }
}

/// Polynomial least-squares fit of the given degree.
pub fn fit_trend(points: &[(f64, f64)], degree: usize) -> Result<TrendLine, TrendError> {
    TrendLine::fit(points, TrendModel::Polynomial { degree })
}

/// Gaussian elimination with partial pivoting on a square system.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, TrendError> {
    let n = b.len();
    let reference = (0..n).map(|i| a[i][i].abs()).fold(0.0_f64, f64::max);
    if reference == 0.0 {
        return Err(TrendError::Singular);
    }
    let tolerance = reference * SINGULAR_TOLERANCE;

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < tolerance {
            return Err(TrendError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// Average velocity and accumulated acceleration of a smoothed series.
///
/// Velocity is the sum of first differences divided by the number of
/// samples. Acceleration is the plain sum of the differences between
/// consecutive velocities.
pub fn kinematics(smoothed: &[f64]) -> (f64, f64) {
    let n = smoothed.len();
    if n < 2 {
        return (0.0, 0.0);
    }
    let velocities: Vec<f64> = smoothed.windows(2).map(|w| w[1] - w[0]).collect();
    let average_velocity = velocities.iter().sum::<f64>() / n as f64;
    let acceleration = velocities.windows(2).map(|w| w[1] - w[0]).sum();
    (average_velocity, acceleration)
}

/// `value[i] = last + i * (velocity + i * acceleration)` for `i` in
/// `0..horizon`.
pub fn extrapolate(last: f64, velocity: f64, acceleration: f64, horizon: u32) -> Vec<f64> {
    (0..horizon)
        .map(|i| {
            let i = i as f64;
            last + i * (velocity + i * acceleration)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub average_velocity: f64,
    pub acceleration: f64,
    /// Last smoothed value, the anchor of the projection.
    pub last_value: f64,
    /// Number of points that fell inside the horizon window.
    pub recent_points: usize,
    pub values: Vec<f64>,
}

/// Projects `horizon_days` values from the degree-2 trend of `points`,
/// using only points no older than `horizon_days` before `now_millis`.
pub fn forecast(
    points: &[(f64, f64)],
    horizon_days: u32,
    now_millis: f64,
) -> Result<Forecast, TrendError> {
    let trend = TrendLine::fit(points, TrendModel::default())?;

    let cutoff = now_millis - f64::from(horizon_days) * MILLIS_PER_DAY;
    let mut recent: Vec<f64> = points
        .iter()
        .map(|&(t, _)| t)
        .filter(|&t| t >= cutoff)
        .collect();
    if recent.is_empty() {
        return Err(TrendError::NoRecentPoints { horizon_days });
    }
    recent.sort_by(f64::total_cmp);

    let smoothed: Vec<f64> = recent.iter().map(|&t| trend.predict(t)).collect();
    let (average_velocity, acceleration) = kinematics(&smoothed);
    let last_value = smoothed[smoothed.len() - 1];

    debug!(
        "Forecast over {} recent points: v={}, a={}",
        smoothed.len(),
        average_velocity,
        acceleration
    );

    Ok(Forecast {
        average_velocity,
        acceleration,
        last_value,
        recent_points: smoothed.len(),
        values: extrapolate(last_value, average_velocity, acceleration, horizon_days),
    })
}
