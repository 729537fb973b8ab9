// THEORY:
// The trace of a single carrier is a hump; its peak column is the carrier's
// position on the frequency axis. A least-squares parabola over every trace
// pixel locates that column with sub-pixel precision and is insensitive to the
// ragged pixel outline of the hump.
//
// The normal equations are built in mean-centred x so that the x^4 sums stay
// small for wide frames, then mapped back to frame coordinates.
//
// Two failure modes are reported instead of producing garbage:
// - fewer than three distinct columns cannot determine three coefficients;
// - a near-zero curvature puts the vertex at (or beyond) infinity.

use crate::core_modules::contour::Point;
use thiserror::Error;

const SINGULAR_PIVOT: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FitError {
    #[error("need at least 3 distinct columns to fit a parabola, got {distinct_columns}")]
    InsufficientData { distinct_columns: usize },
    #[error("fit is degenerate (curvature {curvature:e})")]
    Degenerate { curvature: f64 },
    #[error("fit produced a non-finite peak")]
    NonFinite,
}

/// `y = a*x^2 + b*x + c` in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parabola {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Parabola {
    pub fn vertex_x(&self) -> f64 {
        -self.b / (2.0 * self.a)
    }

    pub fn eval(&self, x: f64) -> f64 {
        (self.a * x + self.b) * x + self.c
    }
}

/// Fits a parabola to `points` (x = column, y = row). Fails when the data
/// cannot pin down three coefficients or when `|a| < min_curvature`.
pub fn fit_parabola(points: &[Point], min_curvature: f64) -> Result<Parabola, FitError> {
    let mut columns: Vec<i32> = points.iter().map(|p| p.x).collect();
    columns.sort_unstable();
    columns.dedup();
    if columns.len() < 3 {
        return Err(FitError::InsufficientData { distinct_columns: columns.len() });
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| f64::from(p.x)).sum::<f64>() / n;

    let mut s = [0.0f64; 5];
    let mut t = [0.0f64; 3];
    for p in points {
        let u = f64::from(p.x) - mean_x;
        let y = f64::from(p.y);
        let mut power = 1.0;
        for (k, sum) in s.iter_mut().enumerate() {
            *sum += power;
            if k < 3 {
                t[k] += power * y;
            }
            power *= u;
        }
    }

    let system = [
        [s[4], s[3], s[2], t[2]],
        [s[3], s[2], s[1], t[1]],
        [s[2], s[1], s[0], t[0]],
    ];
    let [a, b_centered, c_centered] =
        solve3(system).ok_or(FitError::Degenerate { curvature: 0.0 })?;

    if !a.is_finite() || a.abs() < min_curvature {
        return Err(FitError::Degenerate { curvature: a });
    }

    let parabola = Parabola {
        a,
        b: b_centered - 2.0 * a * mean_x,
        c: a * mean_x * mean_x - b_centered * mean_x + c_centered,
    };
    if !parabola.vertex_x().is_finite() {
        return Err(FitError::NonFinite);
    }
    Ok(parabola)
}

/// Gaussian elimination with partial pivoting on an augmented 3x3 system.
fn solve3(mut m: [[f64; 4]; 3]) -> Option<[f64; 3]> {
    let scale = m.iter().flat_map(|row| row[..3].iter()).fold(0.0f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 {
        return None;
    }

    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        if m[pivot][col].abs() <= SINGULAR_PIVOT * scale {
            return None;
        }
        m.swap(col, pivot);
        for row in col + 1..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| m[row][k] * x[k]).sum();
        x[row] = (m[row][3] - tail) / m[row][row];
    }
    Some(x)
}
