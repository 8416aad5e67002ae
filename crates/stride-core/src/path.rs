//! Time-parameterized paths
//!
//! A [`Path`] is a time-parameterized trajectory over the configuration
//! space. Steering capabilities produce concrete [`SteeredSegment`]s;
//! the planner composes them into a [`PathVector`], which supports
//! extraction by time interval and concatenation, and is itself a path.
//!
//! Evaluating a path at a parameter can fail (a projection issue in the
//! underlying representation); `eval` returns `None` in that case and
//! callers degrade to their previous best result.

use std::sync::Arc;

use nalgebra::Quaternion;
use thiserror::Error;

use crate::math::{heading_from_direction, quat_from_heading};
use crate::{Configuration, Quat};

/// Maximum endpoint gap tolerated when composing sub-paths.
pub const CONTINUITY_EPS: f64 = 1e-6;

/// Errors from path composition and extraction.
#[derive(Debug, Error)]
pub enum PathError {
    /// A configuration at the given parameter could not be evaluated.
    #[error("configuration at parameter {t} could not be evaluated")]
    Projection { t: f64 },
    /// Consecutive sub-paths do not share an endpoint.
    #[error("sub-path endpoints mismatch at concatenation (gap {gap})")]
    Composition { gap: f64 },
}

/// A time-parameterized trajectory over the configuration space.
pub trait Path: Send + Sync {
    /// Start and end parameters.
    fn time_range(&self) -> (f64, f64);

    /// Configuration at the start parameter.
    fn initial(&self) -> Configuration;

    /// Configuration at the end parameter.
    fn end(&self) -> Configuration;

    /// Configuration at parameter `t`, or `None` on a projection
    /// failure. Parameters outside the range are clamped.
    fn eval(&self, t: f64) -> Option<Configuration>;

    /// Length under the metric the path was built with.
    fn length(&self) -> f64;

    /// Heading-aligned copy of this path, when the representation
    /// supports one. The copy's root orientations follow the direction
    /// of travel; its endpoints may therefore differ from the original
    /// in orientation.
    fn oriented_copy(&self) -> Option<Arc<dyn Path>> {
        None
    }

    fn duration(&self) -> f64 {
        let (a, b) = self.time_range();
        b - a
    }
}

fn root_quat(c: &Configuration) -> Option<Quat> {
    if c.len() < 7 {
        return None;
    }
    let q = Quaternion::new(c[3], c[4], c[5], c[6]);
    if q.norm() < 1e-12 {
        return None;
    }
    Some(Quat::from_quaternion(q))
}

fn set_root_quat(c: &mut Configuration, q: &Quat) {
    c[3] = q.w;
    c[4] = q.i;
    c[5] = q.j;
    c[6] = q.k;
}

/// Concrete path produced by a steering capability: a sequence of
/// time-stamped knot configurations, interpolated linearly (with
/// spherical interpolation for the root orientation).
#[derive(Debug, Clone)]
pub struct SteeredSegment {
    knots: Vec<(f64, Configuration)>,
    length: f64,
    oriented: bool,
}

impl SteeredSegment {
    /// Segment through the given knots. Knot times must be
    /// non-decreasing; `length` is the kinodynamic length reported by
    /// the steering method.
    pub fn from_knots(knots: Vec<(f64, Configuration)>, length: f64) -> Self {
        debug_assert!(!knots.is_empty());
        debug_assert!(knots.windows(2).all(|w| w[0].0 <= w[1].0));
        Self {
            knots,
            length,
            oriented: false,
        }
    }

    /// Two-knot segment from `q1` to `q2` over `duration`.
    pub fn direct(q1: Configuration, q2: Configuration, duration: f64, length: f64) -> Self {
        Self::from_knots(vec![(0.0, q1), (duration, q2)], length)
    }

    pub fn is_oriented(&self) -> bool {
        self.oriented
    }

    pub fn knots(&self) -> &[(f64, Configuration)] {
        &self.knots
    }
}

impl Path for SteeredSegment {
    fn time_range(&self) -> (f64, f64) {
        (
            self.knots.first().map(|k| k.0).unwrap_or(0.0),
            self.knots.last().map(|k| k.0).unwrap_or(0.0),
        )
    }

    fn initial(&self) -> Configuration {
        self.knots
            .first()
            .map(|k| k.1.clone())
            .unwrap_or_else(|| Configuration::zeros(0))
    }

    fn end(&self) -> Configuration {
        self.knots
            .last()
            .map(|k| k.1.clone())
            .unwrap_or_else(|| Configuration::zeros(0))
    }

    fn eval(&self, t: f64) -> Option<Configuration> {
        let (start, end) = self.time_range();
        let t = t.clamp(start, end);
        if self.knots.len() == 1 {
            return Some(self.knots[0].1.clone());
        }
        let idx = self
            .knots
            .iter()
            .position(|(time, _)| *time > t)
            .unwrap_or(self.knots.len() - 1)
            .saturating_sub(1)
            .min(self.knots.len() - 2);

        let (t0, q0) = &self.knots[idx];
        let (t1, q1) = &self.knots[idx + 1];
        let span = t1 - t0;
        let alpha = if span > 1e-12 { (t - t0) / span } else { 0.0 };

        let mut out = q0 * (1.0 - alpha) + q1 * alpha;
        // Root orientation interpolates on the sphere, not componentwise.
        if let (Some(r0), Some(r1)) = (root_quat(q0), root_quat(q1)) {
            set_root_quat(&mut out, &r0.slerp(&r1, alpha));
        }
        Some(out)
    }

    fn length(&self) -> f64 {
        self.length
    }

    fn oriented_copy(&self) -> Option<Arc<dyn Path>> {
        let n = self.knots.len();
        if n == 0 || self.knots[0].1.len() < 7 {
            return None;
        }
        let mut knots = self.knots.clone();
        if n >= 2 {
            for i in 0..n {
                let dir = if i + 1 < n {
                    let next = &self.knots[i + 1].1;
                    let here = &self.knots[i].1;
                    crate::Vec3::new(next[0] - here[0], next[1] - here[1], next[2] - here[2])
                } else {
                    let here = &self.knots[n - 1].1;
                    let prev = &self.knots[n - 2].1;
                    crate::Vec3::new(here[0] - prev[0], here[1] - prev[1], here[2] - prev[2])
                };
                // Vertical or stationary motion keeps its orientation.
                if let Some(yaw) = heading_from_direction(&dir) {
                    set_root_quat(&mut knots[i].1, &quat_from_heading(yaw));
                }
            }
        }
        Some(Arc::new(SteeredSegment {
            knots,
            length: self.length,
            oriented: true,
        }))
    }
}

/// Time-offset view over a portion of another path, created by
/// [`PathVector::extract`]. The boundary configurations are evaluated
/// eagerly so construction surfaces projection failures.
pub struct ExtractedSegment {
    inner: Arc<dyn Path>,
    start: f64,
    end: f64,
    initial: Configuration,
    last: Configuration,
    length: f64,
}

impl ExtractedSegment {
    /// View of `inner` over `[start, end]` (in `inner`'s parameters).
    pub fn new(inner: Arc<dyn Path>, start: f64, end: f64) -> Result<Self, PathError> {
        let (a, b) = inner.time_range();
        let start = start.clamp(a, b);
        let end = end.clamp(start, b);
        let initial = inner
            .eval(start)
            .ok_or(PathError::Projection { t: start })?;
        let last = inner.eval(end).ok_or(PathError::Projection { t: end })?;
        let span = b - a;
        // Length scales with the extracted fraction of the parent.
        let length = if span > 1e-12 {
            inner.length() * (end - start) / span
        } else {
            0.0
        };
        Ok(Self {
            inner,
            start,
            end,
            initial,
            last,
            length,
        })
    }
}

impl Path for ExtractedSegment {
    fn time_range(&self) -> (f64, f64) {
        (0.0, self.end - self.start)
    }

    fn initial(&self) -> Configuration {
        self.initial.clone()
    }

    fn end(&self) -> Configuration {
        self.last.clone()
    }

    fn eval(&self, t: f64) -> Option<Configuration> {
        let t = t.clamp(0.0, self.end - self.start);
        self.inner.eval(self.start + t)
    }

    fn length(&self) -> f64 {
        self.length
    }
}

/// Ordered, time-parameterized sequence of sub-paths.
///
/// Owned by the optimizer call that produced it; read-only once
/// returned. Composition enforces endpoint continuity within
/// [`CONTINUITY_EPS`].
#[derive(Clone, Default)]
pub struct PathVector {
    paths: Vec<Arc<dyn Path>>,
}

impl std::fmt::Debug for PathVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathVector")
            .field("sub_paths", &self.paths.len())
            .field("duration", &self.duration())
            .field("length", &self.total_length())
            .finish()
    }
}

impl PathVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: Arc<dyn Path>) -> Self {
        Self { paths: vec![path] }
    }

    pub fn sub_path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn path_at(&self, rank: usize) -> Option<&Arc<dyn Path>> {
        self.paths.get(rank)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Path>> {
        self.paths.iter()
    }

    /// Append a sub-path; its initial configuration must match the
    /// current end.
    pub fn append(&mut self, path: Arc<dyn Path>) -> Result<(), PathError> {
        if let Some(last) = self.paths.last() {
            let end = last.end();
            let next = path.initial();
            if end.len() != next.len() {
                return Err(PathError::Composition { gap: f64::INFINITY });
            }
            let gap = (end - next).norm();
            if gap > CONTINUITY_EPS {
                return Err(PathError::Composition { gap });
            }
        }
        self.paths.push(path);
        Ok(())
    }

    /// Append every sub-path of `other`.
    pub fn concatenate(&mut self, other: &PathVector) -> Result<(), PathError> {
        for path in &other.paths {
            self.append(path.clone())?;
        }
        Ok(())
    }

    /// Sum of sub-path lengths.
    pub fn total_length(&self) -> f64 {
        self.paths.iter().map(|p| p.length()).sum()
    }

    /// Sub-path over the time interval `[start, end]` (in this
    /// vector's parameters). Sub-paths fully covered are shared;
    /// partially covered ones are wrapped in a time-offset view.
    pub fn extract(&self, start: f64, end: f64) -> Result<PathVector, PathError> {
        let (_, total) = self.time_range();
        let start = start.clamp(0.0, total);
        let end = end.clamp(start, total);

        let mut out = PathVector::new();
        let mut cum = 0.0;
        for path in &self.paths {
            let d = path.duration();
            let lo = start.max(cum);
            let hi = end.min(cum + d);
            if hi > lo {
                let (a, _) = path.time_range();
                if lo <= cum + 1e-12 && hi >= cum + d - 1e-12 {
                    out.append(path.clone())?;
                } else {
                    let view =
                        ExtractedSegment::new(path.clone(), a + (lo - cum), a + (hi - cum))?;
                    out.append(Arc::new(view))?;
                }
            }
            cum += d;
        }

        if out.paths.is_empty() {
            // Degenerate interval: a single point on the containing
            // sub-path.
            let mut cum = 0.0;
            for (idx, path) in self.paths.iter().enumerate() {
                let d = path.duration();
                if start <= cum + d || idx == self.paths.len() - 1 {
                    let (a, _) = path.time_range();
                    let local = a + (start - cum).clamp(0.0, d);
                    let view = ExtractedSegment::new(path.clone(), local, local)?;
                    out.append(Arc::new(view))?;
                    break;
                }
                cum += d;
            }
        }
        Ok(out)
    }
}

impl Path for PathVector {
    fn time_range(&self) -> (f64, f64) {
        (0.0, self.paths.iter().map(|p| p.duration()).sum())
    }

    fn initial(&self) -> Configuration {
        self.paths
            .first()
            .map(|p| p.initial())
            .unwrap_or_else(|| Configuration::zeros(0))
    }

    fn end(&self) -> Configuration {
        self.paths
            .last()
            .map(|p| p.end())
            .unwrap_or_else(|| Configuration::zeros(0))
    }

    fn eval(&self, t: f64) -> Option<Configuration> {
        if self.paths.is_empty() {
            return None;
        }
        let (_, total) = self.time_range();
        let t = t.clamp(0.0, total);
        let mut cum = 0.0;
        for (idx, path) in self.paths.iter().enumerate() {
            let d = path.duration();
            if t <= cum + d || idx == self.paths.len() - 1 {
                let (a, _) = path.time_range();
                return path.eval(a + (t - cum).clamp(0.0, d));
            }
            cum += d;
        }
        None
    }

    fn length(&self) -> f64 {
        self.total_length()
    }
}
