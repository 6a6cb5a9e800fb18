use crate::store::TrajectoryStore;
use log::{debug, warn};
use multipac_common::{AnalysisError, AnalysisResult, FitConfig, GrowthMetrics, PopulationPoint};

/// Electron count versus time, derived from the trajectory store.
/// Sampled at the union of all distinct sample times of the run, not a
/// fixed grid, to avoid aliasing with the simulation timestep.
pub struct PopulationSeries {
    points: Vec<PopulationPoint>,
}

impl PopulationSeries {
    pub fn from_store(store: &TrajectoryStore) -> Self {
        let mut times: Vec<f64> = store
            .particles()
            .flat_map(|p| p.samples().iter().map(|s| s.time))
            .collect();
        times.sort_by(f64::total_cmp);
        times.dedup();

        let points = times
            .into_iter()
            .map(|time| PopulationPoint {
                time,
                count: store.count_alive_at(time),
            })
            .collect();
        PopulationSeries { points }
    }

    /// Builds a series directly from points (synthetic data, external
    /// population exports).
    pub fn from_points(points: Vec<PopulationPoint>) -> Self {
        PopulationSeries { points }
    }

    pub fn points(&self) -> &[PopulationPoint] {
        &self.points
    }

    /// Least-squares fit of ln(count) versus time over the
    /// auto-detected growth region, plus multipactor order detection.
    ///
    /// The growth region is the longest contiguous span of nonzero
    /// counts whose local slope of ln(count) stays above
    /// `-slope_tolerance`. Spans shorter than `min_window` samples are
    /// rejected; if none survives, the population decayed immediately
    /// and the run is reported as "no multipactor" via
    /// `InsufficientData`.
    pub fn fit_growth(&self, config: &FitConfig) -> AnalysisResult<GrowthMetrics> {
        let mut points: &[PopulationPoint] = &self.points;
        if config.trim_trailing {
            let last_alive = points.iter().rposition(|p| p.count > 0);
            points = match last_alive {
                Some(idx) => &points[..=idx],
                None => &[],
            };
        }
        if points.is_empty() {
            return Err(AnalysisError::InsufficientData {
                reason: "population series is empty".to_string(),
            });
        }

        // Contiguous runs of nonzero counts; zero counts break a run
        // (ln is undefined there and the discharge died in between).
        let runs = positive_runs(points);

        let mut best: Option<Candidate> = None;
        for run in runs {
            let times: Vec<f64> = run.iter().map(|p| p.time).collect();
            let ln_raw: Vec<f64> = run.iter().map(|p| (p.count as f64).ln()).collect();

            let smoothed = if config.running_mean {
                let width = period_width(&times, config.rf_period_ns);
                if width < 5 {
                    warn!(
                        "Running-mean width is only {} points per RF period; \
                         check that rf_period_ns and the record times use the same units.",
                        width
                    );
                }
                running_mean(&ln_raw, width)
            } else {
                ln_raw.clone()
            };

            // Longest sub-span whose local slope stays above -tolerance.
            let mut span_start = 0;
            for i in 0..times.len() {
                let close_here = if i + 1 < times.len() {
                    let slope = (smoothed[i + 1] - smoothed[i]) / (times[i + 1] - times[i]);
                    slope < -config.slope_tolerance
                } else {
                    true // Close the final span at the end of the run.
                };
                if close_here {
                    let len = i + 1 - span_start;
                    if len >= config.min_window
                        && best.as_ref().map_or(true, |b| len > b.len())
                    {
                        best = Some(Candidate {
                            times: times[span_start..=i].to_vec(),
                            ln_raw: ln_raw[span_start..=i].to_vec(),
                            smoothed: smoothed[span_start..=i].to_vec(),
                        });
                    }
                    span_start = i + 1;
                }
            }
        }

        let candidate = best.ok_or_else(|| AnalysisError::InsufficientData {
            reason: format!(
                "no contiguous growth region of at least {} samples",
                config.min_window
            ),
        })?;

        let (rate, intercept) = least_squares(&candidate.times, &candidate.smoothed);
        let residual = rms_residual(&candidate.times, &candidate.smoothed, rate, intercept);
        let region = (
            candidate.times[0],
            candidate.times[candidate.times.len() - 1],
        );
        debug!(
            "Growth fit: rate {:.4e} 1/ns, intercept {:.3}, residual {:.3e}, region [{:.3}, {:.3}] ns",
            rate, intercept, residual, region.0, region.1
        );

        // Periodicity rides on the raw (unsmoothed) log-residuals.
        let order = detect_order(&candidate.times, &candidate.ln_raw, rate, intercept, config);

        Ok(GrowthMetrics {
            rate,
            intercept,
            residual,
            region,
            order,
        })
    }
}

struct Candidate {
    times: Vec<f64>,
    ln_raw: Vec<f64>,
    smoothed: Vec<f64>,
}

impl Candidate {
    fn len(&self) -> usize {
        self.times.len()
    }
}

fn positive_runs(points: &[PopulationPoint]) -> Vec<&[PopulationPoint]> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (i, p) in points.iter().enumerate() {
        if p.count > 0 {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            runs.push(&points[s..i]);
        }
    }
    if let Some(s) = start {
        runs.push(&points[s..]);
    }
    runs
}

/// Number of consecutive points spanning one RF period at the start of
/// the run, used as the running-mean window.
fn period_width(times: &[f64], rf_period_ns: f64) -> usize {
    let limit = times[0] + rf_period_ns;
    times.partition_point(|&t| t < limit).max(1)
}

/// Centered moving average with edge clamping.
fn running_mean(values: &[f64], width: usize) -> Vec<f64> {
    let n = values.len();
    let half = width / 2;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

/// Closed-form least squares of y against x, returns (slope, intercept).
fn least_squares(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len() as f64;
    let sx: f64 = x.iter().sum();
    let sy: f64 = y.iter().sum();
    let sxx: f64 = x.iter().map(|v| v * v).sum();
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let denom = n * sxx - sx * sx;
    // Times are strictly increasing, so denom is nonzero for n >= 2.
    let slope = (n * sxy - sx * sy) / denom;
    let intercept = (sy - slope * sx) / n;
    (slope, intercept)
}

fn rms_residual(x: &[f64], y: &[f64], slope: f64, intercept: f64) -> f64 {
    let n = x.len() as f64;
    let ss: f64 = x
        .iter()
        .zip(y)
        .map(|(a, b)| {
            let r = b - (intercept + slope * a);
            r * r
        })
        .sum();
    (ss / n).sqrt()
}

/// Points per half RF period on the autocorrelation grid.
const GRID_PER_HALF_PERIOD: usize = 8;

/// Detects the multipactor order: the smallest integer k such that the
/// log-residual oscillation repeats every k RF half-periods.
///
/// The exponential trend is removed first (residual = ln(count) minus
/// the fitted line), the residual is resampled on a uniform grid and
/// autocorrelated at lags of whole half-periods. A lag counts as the
/// resonance when its correlation exceeds the configured threshold and
/// peaks against the neighboring quarter-period lags. A monotonic
/// single-burst series has a flat residual and reports no order rather
/// than a guess.
fn detect_order(
    times: &[f64],
    ln_raw: &[f64],
    rate: f64,
    intercept: f64,
    config: &FitConfig,
) -> Option<u32> {
    let dt = config.rf_period_ns / (2 * GRID_PER_HALF_PERIOD) as f64;
    let t0 = times[0];
    let t1 = times[times.len() - 1];
    let n = ((t1 - t0) / dt).floor() as usize + 1;
    // Need room for at least one full period plus the peak comparison.
    if n < 3 * GRID_PER_HALF_PERIOD {
        return None;
    }

    // Uniformly resampled, mean-removed log-residual.
    let mut grid: Vec<f64> = (0..n)
        .map(|i| {
            let t = t0 + i as f64 * dt;
            interpolate(times, ln_raw, t) - (intercept + rate * t)
        })
        .collect();
    let mean = grid.iter().sum::<f64>() / n as f64;
    for v in &mut grid {
        *v -= mean;
    }

    let variance = grid.iter().map(|v| v * v).sum::<f64>() / n as f64;
    if variance < 1e-12 {
        return None;
    }

    let corr = |lag: usize| -> f64 {
        let m = n - lag;
        let num: f64 = (0..m).map(|i| grid[i] * grid[i + lag]).sum::<f64>() / m as f64;
        num / variance
    };

    let quarter = GRID_PER_HALF_PERIOD / 2;
    for k in 1..=config.max_order {
        let lag = k as usize * GRID_PER_HALF_PERIOD;
        if lag + quarter >= n {
            break;
        }
        let c = corr(lag);
        if c >= config.order_threshold && c > corr(lag - quarter) && c > corr(lag + quarter) {
            debug!("Order detection: k = {} with autocorrelation {:.3}", k, c);
            return Some(k);
        }
    }
    None
}

/// Linear interpolation of y(x) at `at`, clamped to the data range.
fn interpolate(x: &[f64], y: &[f64], at: f64) -> f64 {
    match x.partition_point(|&v| v < at) {
        0 => y[0],
        idx if idx >= x.len() => y[y.len() - 1],
        idx => {
            let frac = (at - x[idx - 1]) / (x[idx] - x[idx - 1]);
            y[idx - 1] + frac * (y[idx] - y[idx - 1])
        }
    }
}
