use std::f64::consts::{PI, SQRT_2};

use nest_core::errors::ErrorInfo;
use nest_core::{wrap_half_period, NestError, NestResult};
use serde::{Deserialize, Serialize};
use statrs::function::erf::{erf, erf_inv, erfc};

/// Gauss priors clamp the inverse map at this many standard deviations.
const GAUSS_CLAMP: f64 = 8.5;

/// Shape of a prior distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PriorKind {
    /// Flat density between the limits.
    Uniform,
    /// Flat in `ln(x)` between positive limits.
    Jeffreys,
    /// Normal density.
    Gauss {
        /// Location of the peak.
        center: f64,
        /// Standard deviation.
        scale: f64,
    },
    /// Exponential density on `[0, inf)`.
    Exponential {
        /// Mean of the distribution.
        scale: f64,
    },
    /// Double exponential density.
    Laplace {
        /// Location of the peak.
        center: f64,
        /// Scale of the exponential tails.
        scale: f64,
    },
    /// Lorentzian density.
    Cauchy {
        /// Location of the peak.
        center: f64,
        /// Half width at half maximum.
        scale: f64,
    },
}

/// Prior on a single parameter: a monotone map between `[0, 1]` and the
/// parameter domain plus the matching density.
///
/// A prior restricted to a sub-domain keeps its shape; the unit interval is
/// mapped onto the base unit range of the limits (the limited integral), so
/// uniform unit draws stay correctly distributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prior {
    kind: PriorKind,
    limits: Option<[f64; 2]>,
    period: Option<f64>,
    unit_lo: f64,
    unit_range: f64,
}

fn check_scale(scale: f64) -> NestResult<()> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(NestError::Config(
            ErrorInfo::new("prior-scale", "prior scale must be positive and finite")
                .with_context("scale", scale),
        ))
    }
}

impl Prior {
    fn unlimited(kind: PriorKind) -> Self {
        Self {
            kind,
            limits: None,
            period: None,
            unit_lo: 0.0,
            unit_range: 1.0,
        }
    }

    /// Uniform prior on `[lo, hi]`.
    pub fn uniform(lo: f64, hi: f64) -> NestResult<Self> {
        check_limits(lo, hi)?;
        Ok(Self {
            limits: Some([lo, hi]),
            ..Self::unlimited(PriorKind::Uniform)
        })
    }

    /// Jeffreys (log-uniform) prior on `[lo, hi]` with `0 < lo`.
    pub fn jeffreys(lo: f64, hi: f64) -> NestResult<Self> {
        check_limits(lo, hi)?;
        if lo <= 0.0 {
            return Err(NestError::Config(
                ErrorInfo::new("jeffreys-limits", "Jeffreys prior needs a positive lower limit")
                    .with_context("lo", lo),
            ));
        }
        Ok(Self {
            limits: Some([lo, hi]),
            ..Self::unlimited(PriorKind::Jeffreys)
        })
    }

    /// Gaussian prior.
    pub fn gauss(center: f64, scale: f64) -> NestResult<Self> {
        check_scale(scale)?;
        Ok(Self::unlimited(PriorKind::Gauss { center, scale }))
    }

    /// Exponential prior on the positive half line.
    pub fn exponential(scale: f64) -> NestResult<Self> {
        check_scale(scale)?;
        Ok(Self::unlimited(PriorKind::Exponential { scale }))
    }

    /// Laplace prior.
    pub fn laplace(center: f64, scale: f64) -> NestResult<Self> {
        check_scale(scale)?;
        Ok(Self::unlimited(PriorKind::Laplace { center, scale }))
    }

    /// Cauchy prior.
    pub fn cauchy(center: f64, scale: f64) -> NestResult<Self> {
        check_scale(scale)?;
        Ok(Self::unlimited(PriorKind::Cauchy { center, scale }))
    }

    /// Restricts the prior to `[lo, hi]`, precomputing the limited integral.
    pub fn with_limits(self, lo: f64, hi: f64) -> NestResult<Self> {
        check_limits(lo, hi)?;
        match self.kind {
            PriorKind::Uniform => Self::uniform(lo, hi).map(|p| p.keep_period(self.period)),
            PriorKind::Jeffreys => Self::jeffreys(lo, hi).map(|p| p.keep_period(self.period)),
            _ => {
                let base = Self::unlimited(self.kind);
                let unit_lo = base.base_domain_to_unit(lo);
                let unit_hi = base.base_domain_to_unit(hi);
                let unit_range = unit_hi - unit_lo;
                if !(unit_range > 0.0) {
                    return Err(NestError::Config(
                        ErrorInfo::new("prior-limits", "limits enclose no prior mass")
                            .with_context("lo", lo)
                            .with_context("hi", hi),
                    ));
                }
                Ok(Self {
                    kind: self.kind,
                    limits: Some([lo, hi]),
                    period: self.period,
                    unit_lo,
                    unit_range,
                })
            }
        }
    }

    /// Marks the prior circular with the given period.
    pub fn circular(mut self, period: f64) -> NestResult<Self> {
        check_scale(period)?;
        self.period = Some(period);
        Ok(self)
    }

    fn keep_period(mut self, period: Option<f64>) -> Self {
        self.period = period;
        self
    }

    /// Returns the prior shape.
    pub fn kind(&self) -> PriorKind {
        self.kind
    }

    /// Returns the limits if the prior is bounded.
    pub fn limits(&self) -> Option<[f64; 2]> {
        self.limits
    }

    /// Returns true when both limits are finite.
    pub fn is_bound(&self) -> bool {
        self.limits.is_some()
    }

    /// Returns true for circular priors.
    pub fn is_circular(&self) -> bool {
        self.period.is_some()
    }

    /// Period of a circular prior.
    pub fn period(&self) -> Option<f64> {
        self.period
    }

    /// Wraps a residual into `(-period/2, period/2]` for circular priors.
    pub fn wrap(&self, residual: f64) -> f64 {
        match self.period {
            Some(period) => wrap_half_period(residual, period),
            None => residual,
        }
    }

    /// Returns true if `x` lies outside the support.
    pub fn is_out_of_limits(&self, x: f64) -> bool {
        if !x.is_finite() {
            return true;
        }
        if let Some([lo, hi]) = self.limits {
            return x < lo || x > hi;
        }
        matches!(self.kind, PriorKind::Exponential { .. }) && x < 0.0
    }

    /// Maps a domain value to the unit interval.
    pub fn domain_to_unit(&self, d: f64) -> f64 {
        (self.base_domain_to_unit(d) - self.unit_lo) / self.unit_range
    }

    /// Maps a unit value to the domain.
    pub fn unit_to_domain(&self, u: f64) -> f64 {
        self.base_unit_to_domain(self.unit_lo + u * self.unit_range)
    }

    /// Prior density at `x`.
    pub fn result(&self, x: f64) -> f64 {
        if self.is_out_of_limits(x) {
            return 0.0;
        }
        self.base_density(x) / self.unit_range
    }

    /// Natural log of the prior density at `x`.
    pub fn log_result(&self, x: f64) -> f64 {
        let density = self.result(x);
        if density > 0.0 {
            density.ln()
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Derivative of the log density at `x`.
    pub fn partial_log(&self, x: f64) -> f64 {
        if self.is_out_of_limits(x) {
            return 0.0;
        }
        match self.kind {
            PriorKind::Uniform => 0.0,
            PriorKind::Jeffreys => -1.0 / x,
            PriorKind::Gauss { center, scale } => -(x - center) / (scale * scale),
            PriorKind::Exponential { scale } => -1.0 / scale,
            PriorKind::Laplace { center, scale } => -(x - center).signum() / scale,
            PriorKind::Cauchy { center, scale } => {
                let dx = x - center;
                -2.0 * dx / (scale * scale + dx * dx)
            }
        }
    }

    fn base_domain_to_unit(&self, d: f64) -> f64 {
        match self.kind {
            PriorKind::Uniform => match self.limits {
                Some([lo, hi]) => (d - lo) / (hi - lo),
                None => d,
            },
            PriorKind::Jeffreys => match self.limits {
                Some([lo, hi]) => (d.ln() - lo.ln()) / (hi.ln() - lo.ln()),
                None => d,
            },
            PriorKind::Gauss { center, scale } => {
                let z = (d - center) / (scale * SQRT_2);
                if z < 0.0 {
                    0.5 * erfc(-z)
                } else {
                    0.5 * (1.0 + erf(z))
                }
            }
            PriorKind::Exponential { scale } => {
                if d <= 0.0 {
                    0.0
                } else {
                    -(-d / scale).exp_m1()
                }
            }
            PriorKind::Laplace { center, scale } => {
                if d < center {
                    0.5 * ((d - center) / scale).exp()
                } else {
                    1.0 - 0.5 * (-(d - center) / scale).exp()
                }
            }
            PriorKind::Cauchy { center, scale } => 0.5 + ((d - center) / scale).atan() / PI,
        }
    }

    fn base_unit_to_domain(&self, u: f64) -> f64 {
        match self.kind {
            PriorKind::Uniform => match self.limits {
                Some([lo, hi]) => lo + u * (hi - lo),
                None => u,
            },
            PriorKind::Jeffreys => match self.limits {
                Some([lo, hi]) => (lo.ln() + u * (hi.ln() - lo.ln())).exp(),
                None => u,
            },
            PriorKind::Gauss { center, scale } => {
                let arg = 2.0 * u - 1.0;
                if arg <= -1.0 {
                    center - GAUSS_CLAMP * scale
                } else if arg >= 1.0 {
                    center + GAUSS_CLAMP * scale
                } else {
                    let z = erf_inv(arg) * SQRT_2;
                    center + scale * z.clamp(-GAUSS_CLAMP, GAUSS_CLAMP)
                }
            }
            PriorKind::Exponential { scale } => {
                if u >= 1.0 {
                    f64::INFINITY
                } else {
                    -scale * (-u).ln_1p()
                }
            }
            PriorKind::Laplace { center, scale } => {
                if u < 0.5 {
                    center + scale * (2.0 * u).ln()
                } else {
                    center - scale * (2.0 * (1.0 - u)).ln()
                }
            }
            PriorKind::Cauchy { center, scale } => center + scale * (PI * (u - 0.5)).tan(),
        }
    }

    fn base_density(&self, x: f64) -> f64 {
        match self.kind {
            PriorKind::Uniform => match self.limits {
                Some([lo, hi]) => 1.0 / (hi - lo),
                None => 0.0,
            },
            PriorKind::Jeffreys => match self.limits {
                Some([lo, hi]) => 1.0 / (x * (hi / lo).ln()),
                None => 0.0,
            },
            PriorKind::Gauss { center, scale } => {
                let z = (x - center) / scale;
                (-0.5 * z * z).exp() / (scale * (2.0 * PI).sqrt())
            }
            PriorKind::Exponential { scale } => (-x / scale).exp() / scale,
            PriorKind::Laplace { center, scale } => {
                (-(x - center).abs() / scale).exp() / (2.0 * scale)
            }
            PriorKind::Cauchy { center, scale } => {
                let dx = x - center;
                scale / (PI * (scale * scale + dx * dx))
            }
        }
    }
}

fn check_limits(lo: f64, hi: f64) -> NestResult<()> {
    if lo.is_finite() && hi.is_finite() && lo < hi {
        Ok(())
    } else {
        Err(NestError::Config(
            ErrorInfo::new("prior-limits", "limits must be finite with lo < hi")
                .with_context("lo", lo)
                .with_context("hi", hi),
        ))
    }
}
