//! Response delays: per-response directives and simulation-wide rules.

use crate::metrics;
use crate::models::{CompiledRegex, RequestDetails, ResponseDetails};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Log-normally distributed delay, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogNormalDelay {
    pub min: u64,
    pub max: u64,
    pub mean: u64,
    pub median: u64,
}

impl LogNormalDelay {
    /// Draw one delay. `mu = ln(median)`, `sigma = sqrt(2 (ln(mean) - mu))`,
    /// clamped to `[min, max]` (a zero `max` means unbounded).
    pub fn sample(&self) -> u64 {
        let median = self.median.max(1) as f64;
        let mean = (self.mean as f64).max(median);
        let mu = median.ln();
        let sigma = (2.0 * (mean.ln() - mu)).max(0.0).sqrt();

        let mut rng = rand::thread_rng();
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen::<f64>();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        let value = (mu + sigma * z).exp().round() as u64;

        let upper = if self.max == 0 { u64::MAX } else { self.max };
        value.clamp(self.min, upper.max(self.min))
    }
}

/// Simulation-wide fixed delay applied to requests whose `destination + path`
/// matches `url_pattern`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedDelayRule {
    pub url_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    /// Milliseconds.
    pub delay: u64,
    #[serde(skip)]
    pub(crate) url_regex: CompiledRegex,
}

/// Simulation-wide log-normal delay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogNormalDelayRule {
    pub url_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    pub min: u64,
    pub max: u64,
    pub mean: u64,
    pub median: u64,
    #[serde(skip)]
    pub(crate) url_regex: CompiledRegex,
}

fn rule_applies(
    url_pattern: &str,
    url_regex: &CompiledRegex,
    http_method: Option<&str>,
    request: &RequestDetails,
) -> bool {
    if let Some(method) = http_method.filter(|m| !m.is_empty()) {
        if !method.eq_ignore_ascii_case(&request.method) {
            return false;
        }
    }
    let url = format!("{}{}", request.destination, request.path);
    url_regex.is_match(url_pattern, &url)
}

/// A resolved delay, before sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delay {
    Fixed(u64),
    LogNormal(LogNormalDelay),
}

impl Delay {
    pub fn kind(&self) -> &'static str {
        match self {
            Delay::Fixed(_) => "fixed",
            Delay::LogNormal(_) => "lognormal",
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            Delay::Fixed(ms) => *ms,
            Delay::LogNormal(d) => d.sample(),
        }
    }
}

/// Choose the delay for a simulated response. A directive on the response
/// wins, then the first matching fixed rule, then the first matching
/// log-normal rule.
pub fn resolve_delay(
    response: &ResponseDetails,
    request: &RequestDetails,
    fixed: &[FixedDelayRule],
    log_normal: &[LogNormalDelayRule],
) -> Option<Delay> {
    if let Some(ms) = response.fixed_delay {
        return Some(Delay::Fixed(ms));
    }
    if let Some(d) = response.log_normal_delay {
        return Some(Delay::LogNormal(d));
    }
    if let Some(rule) = fixed.iter().find(|r| {
        rule_applies(&r.url_pattern, &r.url_regex, r.http_method.as_deref(), request)
    }) {
        return Some(Delay::Fixed(rule.delay));
    }
    log_normal
        .iter()
        .find(|r| {
            rule_applies(&r.url_pattern, &r.url_regex, r.http_method.as_deref(), request)
        })
        .map(|r| {
            Delay::LogNormal(LogNormalDelay {
                min: r.min,
                max: r.max,
                mean: r.mean,
                median: r.median,
            })
        })
}

/// Applies a delay. Swappable so tests can observe delays without sleeping.
#[async_trait]
pub trait Delayer: Send + Sync {
    async fn delay(&self, delay: Delay);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelayer;

#[async_trait]
impl Delayer for TokioDelayer {
    async fn delay(&self, delay: Delay) {
        let ms = delay.duration_ms();
        debug!(kind = delay.kind(), ms, "applying response delay");
        metrics::record_delay(delay.kind(), ms);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}
