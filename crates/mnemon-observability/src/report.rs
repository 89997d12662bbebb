//! Health report shapes shared by diagnostics and the maintenance loop.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Healthy
        } else if score >= 0.5 {
            Self::Degraded
        } else {
            Self::Unhealthy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthDomain {
    Queue,
    Storage,
    Index,
    Provider,
    Mutation,
    Connector,
}

impl HealthDomain {
    /// Weight in the composite convex combination.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Queue => 0.28,
            Self::Storage => 0.14,
            Self::Index => 0.19,
            Self::Provider => 0.24,
            Self::Mutation => 0.10,
            Self::Connector => 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainHealth {
    pub domain: HealthDomain,
    pub score: f64,
    pub status: HealthStatus,
    /// Raw signals behind the score, for the log line.
    pub signals: Vec<(String, String)>,
}

impl DomainHealth {
    pub fn new(domain: HealthDomain, score: f64) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            domain,
            score,
            status: HealthStatus::from_score(score),
            signals: Vec::new(),
        }
    }

    pub fn signal(mut self, name: &str, value: impl ToString) -> Self {
        self.signals.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub domains: Vec<DomainHealth>,
    pub composite_score: f64,
    pub composite_status: HealthStatus,
}

impl HealthReport {
    pub fn from_domains(domains: Vec<DomainHealth>) -> Self {
        let composite_score: f64 = domains.iter().map(|d| d.score * d.domain.weight()).sum();
        Self {
            composite_status: HealthStatus::from_score(composite_score),
            composite_score,
            domains,
        }
    }

    pub fn domain(&self, domain: HealthDomain) -> Option<&DomainHealth> {
        self.domains.iter().find(|d| d.domain == domain)
    }
}
