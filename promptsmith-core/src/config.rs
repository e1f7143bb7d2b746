//! Orchestration settings and retry policy
//!
//! Settings are plain serde structs so that the engine can deserialize them
//! from layered configuration; [`OrchestrationSettings::builder`] validates
//! values supplied programmatically.

use crate::agent::{AgentProfile, AgentRole};
use crate::classifier::KeywordTable;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded exponential backoff for transient generation failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(
        max_attempts: u32,
        initial_delay_ms: u64,
        backoff_multiplier: f64,
        max_delay_ms: u64,
    ) -> Result<Self> {
        let policy = Self {
            max_attempts,
            initial_delay_ms,
            backoff_multiplier,
            max_delay_ms,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::validation("Max attempts must be greater than 0"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(Error::validation("Backoff multiplier must be at least 1.0"));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(Error::validation(
                "Max delay must be greater than or equal to initial delay",
            ));
        }
        Ok(())
    }

    /// Delay before retry number `retry` (1-based), capped at `max_delay_ms`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let millis = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_delay_ms as f64) as u64)
    }

    /// Policy without delays, for tests and local tooling
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            backoff_multiplier: 1.0,
            max_delay_ms: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

/// Sampling profile per role, plus the Team Lead's final-round profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentProfiles {
    pub product_manager: AgentProfile,
    pub developer: AgentProfile,
    pub team_lead: AgentProfile,
    pub team_lead_final: AgentProfile,
}

impl AgentProfiles {
    pub fn for_role(&self, role: AgentRole, final_round: bool) -> AgentProfile {
        match role {
            AgentRole::ProductManager => self.product_manager,
            AgentRole::Developer => self.developer,
            AgentRole::TeamLead if final_round => self.team_lead_final,
            AgentRole::TeamLead => self.team_lead,
        }
    }

    fn validate(&self) -> Result<()> {
        for profile in [
            self.product_manager,
            self.developer,
            self.team_lead,
            self.team_lead_final,
        ] {
            AgentProfile::new(profile.temperature, profile.max_tokens)?;
        }
        Ok(())
    }
}

impl Default for AgentProfiles {
    fn default() -> Self {
        Self {
            product_manager: AgentProfile::default_for(AgentRole::ProductManager),
            developer: AgentProfile::default_for(AgentRole::Developer),
            team_lead: AgentProfile::default_for(AgentRole::TeamLead),
            team_lead_final: AgentProfile::final_review(),
        }
    }
}

/// Settings governing every session an orchestrator runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestrationSettings {
    pub max_iterations: u32,
    pub max_interventions: u32,
    /// Most recent turns included in an agent's context
    pub history_window: usize,
    pub context_cache_ttl_seconds: u64,
    pub retry: RetryPolicy,
    pub profiles: AgentProfiles,
    pub keywords: KeywordTable,
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_interventions: 3,
            history_window: 20,
            context_cache_ttl_seconds: 30,
            retry: RetryPolicy::default(),
            profiles: AgentProfiles::default(),
            keywords: KeywordTable::default(),
        }
    }
}

impl OrchestrationSettings {
    pub fn builder() -> OrchestrationSettingsBuilder {
        OrchestrationSettingsBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::configuration("max_iterations must be at least 1"));
        }
        if self.history_window == 0 {
            return Err(Error::configuration("history_window must be at least 1"));
        }
        if self.context_cache_ttl_seconds == 0 {
            return Err(Error::configuration(
                "context_cache_ttl_seconds must be greater than 0",
            ));
        }
        self.retry
            .validate()
            .map_err(|e| Error::configuration(format!("retry: {}", e)))?;
        self.profiles
            .validate()
            .map_err(|e| Error::configuration(format!("profiles: {}", e)))?;
        if self.keywords.strong_rejection.is_empty() {
            return Err(Error::configuration(
                "keywords.strong_rejection must not be empty",
            ));
        }
        Ok(())
    }
}

/// Builder for OrchestrationSettings with validation on build
#[derive(Debug, Clone, Default)]
pub struct OrchestrationSettingsBuilder {
    settings: OrchestrationSettings,
}

impl OrchestrationSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default iteration budget for new sessions
    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.settings.max_iterations = max_iterations;
        self
    }

    /// Default intervention budget for new sessions
    pub fn max_interventions(mut self, max_interventions: u32) -> Self {
        self.settings.max_interventions = max_interventions;
        self
    }

    pub fn history_window(mut self, history_window: usize) -> Self {
        self.settings.history_window = history_window;
        self
    }

    pub fn context_cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.settings.context_cache_ttl_seconds = seconds;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.settings.retry = retry;
        self
    }

    pub fn profiles(mut self, profiles: AgentProfiles) -> Self {
        self.settings.profiles = profiles;
        self
    }

    pub fn keywords(mut self, keywords: KeywordTable) -> Self {
        self.settings.keywords = keywords;
        self
    }

    pub fn build(self) -> Result<OrchestrationSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_retry_delays_double_and_cap() {
        let policy = RetryPolicy::new(5, 1000, 2.0, 3000).unwrap();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(3000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(3000));
    }

    #[test]
    fn test_retry_policy_validation() {
        assert!(RetryPolicy::new(0, 10, 2.0, 100).is_err());
        assert!(RetryPolicy::new(3, 10, 0.5, 100).is_err());
        assert!(RetryPolicy::new(3, 100, 2.0, 10).is_err());
        assert_eq!(RetryPolicy::immediate(2).delay_for(2), Duration::ZERO);
    }

    #[test]
    fn test_settings_builder_validates() {
        let settings = OrchestrationSettings::builder()
            .max_iterations(3)
            .history_window(10)
            .build()
            .unwrap();
        assert_eq!(settings.max_iterations, 3);
        assert_eq!(settings.max_interventions, 3);

        assert_matches!(
            OrchestrationSettings::builder().max_iterations(0).build(),
            Err(Error::Configuration { .. })
        );
        let mut profiles = AgentProfiles::default();
        profiles.developer.temperature = 3.0;
        assert!(OrchestrationSettings::builder().profiles(profiles).build().is_err());
    }

    #[test]
    fn test_profiles_for_role() {
        let profiles = AgentProfiles::default();
        assert_eq!(profiles.for_role(AgentRole::TeamLead, true).temperature, 0.3);
        assert_eq!(profiles.for_role(AgentRole::TeamLead, false).temperature, 0.4);
        assert_eq!(profiles.for_role(AgentRole::Developer, true).max_tokens, 2500);
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: OrchestrationSettings =
            serde_json::from_str(r#"{"max_iterations": 4, "retry": {"max_attempts": 2, "initial_delay_ms": 5, "backoff_multiplier": 2.0, "max_delay_ms": 50}}"#)
                .unwrap();
        assert_eq!(settings.max_iterations, 4);
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(settings.history_window, 20);
        assert!(settings.validate().is_ok());
    }
}
