use serde::Deserialize;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

pub const DEFAULT_STRIPE_API_BASE_URL: &str = "https://api.stripe.com/v1";
pub const DEFAULT_STRIPE_API_VERSION: &str = "2019-12-03";
pub const DEFAULT_DAYS_UNTIL_DUE: u32 = 7;

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceSenderConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub stripe: StripeConfig,
    pub invoice: InvoiceSettings,
    pub trigger: TriggerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub api_base_url: String,
    /// Pinned `Stripe-Version` header.
    pub api_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceSettings {
    pub days_until_due: u32,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            days_until_due: DEFAULT_DAYS_UNTIL_DUE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    /// When set, trigger deliveries must carry an HMAC of their body.
    pub signing_secret: Option<Secret<String>>,
    pub failure_policy: FailurePolicy,
}

/// What the trigger endpoint answers when an invocation did not produce a
/// sent invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Always acknowledge; the platform never redelivers.
    #[default]
    Acknowledge,
    /// Answer 502 on failed invocations so the host may redeliver.
    Propagate,
}

impl FromStr for FailurePolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acknowledge" => Ok(FailurePolicy::Acknowledge),
            "propagate" => Ok(FailurePolicy::Propagate),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "unknown TRIGGER_FAILURE_POLICY `{}`",
                other
            ))),
        }
    }
}

impl InvoiceSenderConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = core_config::is_production();

        let days_until_due = get_env(
            "INVOICE_DAYS_UNTIL_DUE",
            Some(&DEFAULT_DAYS_UNTIL_DUE.to_string()),
            false,
        )?
        .parse()
        .map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("INVOICE_DAYS_UNTIL_DUE is invalid: {}", e))
        })?;

        Ok(InvoiceSenderConfig {
            common: common_config,
            stripe: StripeConfig {
                secret_key: Secret::new(get_env("STRIPE_SECRET_KEY", Some(""), is_prod)?),
                api_base_url: get_env(
                    "STRIPE_API_BASE_URL",
                    Some(DEFAULT_STRIPE_API_BASE_URL),
                    false,
                )?,
                api_version: get_env(
                    "STRIPE_API_VERSION",
                    Some(DEFAULT_STRIPE_API_VERSION),
                    false,
                )?,
            },
            invoice: InvoiceSettings { days_until_due },
            trigger: TriggerConfig {
                signing_secret: env::var("TRIGGER_SIGNING_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .map(Secret::new),
                failure_policy: env::var("TRIGGER_FAILURE_POLICY")
                    .ok()
                    .map(|s| s.parse::<FailurePolicy>())
                    .transpose()?
                    .unwrap_or_default(),
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_policy_parses_case_insensitively() {
        assert_eq!(
            "Propagate".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::Propagate
        );
        assert_eq!(
            " acknowledge ".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::Acknowledge
        );
        assert!("retry".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn default_due_window_is_a_week() {
        assert_eq!(InvoiceSettings::default().days_until_due, 7);
        assert_eq!(FailurePolicy::default(), FailurePolicy::Acknowledge);
    }

    #[test]
    fn get_env_falls_back_outside_production() {
        assert_eq!(
            get_env("INVOICE_SENDER_TEST_UNSET_VAR", Some("fallback"), false).unwrap(),
            "fallback"
        );
        assert!(get_env("INVOICE_SENDER_TEST_UNSET_VAR", Some("fallback"), true).is_err());
        assert!(get_env("INVOICE_SENDER_TEST_UNSET_VAR", None, false).is_err());
    }
}
