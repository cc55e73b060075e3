use anyhow::{anyhow, Result};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use shared::config::parse_var;
use tracing::info;

const DEFAULT_MAX: u32 = 99;
const DEFAULT_STATUS: u16 = 200;

/// One deployment of the function: the upper bound, the status it answers
/// with and the text appended to the message.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RandomConfig {
    max: u32,
    status_code: u16,
    suffix: String,
}

impl RandomConfig {
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let status_code = parse_var(&lookup, "RESPONSE_STATUS")?.unwrap_or(DEFAULT_STATUS);
        if !(100..=599).contains(&status_code) {
            return Err(anyhow!("RESPONSE_STATUS {} is not an HTTP status", status_code));
        }

        Ok(Self {
            max: parse_var(&lookup, "RANDOM_MAX")?.unwrap_or(DEFAULT_MAX),
            status_code,
            suffix: lookup("MESSAGE_SUFFIX").unwrap_or_default(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RandomResponse {
    status_code: u16,
    body: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::log::init();

    let config = RandomConfig::from_env()?;
    info!("Drawing values in [0, {}]", config.max);

    lambda_runtime::run(service_fn(|event| func(&config, event))).await?;
    Ok(())
}

async fn func(config: &RandomConfig, _event: LambdaEvent<Value>) -> Result<RandomResponse, Error> {
    Ok(respond(config, &mut rand::thread_rng()))
}

fn respond<R: Rng>(config: &RandomConfig, rng: &mut R) -> RandomResponse {
    let value = rng.gen_range(0..=config.max);

    RandomResponse {
        status_code: config.status_code,
        body: format!(
            "The random value (max {}) is {}{}",
            config.max, value, config.suffix
        ),
    }
}
