use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HealthCheckParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetConfigParams {}
