//! Environment-variable configuration for the control-plane processes

use crate::error::Error;
use std::time::Duration;

fn required(var: &str) -> Result<String, Error> {
    std::env::var(var)
        .map_err(|_| Error::ConfigurationError(format!("environment variable {} is not set", var)))
}

fn flag(var: &str) -> bool {
    matches!(
        std::env::var(var).as_deref(),
        Ok("true") | Ok("TRUE") | Ok("True") | Ok("1")
    )
}

/// Configuration for the warehouse-wide auctioneer process
#[derive(Debug, Clone)]
pub struct AuctioneerEnv {
    /// Robots for which the bid-agent app is deployed; only these take part
    pub deployed_robots: Vec<String>,
    pub namespace: String,
}

impl AuctioneerEnv {
    pub fn from_env() -> Result<Self, Error> {
        let deployed_robots: Vec<String> = required("DEPLOYED_ROBOTS")?
            .split(',')
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .collect();
        if deployed_robots.is_empty() {
            return Err(Error::ConfigurationError(
                "DEPLOYED_ROBOTS does not name any robot".to_string(),
            ));
        }
        Ok(Self {
            deployed_robots,
            namespace: namespace_from_env(),
        })
    }
}

/// Configuration for a per-robot bid-agent process
#[derive(Debug, Clone)]
pub struct BidAgentEnv {
    pub robot_name: String,
    pub namespace: String,
}

impl BidAgentEnv {
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self {
            robot_name: required("ROBCO_ROBOT_NAME")?.to_lowercase(),
            namespace: namespace_from_env(),
        })
    }
}

/// Operating mode of the travel-time estimator against a fleet controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FleetMode {
    /// Estimator runs against the fleet controller and precomputes all maps
    Fleet,
    /// Estimator runs on a robot managed by a fleet; guides are created by the fleet
    FleetRobot,
    /// Standalone robot
    #[default]
    None,
}

/// Connection parameters for the path-planner HTTP API
#[derive(Debug, Clone)]
pub struct PlannerEnv {
    pub host: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl PlannerEnv {
    pub fn from_env() -> Result<Self, Error> {
        let timeout = match std::env::var("MIR_HTTP_TIMEOUT") {
            Ok(t) => Duration::from_secs_f64(t.parse::<f64>().map_err(|_| {
                Error::ConfigurationError(format!("MIR_HTTP_TIMEOUT {:?} is not a number", t))
            })?),
            Err(_) => Duration::from_secs(60),
        };
        Ok(Self {
            host: required("MIR_HOST")?,
            username: required("MIR_USER")?,
            password: required("MIR_PASSWORD")?,
            timeout,
        })
    }
}

/// Configuration for a per-robot travel-time estimator process
#[derive(Debug, Clone)]
pub struct EstimatorEnv {
    pub robot_name: String,
    pub planner: PlannerEnv,
    pub fleet_mode: FleetMode,
    pub precalc_paths_when_idle: bool,
    /// Debug switch: keep path guides created by the estimator
    pub preserve_path_guides: bool,
}

impl EstimatorEnv {
    pub fn from_env() -> Result<Self, Error> {
        let fleet_mode = match std::env::var("MIR_FLEET_CONFIG").as_deref() {
            Ok("FLEET") => FleetMode::Fleet,
            Ok("ROBOT") => FleetMode::FleetRobot,
            _ => FleetMode::None,
        };
        Ok(Self {
            robot_name: required("ROBCO_ROBOT_NAME")?.to_lowercase(),
            planner: PlannerEnv::from_env()?,
            fleet_mode,
            precalc_paths_when_idle: flag("PRECALC_PATHS_WHEN_IDLE"),
            preserve_path_guides: flag("MIR_PERSERVE_PATHGUIDES"),
        })
    }
}

fn namespace_from_env() -> String {
    std::env::var("K8S_NAMESPACE").unwrap_or_else(|_| "default".to_string())
}
