//! Retrying HTTP client for the path-planner API

use super::api::*;
use super::PlannerApi;
use crate::config::PlannerEnv;
use crate::error::Error;
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::warn;

const BASE_PATH: &str = "/api/v2.0.0/";
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RETRIES: u32 = 5;
const TRANSPORT_RETRY_DELAY: Duration = Duration::from_millis(500);
const BUSY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// HTTP client for the planner, authenticating via HTTP Basic.
///
/// Status 503 is a normal "busy" signal of the planner (it occurs while
/// the robot docks, for example); it and transport errors are retried up
/// to five times before surfacing.
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
    timeout: Duration,
    max_retries: u32,
}

impl Client {
    pub fn new(env: &PlannerEnv) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("http://{}{}", env.host, BASE_PATH))
            .map_err(|e| Error::ConfigurationError(format!("planner base url: {}", e)))?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::PlannerError(format!("build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            username: env.username.clone(),
            password: env.password.clone(),
            timeout: env.timeout,
            max_retries: MAX_RETRIES,
        })
    }

    /// Bound the number of retries on busy and transport errors (default
    /// is five)
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&impl Serialize>,
        timeout: Duration,
    ) -> Result<reqwest::Response, Error> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|e| Error::PlannerError(format!("endpoint {}: {}", endpoint, e)))?;

        let mut last_err = Error::PlannerError(format!("no attempt made for {}", endpoint));
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(endpoint, attempt, error = %last_err, "retrying planner request");
            }
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .basic_auth(&self.username, Some(&self.password))
                .header(reqwest::header::ACCEPT, "application/json")
                .timeout(timeout);
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Err(e) => {
                    last_err = Error::PlannerError(format!("{} {}: {}", method, endpoint, e));
                    tokio::time::sleep(TRANSPORT_RETRY_DELAY).await;
                }
                Ok(resp) if resp.status() == StatusCode::SERVICE_UNAVAILABLE => {
                    last_err =
                        Error::PlannerError(format!("{} {}: planner busy (503)", method, endpoint));
                    tokio::time::sleep(BUSY_RETRY_DELAY).await;
                }
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let api_err: ApiError = resp.json().await.unwrap_or_default();
                    let code = if api_err.error_code.is_empty() {
                        status.as_u16().to_string()
                    } else {
                        api_err.error_code
                    };
                    return Err(Error::PlannerDenied {
                        code,
                        message: api_err.error_human,
                    });
                }
            }
        }
        Err(last_err)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<T, Error> {
        let resp = self
            .send(Method::GET, endpoint, None::<&()>, timeout)
            .await?;
        resp.json()
            .await
            .map_err(|e| Error::PlannerError(format!("decode {}: {}", endpoint, e)))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, Error> {
        let resp = self
            .send(Method::POST, endpoint, Some(body), self.timeout)
            .await?;
        resp.json()
            .await
            .map_err(|e| Error::PlannerError(format!("decode {}: {}", endpoint, e)))
    }
}

impl PlannerApi for Client {
    async fn status(&self) -> Result<PlannerStatus, Error> {
        self.get_json("status", STATUS_TIMEOUT).await
    }

    async fn maps(&self) -> Result<Vec<MapItem>, Error> {
        self.get_json("maps", self.timeout).await
    }

    async fn positions(&self, map_id: &str) -> Result<Vec<PositionItem>, Error> {
        self.get_json(&format!("maps/{}/positions", map_id), self.timeout)
            .await
    }

    async fn paths(&self, map_id: &str) -> Result<Vec<PathItem>, Error> {
        self.get_json(&format!("maps/{}/paths", map_id), self.timeout)
            .await
    }

    async fn path_detail(&self, path_guid: &str) -> Result<PathDetail, Error> {
        self.get_json(&format!("paths/{}", path_guid), self.timeout)
            .await
    }

    async fn path_guides(&self) -> Result<Vec<PathGuideItem>, Error> {
        self.get_json("path_guides", self.timeout).await
    }

    async fn create_path_guide(&self, map_id: &str, name: &str) -> Result<PathGuideItem, Error> {
        let body = CreatePathGuide {
            map_id: map_id.to_string(),
            name: name.to_string(),
        };
        self.post_json("path_guides", &body).await
    }

    async fn delete_path_guide(&self, guid: &str) -> Result<(), Error> {
        self.send(
            Method::DELETE,
            &format!("path_guides/{}", guid),
            None::<&()>,
            self.timeout,
        )
        .await?;
        Ok(())
    }

    async fn path_guide_positions(
        &self,
        guide_guid: &str,
    ) -> Result<Vec<PathGuidePosition>, Error> {
        self.get_json(&format!("path_guides/{}/positions", guide_guid), self.timeout)
            .await
    }

    async fn add_path_guide_position(&self, position: &PathGuidePosition) -> Result<(), Error> {
        self.send(
            Method::POST,
            &format!("path_guides/{}/positions", position.path_guide_guid),
            Some(position),
            self.timeout,
        )
        .await?;
        Ok(())
    }

    async fn start_precalc(&self, guide_guid: &str) -> Result<PrecalcResponse, Error> {
        self.post_json("path_guides_precalc", &PrecalcCommand::start(guide_guid))
            .await
    }

    async fn mission_actions(
        &self,
        mission_queue_id: i64,
    ) -> Result<Vec<MissionActionItem>, Error> {
        self.get_json(
            &format!("mission_queue/{}/actions", mission_queue_id),
            self.timeout,
        )
        .await
    }

    async fn mission_action(
        &self,
        mission_queue_id: i64,
        action_id: i64,
    ) -> Result<MissionActionItem, Error> {
        self.get_json(
            &format!("mission_queue/{}/actions/{}", mission_queue_id, action_id),
            self.timeout,
        )
        .await
    }
}
