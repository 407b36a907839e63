use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use super::{Integrator, SonificationService, SonifyResponse, StartRequest};
use crate::error::FetchError;
use crate::sim::body::Body;
use crate::sim::snapshot::Snapshot;

const START_PATH: &str = "/experiments/gravity/start";
const STEP_PATH: &str = "/experiments/gravity/step";
const SONIFY_PATH: &str = "/experiments/image/sonify";

/// JSON-over-HTTP client for the teaching backend.
#[derive(Clone)]
pub struct HttpBackend {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn transport_error(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::Status(code, _) => FetchError::Status(code),
        ureq::Error::Transport(t) => FetchError::Transport(t.to_string()),
    }
}

fn decode<T: DeserializeOwned>(resp: ureq::Response) -> Result<T, FetchError> {
    resp.into_json::<T>()
        .map_err(|e| FetchError::Decode(e.to_string()))
}

impl Integrator for HttpBackend {
    fn start(&mut self, bodies: &[Body]) -> Result<Snapshot, FetchError> {
        debug!(count = bodies.len(), "POST {START_PATH}");
        let resp = self
            .agent
            .post(&self.url(START_PATH))
            .send_json(StartRequest { bodies })
            .map_err(transport_error)?;
        decode(resp)
    }

    fn step(&mut self, dt: f64) -> Result<Snapshot, FetchError> {
        let resp = self
            .agent
            .get(&self.url(STEP_PATH))
            .query("dt", &dt.to_string())
            .call()
            .map_err(transport_error)?;
        decode(resp)
    }
}

impl SonificationService for HttpBackend {
    fn sonify(&self, image_id: &str) -> Result<SonifyResponse, FetchError> {
        debug!(image_id, "GET {SONIFY_PATH}");
        let resp = self
            .agent
            .get(&self.url(SONIFY_PATH))
            .query("image_id", image_id)
            .call()
            .map_err(transport_error)?;
        decode(resp)
    }
}
