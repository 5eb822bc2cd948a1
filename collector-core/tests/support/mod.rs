#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use collector_core::config::PacingSection;
use collector_core::{CollectError, CollectResult, HttpRequest, HttpResponse, Pacer, Transport};

/// Answers requests from per-route queues keyed on a URL fragment. The last
/// queued response of a route repeats.
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<Vec<(String, VecDeque<HttpResponse>)>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, fragment: &str, response: HttpResponse) -> Self {
        {
            let mut routes = self.routes.lock().unwrap();
            match routes.iter_mut().find(|(key, _)| key == fragment) {
                Some((_, queue)) => queue.push_back(response),
                None => routes.push((fragment.to_string(), VecDeque::from([response]))),
            }
        }
        self
    }

    pub fn json(self, fragment: &str, body: serde_json::Value) -> Self {
        self.route(fragment, HttpResponse::new(200, body.to_string()))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, fragment: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.url.contains(fragment))
            .collect()
    }
}

#[async_trait(?Send)]
impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> CollectResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let mut routes = self.routes.lock().unwrap();
        let queue = routes
            .iter_mut()
            .find(|(fragment, _)| request.url.contains(fragment.as_str()))
            .map(|(_, queue)| queue)
            .ok_or_else(|| CollectError::Transport(format!("no route for {}", request.url)))?;
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        response.ok_or_else(|| CollectError::Transport(format!("no response for {}", request.url)))
    }
}

pub fn quiet_pacer() -> Pacer {
    let pacing = PacingSection {
        before_listing_secs: [0.0, 0.0],
        early_secs: [0.0, 0.0],
        middle_secs: [0.0, 0.0],
        late_secs: [0.0, 0.0],
        early_until: 5,
        middle_until: 10,
    };
    Pacer::seeded(&pacing, None, 11)
}
