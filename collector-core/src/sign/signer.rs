use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use crate::session::SessionCredential;

use super::consistency::ConsistencyEncoder;
use super::error::{SignError, SignResult};
use super::fingerprint::FingerprintForger;
use super::frame::{FrameEncoder, FrameInput};
use super::obfuscate::Obfuscator;
use super::trace::TraceIdGenerator;

/// The request a signature is bound to. POST bodies must be sent exactly as
/// `serde_json::to_string` renders them here.
#[derive(Debug, Clone, Copy)]
pub enum SignRequest<'a> {
    Get {
        url: &'a str,
        params: &'a Map<String, Value>,
    },
    Post {
        url: &'a str,
        body: &'a Value,
    },
}

impl SignRequest<'_> {
    pub fn url(&self) -> &str {
        match self {
            SignRequest::Get { url, .. } | SignRequest::Post { url, .. } => url,
        }
    }

    pub fn content_string(&self) -> SignResult<String> {
        let uri = extract_uri(self.url())?;
        match self {
            SignRequest::Get { params, .. } => Ok(get_content_string(&uri, params)),
            SignRequest::Post { body, .. } => post_content_string(&uri, body),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedHeaderSet {
    pub primary_token: String,
    pub consistency_token: String,
    pub timestamp_ms: i64,
    pub trace_id: String,
    pub xray_trace_id: String,
}

impl SignedHeaderSet {
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("x-s", self.primary_token.clone()),
            ("x-s-common", self.consistency_token.clone()),
            ("x-t", self.timestamp_ms.to_string()),
            ("x-b3-traceid", self.trace_id.clone()),
            ("x-xray-traceid", self.xray_trace_id.clone()),
        ]
    }
}

/// Produces fresh Xiaohongshu header sets. All randomness flows from one
/// ChaCha stream so a seeded signer is fully reproducible.
pub struct XhsSigner {
    rng: ChaCha8Rng,
    forger: FingerprintForger,
    app_id: String,
}

impl XhsSigner {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self::from_rng(app_id.into(), ChaCha8Rng::from_entropy())
    }

    pub fn with_seed(app_id: impl Into<String>, seed: u64) -> Self {
        Self::from_rng(app_id.into(), ChaCha8Rng::seed_from_u64(seed))
    }

    fn from_rng(app_id: String, mut rng: ChaCha8Rng) -> Self {
        let forger = FingerprintForger::new(&mut rng);
        Self {
            rng,
            forger,
            app_id,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn sign(
        &mut self,
        request: &SignRequest<'_>,
        session: &SessionCredential,
    ) -> SignResult<SignedHeaderSet> {
        self.sign_at(request, session, Utc::now().timestamp_millis())
    }

    pub fn sign_at(
        &mut self,
        request: &SignRequest<'_>,
        session: &SessionCredential,
        timestamp_ms: i64,
    ) -> SignResult<SignedHeaderSet> {
        let identity = session.identity().ok_or(SignError::MissingIdentity)?;
        let content = request.content_string()?;
        let clock = u64::try_from(timestamp_ms).unwrap_or(0);

        let input = FrameInput::sample(&mut self.rng, clock, &content, identity, &self.app_id);
        let frame = FrameEncoder::encode(&input);
        let token = Obfuscator::primary_token(&FrameEncoder::carried(&frame));
        let primary_token = Obfuscator::primary_header(&token)?;

        let descriptor = self
            .forger
            .forge(&mut self.rng, session.pairs(), timestamp_ms);
        let consistency_token = ConsistencyEncoder::header(identity, &descriptor)?;

        Ok(SignedHeaderSet {
            primary_token,
            consistency_token,
            timestamp_ms,
            trace_id: TraceIdGenerator::b3(&mut self.rng),
            xray_trace_id: TraceIdGenerator::xray(&mut self.rng, clock),
        })
    }
}

/// Path component of a request URL; the root path is rejected.
pub fn extract_uri(url: &str) -> SignResult<String> {
    let parsed = Url::parse(url.trim()).map_err(|_| SignError::InvalidUri(url.to_string()))?;
    let path = parsed.path();
    if path.is_empty() || path == "/" {
        return Err(SignError::InvalidUri(url.to_string()));
    }
    Ok(path.to_string())
}

/// `uri?k=v&...` in insertion order; lists are comma-joined and `=` inside a
/// value becomes `%3D`.
pub fn get_content_string(uri: &str, params: &Map<String, Value>) -> String {
    if params.is_empty() {
        return uri.to_string();
    }
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", param_text(value).replace('=', "%3D")))
        .collect::<Vec<_>>()
        .join("&");
    format!("{uri}?{query}")
}

pub fn post_content_string(uri: &str, body: &Value) -> SignResult<String> {
    Ok(format!("{uri}{}", serde_json::to_string(body)?))
}

fn param_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(param_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}
