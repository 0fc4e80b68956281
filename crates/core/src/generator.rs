use crate::error::GenerationError;
use crate::models::{Answer, Hit};
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

pub const DEFAULT_MAX_LENGTH: usize = 256;
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
pub const NOT_FOUND_ANSWER: &str = "I don't find a clear answer in the documents.";

pub trait Generator {
    fn is_ready(&self) -> bool;
    fn generate(&self, prompt: &str, max_length: usize) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl GeneratorConfig {
    /// A blank or missing endpoint means no generator; a blank key means
    /// no authentication.
    pub fn from_values(endpoint: Option<String>, api_key: Option<String>) -> Option<Self> {
        let endpoint = endpoint?.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = api_key.and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        Some(Self { endpoint, api_key })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    max_length: usize,
}

/// Text generation behind a JSON HTTP endpoint.
pub struct HttpGenerator {
    config: GeneratorConfig,
    client: Client,
}

impl HttpGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

impl Generator for HttpGenerator {
    fn is_ready(&self) -> bool {
        url::Url::parse(&self.config.endpoint).is_ok()
    }

    fn generate(&self, prompt: &str, max_length: usize) -> Result<String, GenerationError> {
        if !self.is_ready() {
            return Err(GenerationError::Unavailable(format!(
                "invalid generator endpoint {}",
                self.config.endpoint
            )));
        }

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&GenerateRequest { prompt, max_length });
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(GenerationError::Request(format!(
                "generation request to {} returned {}",
                self.config.endpoint,
                response.status()
            )));
        }

        let payload: Value = response.json()?;
        extract_generated_text(&payload)
    }
}

fn extract_generated_text(payload: &Value) -> Result<String, GenerationError> {
    ["/text", "/generated_text", "/0/generated_text"]
        .iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_str))
        .map(|text| text.trim().to_string())
        .ok_or_else(|| GenerationError::BackendResponse(format!("no generated text in {payload}")))
}

fn context_block(hit: &Hit) -> String {
    let source = hit.source().unwrap_or("unknown");
    let page = hit
        .page()
        .map(|page| page.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!("[source: {source} | page: {page}]\n{}", hit.text)
}

/// Grounded prompt: every hit as a labelled block, then the question and the
/// citation instructions.
pub fn build_prompt(question: &str, hits: &[Hit]) -> String {
    let context = hits
        .iter()
        .map(context_block)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    format!(
        "Use the following extracted information from documents to answer the question. \
         If the answer is not present, say '{NOT_FOUND_ANSWER}'\n\n\
         QUESTION: {question}\n\n\
         CONTEXT:\n{context}\n\n\
         Answer concisely and include which source/page supports each claim."
    )
}

pub fn synthesize<G>(
    generator: &G,
    question: &str,
    hits: &[Hit],
    max_length: usize,
) -> Result<String, GenerationError>
where
    G: Generator + ?Sized,
{
    if !generator.is_ready() {
        return Err(GenerationError::Unavailable(
            "generation model is not ready".to_string(),
        ));
    }
    generator.generate(&build_prompt(question, hits), max_length)
}

/// Generates an answer when possible and otherwise hands back the hits as
/// the answer. Never fails.
pub fn answer_or_fallback<G>(
    generator: Option<&G>,
    question: &str,
    hits: Vec<Hit>,
    max_length: usize,
) -> Answer
where
    G: Generator + ?Sized,
{
    let Some(generator) = generator else {
        return Answer::Extractive {
            hits,
            reason: "no generation model configured".to_string(),
        };
    };

    match synthesize(generator, question, &hits, max_length) {
        Ok(text) => Answer::Generated { text, hits },
        Err(error) => {
            warn!(%error, "generation failed, falling back to retrieved chunks");
            Answer::Extractive {
                hits,
                reason: error.to_string(),
            }
        }
    }
}
