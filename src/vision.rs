//! # Vision-model collaborator
//!
//! Client for an OpenAI-compatible `chat/completions` endpoint, used to describe dewarped
//! building images and turn the description into an occupancy label.
//!
//! * [`VisionClient::describe_image`] – sends the image as a base64 data URL and asks for a
//!   strict JSON object of attributes.
//! * [`VisionClient::classify_attributes`] – asks a text model for a single label,
//!   `Occupied` or `Not Occupied`.
//! * [`run_occupancy_batch`] – runs both calls over a table of object ids and appends the
//!   `Vision Model Output` and `Occupancy Prediction` columns.
//!
//! Configuration is explicit: a [`VisionConfig`] is built at the boundary (optionally with
//! [`VisionConfig::from_env`]) and handed to the client. The credential is only checked when a
//! request is about to be sent; a missing or rejected key is a
//! [`PipelineError::Credential`], which aborts the batch.
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use camino::Utf8Path;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::pipeline_errors::PipelineError;
use crate::schema::{resolve_all, OBJECT_ID};
use crate::table::Table;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const VISION_OUTPUT_COLUMN: &str = "Vision Model Output";
pub const OCCUPANCY_COLUMN: &str = "Occupancy Prediction";

const DESCRIBE_SYSTEM: &str = "You output only strict JSON.";
const DESCRIBE_PROMPT: &str = "Analyze the image and answer with a JSON object in a strict schema. \
     Only output the JSON object, nothing else.";
const CLASSIFY_SYSTEM: &str = "Classify occupancy concisely.";
const CLASSIFY_PROMPT: &str = "You are an expert in post-disaster building occupancy assessment. \
     Decide 'Occupied' or 'Not Occupied' using the provided JSON attributes. \
     Output only one word: Occupied or Not Occupied.";

#[derive(Debug, Clone, PartialEq)]
pub struct VisionConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub vision_model: String,
    pub text_model: String,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    /// Pause between the two calls made for one image
    pub request_interval: Duration,
}

impl Default for VisionConfig {
    fn default() -> Self {
        VisionConfig {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            vision_model: DEFAULT_MODEL.to_string(),
            text_model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            request_interval: Duration::from_secs(1),
        }
    }
}

impl VisionConfig {
    /// Read `OPENAI_API_KEY`, `OPENAI_VISION_MODEL` and `OPENAI_TEXT_MODEL`.
    ///
    /// A missing key is not an error here; it is reported by the first request.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let defaults = VisionConfig::default();
        VisionConfig {
            api_key: var("OPENAI_API_KEY"),
            vision_model: var("OPENAI_VISION_MODEL").unwrap_or(defaults.vision_model),
            text_model: var("OPENAI_TEXT_MODEL").unwrap_or(defaults.text_model),
            ..VisionConfig::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

/// Text answer of one call and the tokens it consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct VisionClient {
    config: VisionConfig,
    http: Client,
}

impl VisionClient {
    pub fn new(config: VisionConfig) -> Result<Self, PipelineError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(VisionClient { config, http })
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str, PipelineError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::Credential("OPENAI_API_KEY is not set".into()))
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<Completion, PipelineError> {
        let key = self.api_key()?;
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        debug!("POST {url} (model {})", request.model);

        let response = self
            .http
            .post(&url)
            .bearer_auth(key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PipelineError::Credential(format!(
                "the vision endpoint rejected the API key ({status})"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::VisionResponse(format!("{status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::VisionResponse("no choices in response".into()))?;
        Ok(Completion {
            content,
            total_tokens: parsed.usage.and_then(|u| u.total_tokens).unwrap_or(0),
        })
    }

    /// Describe an image as a JSON object of attributes.
    ///
    /// Return
    /// ----------
    /// * [`PipelineError::Credential`] when no key is configured (checked before the image is
    ///   read), [`PipelineError::MissingResource`] when the image does not exist.
    pub async fn describe_image(&self, image: &Utf8Path) -> Result<Completion, PipelineError> {
        self.api_key()?;
        if !image.is_file() {
            return Err(PipelineError::MissingResource(image.to_owned()));
        }
        let bytes = tokio::fs::read(image).await?;
        let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes));

        let request = ChatRequest {
            model: &self.config.vision_model,
            messages: vec![
                Message {
                    role: "system",
                    content: MessageContent::Text(DESCRIBE_SYSTEM.into()),
                },
                Message {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text {
                            text: DESCRIBE_PROMPT.into(),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl { url: data_url },
                        },
                    ]),
                },
            ],
            max_tokens: 200,
            temperature: 0.0,
        };
        self.complete(&request).await
    }

    /// Turn an attribute description into `Occupied` or `Not Occupied`.
    pub async fn classify_attributes(&self, attributes: &str) -> Result<Completion, PipelineError> {
        let request = ChatRequest {
            model: &self.config.text_model,
            messages: vec![
                Message {
                    role: "system",
                    content: MessageContent::Text(CLASSIFY_SYSTEM.into()),
                },
                Message {
                    role: "user",
                    content: MessageContent::Text(format!(
                        "{CLASSIFY_PROMPT}\n\nAttributes: {attributes}"
                    )),
                },
            ],
            max_tokens: 5,
            temperature: 0.0,
        };
        let mut completion = self.complete(&request).await?;
        completion.content = completion.content.trim().to_string();
        Ok(completion)
    }
}

/// Token totals and per-record counts of an occupancy batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OccupancyReport {
    pub classified: usize,
    pub failed: usize,
    pub vision_tokens: u64,
    pub text_tokens: u64,
}

/// Describe and classify `<image_dir>/<id>.jpg` for every row of `table`.
///
/// Failed rows get empty cells and the batch continues; a credential error aborts it.
pub async fn run_occupancy_batch(
    client: &VisionClient,
    table: &mut Table,
    image_dir: &Utf8Path,
) -> Result<OccupancyReport, PipelineError> {
    let id_col = resolve_all(&table.headers, &[OBJECT_ID])?[0];
    let interval = client.config().request_interval;

    let mut report = OccupancyReport::default();
    let mut descriptions = Vec::with_capacity(table.len());
    let mut labels = Vec::with_capacity(table.len());

    for row in 0..table.len() {
        let Some(id) = table.cell(row, id_col) else {
            report.failed += 1;
            descriptions.push(String::new());
            labels.push(String::new());
            continue;
        };
        let image = image_dir.join(format!("{id}.jpg"));

        let result = async {
            let description = client.describe_image(&image).await?;
            report.vision_tokens += description.total_tokens;
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            let label = client.classify_attributes(&description.content).await?;
            report.text_tokens += label.total_tokens;
            Ok::<_, PipelineError>((description.content, label.content))
        }
        .await;

        match result {
            Ok((description, label)) => {
                report.classified += 1;
                descriptions.push(description);
                labels.push(label);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Object {id}: {e}");
                report.failed += 1;
                descriptions.push(String::new());
                labels.push(String::new());
            }
        }
    }

    info!(
        "Occupancy batch: {} classified, {} failed, vision tokens {}, text tokens {}",
        report.classified, report.failed, report.vision_tokens, report.text_tokens
    );
    table.set_column(VISION_OUTPUT_COLUMN, descriptions);
    table.set_column(OCCUPANCY_COLUMN, labels);
    Ok(report)
}

#[cfg(test)]
mod vision_test {
    use super::*;
    use csv::StringRecord;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str, tokens: u64) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"total_tokens": tokens}
        }))
    }

    fn client(server: &MockServer) -> VisionClient {
        VisionClient::new(
            VisionConfig::default()
                .with_api_key("test-key")
                .with_base_url(server.uri())
                .with_request_interval(Duration::ZERO),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_credential_at_first_use() {
        let client = VisionClient::new(VisionConfig::default()).unwrap();
        let err = client
            .describe_image(Utf8Path::new("/no/such/image.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Credential(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_describe_and_classify() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_string_contains("data:image/jpeg;base64,"))
            .respond_with(completion("{\"house damaged\": false}", 120))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("Attributes:"))
            .respond_with(completion(" Occupied \n", 7))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::write(root.join("1.jpg"), b"\xff\xd8fake").unwrap();

        let client = client(&server);
        let description = client.describe_image(&root.join("1.jpg")).await.unwrap();
        assert_eq!(description.total_tokens, 120);
        let label = client
            .classify_attributes(&description.content)
            .await
            .unwrap();
        assert_eq!(label.content, "Occupied");
        assert_eq!(label.total_tokens, 7);
    }

    #[tokio::test]
    async fn test_rejected_key_is_credential_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let err = client(&server)
            .classify_attributes("{}")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Credential(_)));
    }

    #[tokio::test]
    async fn test_occupancy_batch_isolates_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("data:image/jpeg;base64,"))
            .respond_with(completion("{}", 10))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("Attributes:"))
            .respond_with(completion("Not Occupied", 2))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::write(root.join("1.jpg"), b"img").unwrap();

        let mut table = Table::new(
            StringRecord::from(vec!["objectid"]),
            vec![StringRecord::from(vec!["1"]), StringRecord::from(vec!["2"])],
        );
        let report = run_occupancy_batch(&client(&server), &mut table, root)
            .await
            .unwrap();
        assert_eq!(
            report,
            OccupancyReport {
                classified: 1,
                failed: 1,
                vision_tokens: 10,
                text_tokens: 2,
            }
        );
        let col = table.column(OCCUPANCY_COLUMN).unwrap();
        assert_eq!(table.cell(0, col), Some("Not Occupied"));
        assert_eq!(table.cell(1, col), None);
    }
}
