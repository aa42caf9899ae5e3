use std::time::Duration;

use cardsmith_contracts::prediction::PredictionJob;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tracing::info;

use super::{resolve_image_reference, ImageProvider, ImagePrompt};
use crate::config::PredictionSettings;
use crate::error::PipelineError;
use crate::poller::{JobStatusSource, PredictionPoller};
use crate::transport::{http_client, response_json_or_error, send, ImageBytes};

const PROVIDER: &str = "prediction";

/// Asynchronous generation against a Replicate-style predictions API:
/// create a job, poll it to completion, then fetch its output.
pub struct PredictionImageProvider {
    settings: PredictionSettings,
    poller: PredictionPoller,
    http: HttpClient,
    timeout: Duration,
}

impl PredictionImageProvider {
    pub fn new(settings: PredictionSettings, poller: PredictionPoller, timeout: Duration) -> Self {
        Self {
            settings,
            poller,
            http: http_client(timeout),
            timeout,
        }
    }

    pub fn create_endpoint(&self) -> String {
        format!(
            "{}/models/{}/predictions",
            self.settings.api_base, self.settings.model
        )
    }

    pub fn status_endpoint(&self, job_id: &str) -> String {
        format!("{}/predictions/{}", self.settings.api_base, job_id)
    }

    pub fn build_payload(&self, prompt: &ImagePrompt) -> Value {
        let references: Vec<String> = prompt.images.iter().map(|image| image.data_url()).collect();
        json!({
            "input": {
                "prompt": prompt.text,
                "aspect_ratio": prompt.aspect_ratio,
                "reference_images": references,
            }
        })
    }

    fn create(&self, prompt: &ImagePrompt) -> Result<PredictionJob, PipelineError> {
        let request = self
            .http
            .post(self.create_endpoint())
            .bearer_auth(&self.settings.api_token)
            .header("Prefer", "wait")
            .json(&self.build_payload(prompt));
        let payload = response_json_or_error(PROVIDER, send(PROVIDER, request)?)?;
        PredictionJob::from_value(&payload)
            .ok_or_else(|| PipelineError::decode(PROVIDER, "create response has no prediction id"))
    }
}

impl JobStatusSource for PredictionImageProvider {
    fn fetch_status(
        &self,
        job_id: &str,
        budget: Duration,
    ) -> Result<PredictionJob, PipelineError> {
        let request = self
            .http
            .get(self.status_endpoint(job_id))
            .bearer_auth(&self.settings.api_token)
            .timeout(budget.min(self.timeout));
        let payload = response_json_or_error(PROVIDER, send(PROVIDER, request)?)?;
        PredictionJob::from_value(&payload)
            .ok_or_else(|| PipelineError::decode(PROVIDER, "status response has no prediction id"))
    }
}

impl ImageProvider for PredictionImageProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn generate(&self, prompt: &ImagePrompt) -> Result<ImageBytes, PipelineError> {
        let created = self.create(prompt)?;
        info!(
            provider = PROVIDER,
            model = %self.settings.model,
            job_id = %created.id,
            status = ?created.status,
            "prediction created"
        );
        let job_id = created.id.clone();
        let finished = self.poller.wait_for_completion(PROVIDER, created, self)?;
        let reference = finished
            .output
            .as_ref()
            .and_then(output_reference)
            .ok_or_else(|| {
                PipelineError::decode(
                    PROVIDER,
                    format!("prediction {job_id} succeeded without an image output"),
                )
            })?;
        resolve_image_reference(&self.http, PROVIDER, &reference)
    }
}

/// First usable image reference in a prediction's `output`: a URL or data
/// URL string, the first such entry of an array, or `url`/`image`/`output`
/// inside an object.
pub fn output_reference(output: &Value) -> Option<String> {
    match output {
        Value::String(raw) => {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Array(items) => items.iter().find_map(output_reference),
        Value::Object(obj) => ["url", "image", "output"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(output_reference)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use serde_json::json;

    use super::{output_reference, PredictionImageProvider};
    use crate::codec::EncodedImage;
    use crate::config::PredictionSettings;
    use crate::poller::{PollPolicy, PredictionPoller};
    use crate::providers::{ImagePrompt, ImageProvider};
    use crate::test_support::{png_bytes, Reply, StubServer};

    fn stub_provider(server: &StubServer) -> PredictionImageProvider {
        PredictionImageProvider::new(
            PredictionSettings {
                api_token: "r8-token".to_string(),
                api_base: server.url("/v1"),
                model: "acme/card".to_string(),
            },
            PredictionPoller::new(PollPolicy::new(Duration::from_millis(20), 50)),
            Duration::from_secs(5),
        )
    }

    fn prompt() -> ImagePrompt {
        ImagePrompt {
            text: "Snowball fight".to_string(),
            aspect_ratio: "3:2".to_string(),
            images: vec![
                EncodedImage::from_bytes(b"a", "image/jpeg"),
                EncodedImage::from_bytes(b"b", "image/jpeg"),
            ],
        }
    }

    #[test]
    fn creates_polls_and_downloads_the_output() -> Result<()> {
        let png = png_bytes();
        let server = StubServer::start_with(|base| {
            vec![
                Reply::json(201, json!({ "id": "p-1", "status": "starting" })),
                Reply::json(200, json!({ "id": "p-1", "status": "processing" })),
                Reply::json(
                    200,
                    json!({
                        "id": "p-1",
                        "status": "succeeded",
                        "output": [format!("{base}/files/card.png")],
                    }),
                ),
                Reply::bytes("image/png", png.clone()),
            ]
        })?;
        let image = stub_provider(&server).generate(&prompt())?;
        assert_eq!(image.bytes, png);
        assert_eq!(image.mime_type.as_deref(), Some("image/png"));

        let requests = server.requests();
        assert_eq!(requests.len(), 4);
        let create = &requests[0];
        assert_eq!(create.method, "POST");
        assert_eq!(create.path, "/v1/models/acme/card/predictions");
        assert_eq!(create.headers.get("prefer").map(String::as_str), Some("wait"));
        assert_eq!(
            create.headers.get("authorization").map(String::as_str),
            Some("Bearer r8-token")
        );
        assert_eq!(create.json()["input"]["prompt"], "Snowball fight");
        for poll in &requests[1..3] {
            assert_eq!(poll.method, "GET");
            assert_eq!(poll.path, "/v1/predictions/p-1");
        }
        assert_eq!(requests[3].path, "/files/card.png");
        Ok(())
    }

    #[test]
    fn failed_prediction_stops_without_polling() -> Result<()> {
        let server = StubServer::start(vec![Reply::json(
            201,
            json!({ "id": "p-2", "status": "failed", "error": "NSFW content detected" }),
        )])?;
        let err = stub_provider(&server)
            .generate(&prompt())
            .expect_err("failed prediction must surface");
        assert_eq!(err.kind(), "prediction_failed");
        assert_eq!(server.requests().len(), 1);
        Ok(())
    }

    #[test]
    fn rejected_create_is_a_transport_error() -> Result<()> {
        let server = StubServer::start(vec![Reply::json(
            422,
            json!({ "detail": "input.aspect_ratio is invalid" }),
        )])?;
        let err = stub_provider(&server)
            .generate(&prompt())
            .expect_err("422 must surface");
        assert_eq!(err.kind(), "provider_transport_error");
        assert!(err.to_string().contains("aspect_ratio is invalid"));
        Ok(())
    }

    #[test]
    fn success_without_output_is_a_decode_error() -> Result<()> {
        let server = StubServer::start(vec![Reply::json(
            201,
            json!({ "id": "p-3", "status": "succeeded", "output": null }),
        )])?;
        let err = stub_provider(&server)
            .generate(&prompt())
            .expect_err("missing output must surface");
        assert_eq!(err.kind(), "decode_error");
        Ok(())
    }

    fn provider() -> PredictionImageProvider {
        PredictionImageProvider::new(
            PredictionSettings {
                api_token: "r8-token".to_string(),
                api_base: "https://api.replicate.com/v1".to_string(),
                model: "reve/remix".to_string(),
            },
            PredictionPoller::default(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn endpoints_follow_model_and_job_id() {
        let provider = provider();
        assert_eq!(
            provider.create_endpoint(),
            "https://api.replicate.com/v1/models/reve/remix/predictions"
        );
        assert_eq!(
            provider.status_endpoint("abc123"),
            "https://api.replicate.com/v1/predictions/abc123"
        );
    }

    #[test]
    fn payload_sends_prompt_ratio_and_reference_images() {
        let prompt = ImagePrompt {
            text: "Snowball fight".to_string(),
            aspect_ratio: "3:2".to_string(),
            images: vec![
                EncodedImage::from_bytes(b"a", "image/jpeg"),
                EncodedImage::from_bytes(b"b", "image/jpeg"),
            ],
        };
        let payload = provider().build_payload(&prompt);
        assert_eq!(payload["input"]["prompt"], "Snowball fight");
        assert_eq!(payload["input"]["aspect_ratio"], "3:2");
        assert_eq!(
            payload["input"]["reference_images"],
            json!(["data:image/jpeg;base64,YQ==", "data:image/jpeg;base64,Yg=="])
        );
    }

    #[test]
    fn output_reference_handles_common_shapes() {
        assert_eq!(
            output_reference(&json!("https://replicate.delivery/out.webp")).as_deref(),
            Some("https://replicate.delivery/out.webp")
        );
        assert_eq!(
            output_reference(&json!(["", "https://replicate.delivery/0.png"])).as_deref(),
            Some("https://replicate.delivery/0.png")
        );
        assert_eq!(
            output_reference(&json!({ "image": "data:image/png;base64,AAAA" })).as_deref(),
            Some("data:image/png;base64,AAAA")
        );
        assert_eq!(output_reference(&json!(12)), None);
        assert_eq!(output_reference(&json!([])), None);
    }
}
