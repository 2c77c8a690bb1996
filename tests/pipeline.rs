//! Integration tests for the tamper-analysis pipeline.
//!
//! The orchestrator runs against an in-memory store, a rasteriser that hands
//! back a fixed page and a model that replays a scripted reply, so no pdfium
//! library or API key is needed.

use async_trait::async_trait;
use edgequake_llm::ChatRole;
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::{Arc, Mutex};
use tamper_scan::{
    check_status, upload_bytes, AnalysisConfig, AnalysisRequest, AnalysisResult, Container,
    DocumentFormat, DocumentInfo, MemoryStore, ModelReply, ObjectStore, Pipeline, RasterizedDocument,
    Rasterizer, Report, RequestMessage, RiskLevel, Status, TamperError, VisionModel,
};

// ── Test doubles ─────────────────────────────────────────────────────────────

struct PageRasterizer {
    page: Option<RgbaImage>,
    runs: Arc<Mutex<usize>>,
}

impl PageRasterizer {
    fn white(width: u32, height: u32) -> Self {
        Self {
            page: Some(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))),
            runs: Arc::default(),
        }
    }

    fn broken() -> Self {
        Self {
            page: None,
            runs: Arc::default(),
        }
    }
}

impl Rasterizer for PageRasterizer {
    fn rasterize(
        &self,
        _bytes: &[u8],
        _format: DocumentFormat,
    ) -> Result<RasterizedDocument, TamperError> {
        *self.runs.lock().unwrap() += 1;
        let page = self
            .page
            .clone()
            .ok_or_else(|| TamperError::Rasterization("PDF is corrupt: bad xref".into()))?;
        Ok(RasterizedDocument {
            pages: vec![DynamicImage::ImageRgba8(page)],
            info: DocumentInfo {
                page_count: 2,
                title: Some("Statement".into()),
                ..DocumentInfo::default()
            },
        })
    }
}

struct ScriptedModel {
    reply: Result<String, String>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl ScriptedModel {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Chunk count of every request received so far.
    fn calls(&self) -> Vec<usize> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(AnalysisRequest::chunk_count)
            .collect()
    }

    fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn complete(&self, request: &AnalysisRequest) -> Result<ModelReply, TamperError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(text) => Ok(ModelReply {
                content: text.clone(),
                prompt_tokens: 1000,
                completion_tokens: 50,
            }),
            Err(msg) => Err(TamperError::ModelCall(msg.clone())),
        }
    }
}

/// Memory store whose report writes always fail.
#[derive(Default)]
struct ReportlessStore {
    inner: MemoryStore,
}

#[async_trait]
impl ObjectStore for ReportlessStore {
    async fn put(&self, container: Container, key: &str, bytes: Vec<u8>) -> Result<(), TamperError> {
        if container == Container::Reports {
            return Err(TamperError::Store {
                container: container.to_string(),
                key: key.to_string(),
                reason: "quota exceeded".into(),
            });
        }
        self.inner.put(container, key, bytes).await
    }

    async fn get(&self, container: Container, key: &str) -> Result<Vec<u8>, TamperError> {
        self.inner.get(container, key).await
    }

    fn url(&self, container: Container, key: &str) -> String {
        self.inner.url(container, key)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const FENCED_REPLY: &str = r#"Here is my analysis.
```json
{
  "suspicious_chunks": [2],
  "explanation": [
    {"chunk": 2, "confidence": 8, "risk": "high", "reasoning": "amount digits use a different font"}
  ],
  "overall_risk": "high"
}
```
Let me know if you need more detail."#;

fn pipeline(
    store: Arc<dyn ObjectStore>,
    rasterizer: PageRasterizer,
    model: Arc<ScriptedModel>,
) -> Pipeline {
    Pipeline::new(store, Arc::new(rasterizer), model, AnalysisConfig::default())
}

async fn stored_report(store: &dyn ObjectStore, key: &str) -> serde_json::Value {
    let bytes = store.get(Container::Reports, key).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn page_is_split_into_padded_strips() {
    let store = Arc::new(MemoryStore::new());
    let model = ScriptedModel::replying(FENCED_REPLY);
    let p = pipeline(store.clone(), PageRasterizer::white(320, 451), model.clone());

    let report = p.process("form.pdf", b"%PDF".to_vec()).await.unwrap();

    // 451 px at 150 px per strip → 4 strips, one model call
    assert_eq!(model.calls(), vec![4]);
    assert_eq!(report.status, Status::Success);
    let meta = report.metadata.as_ref().unwrap();
    assert_eq!((meta.page_width, meta.page_height), (320, 451));
    assert_eq!(meta.page_count, 2);
}

#[tokio::test]
async fn fenced_reply_flags_chunk_and_persists_artifacts() {
    let store = Arc::new(MemoryStore::new());
    let p = pipeline(
        store.clone(),
        PageRasterizer::white(320, 451),
        ScriptedModel::replying(FENCED_REPLY),
    );

    let report = p.process("form.pdf", b"%PDF".to_vec()).await.unwrap();
    assert_eq!(report.tampered_chunks, Some(vec![2]));
    let response = report.response.as_ref().unwrap();
    assert_eq!(response.overall_risk, RiskLevel::High);
    assert_eq!(response.explanation[0].confidence, 8);
    assert_eq!(report.model_output.as_deref(), Some(FENCED_REPLY));
    assert_eq!(
        report.overlay_image_url.as_deref(),
        Some("memory://overlay-images/form_overlay.png")
    );

    assert_eq!(store.keys(Container::Reports), vec!["form_report.json"]);
    assert_eq!(store.keys(Container::Metadata), vec!["form_metadata.json"]);
    assert_eq!(store.keys(Container::OverlayImages), vec!["form_overlay.png"]);

    let persisted = Report::from_json(
        &store.get(Container::Reports, "form_report.json").await.unwrap(),
    )
    .unwrap();
    assert_eq!(persisted, report);

    let overlay = store
        .get(Container::OverlayImages, "form_overlay.png")
        .await
        .unwrap();
    let overlay = image::load_from_memory(&overlay).unwrap().to_rgba8();
    assert_eq!(overlay.dimensions(), (320, 451));
    // Strip 2 is red, strip 1 green.
    let flagged = overlay.get_pixel(160, 225);
    let clear = overlay.get_pixel(160, 75);
    assert!(flagged[0] > flagged[1], "got {flagged:?}");
    assert!(clear[1] > clear[0], "got {clear:?}");
}

#[tokio::test]
async fn reply_without_json_is_a_clear_success() {
    let store = Arc::new(MemoryStore::new());
    let p = pipeline(
        store.clone(),
        PageRasterizer::white(100, 300),
        ScriptedModel::replying("I could not find anything unusual in these images."),
    );

    let report = p.process("scan.png", vec![0u8; 8]).await.unwrap();
    assert_eq!(report.status, Status::Success);
    assert_eq!(report.response, Some(AnalysisResult::default()));
    assert_eq!(report.tampered_chunks, Some(vec![]));

    let json = stored_report(store.as_ref(), "scan_report.json").await;
    assert_eq!(json["status"], "success");
    assert_eq!(
        json["response"],
        serde_json::json!({"suspicious_chunks": [], "explanation": [], "overall_risk": "low"})
    );
}

#[tokio::test]
async fn rasterization_failure_writes_error_report() {
    let store = Arc::new(MemoryStore::new());
    let model = ScriptedModel::replying(FENCED_REPLY);
    let p = pipeline(store.clone(), PageRasterizer::broken(), model.clone());

    let err = p.process("form.pdf", b"garbage".to_vec()).await.unwrap_err();
    assert!(matches!(err, TamperError::Rasterization(_)), "got {err:?}");
    assert!(model.calls().is_empty());

    let json = stored_report(store.as_ref(), "form_report.json").await;
    assert_eq!(json["status"], "error");
    assert!(!json["error"].as_str().unwrap().is_empty());
    assert!(json.get("response").is_none());
    assert!(json.get("overlay_image_url").is_none());
    assert!(store.keys(Container::OverlayImages).is_empty());
    assert!(store.keys(Container::Metadata).is_empty());
}

#[tokio::test]
async fn model_failure_writes_error_report() {
    let store = Arc::new(MemoryStore::new());
    let p = pipeline(
        store.clone(),
        PageRasterizer::white(50, 50),
        ScriptedModel::failing("401 Unauthorized"),
    );

    let err = p.process("form.pdf", b"%PDF".to_vec()).await.unwrap_err();
    assert!(matches!(err, TamperError::ModelCall(_)), "got {err:?}");

    let json = stored_report(store.as_ref(), "form_report.json").await;
    assert_eq!(json["status"], "error");
    assert!(json["error"].as_str().unwrap().contains("401"));
    // Metadata is written as soon as the page is rasterized.
    assert_eq!(store.keys(Container::Metadata), vec!["form_metadata.json"]);
    assert!(store.keys(Container::OverlayImages).is_empty());
}

#[tokio::test]
async fn reprocessing_only_changes_identity_fields() {
    let store = Arc::new(MemoryStore::new());
    let p = pipeline(
        store.clone(),
        PageRasterizer::white(320, 451),
        ScriptedModel::replying(FENCED_REPLY),
    );

    let first = p.process("form.pdf", b"%PDF".to_vec()).await.unwrap();
    let second = p.process("form.pdf", b"%PDF".to_vec()).await.unwrap();

    assert_ne!(first.request_id, second.request_id);

    let strip_identity = |report: &Report| {
        let mut value = serde_json::to_value(report).unwrap();
        let fields = value.as_object_mut().unwrap();
        assert!(fields.remove("request_id").is_some());
        assert!(fields.remove("timestamp").is_some());
        value
    };
    assert_eq!(strip_identity(&first), strip_identity(&second));

    // The second attempt replaced the first.
    let json = stored_report(store.as_ref(), "form_report.json").await;
    assert_eq!(json["request_id"], second.request_id.as_str());
    assert_eq!(store.keys(Container::Reports).len(), 1);
}

#[tokio::test]
async fn out_of_range_chunks_are_dropped() {
    let reply = r#"{"suspicious_chunks": [0, 3, 9], "explanation": [
        {"chunk": 3, "confidence": 6, "risk": "medium", "reasoning": "misaligned baseline"},
        {"chunk": 9, "confidence": 9, "risk": "high", "reasoning": "not a real chunk"}
    ], "overall_risk": "medium"}"#;
    let store = Arc::new(MemoryStore::new());
    let p = pipeline(
        store.clone(),
        PageRasterizer::white(200, 451),
        ScriptedModel::replying(reply),
    );

    let report = p.process("form.pdf", b"%PDF".to_vec()).await.unwrap();
    assert_eq!(report.tampered_chunks, Some(vec![3]));
    let response = report.response.unwrap();
    assert_eq!(response.explanation.len(), 1);
    assert_eq!(response.explanation[0].chunk, 3);
}

#[tokio::test]
async fn unsupported_name_gets_error_report() {
    let store = Arc::new(MemoryStore::new());
    let model = ScriptedModel::replying(FENCED_REPLY);
    let p = pipeline(store.clone(), PageRasterizer::white(10, 10), model.clone());

    let err = p.process("cv.docx", b"PK".to_vec()).await.unwrap_err();
    assert!(matches!(err, TamperError::UnsupportedFormat { .. }));
    assert!(model.calls().is_empty());

    let json = stored_report(store.as_ref(), "cv_report.json").await;
    assert_eq!(json["status"], "error");
    assert_eq!(json["blob_name"], "documents/cv.docx");
}

#[tokio::test]
async fn missing_stored_document_gets_error_report() {
    let store = Arc::new(MemoryStore::new());
    let p = pipeline(
        store.clone(),
        PageRasterizer::white(10, 10),
        ScriptedModel::replying(FENCED_REPLY),
    );

    let err = p.process_stored("ghost.pdf").await.unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
    let json = stored_report(store.as_ref(), "ghost_report.json").await;
    assert_eq!(json["status"], "error");
}

#[tokio::test]
async fn unwritable_error_report_is_surfaced() {
    let store = Arc::new(ReportlessStore::default());
    let p = pipeline(
        store.clone(),
        PageRasterizer::broken(),
        ScriptedModel::replying(FENCED_REPLY),
    );

    let err = p.process("form.pdf", b"%PDF".to_vec()).await.unwrap_err();
    match err {
        TamperError::ReportNotPersisted {
            original,
            write_error,
        } => {
            assert!(original.contains("corrupt"), "{original}");
            assert!(write_error.contains("quota exceeded"), "{write_error}");
        }
        other => panic!("expected ReportNotPersisted, got {other:?}"),
    }
}

#[tokio::test]
async fn unwritable_success_report_is_surfaced() {
    let store = Arc::new(ReportlessStore::default());
    let p = pipeline(
        store.clone(),
        PageRasterizer::white(40, 40),
        ScriptedModel::replying(FENCED_REPLY),
    );

    let err = p.process("form.pdf", b"%PDF".to_vec()).await.unwrap_err();
    assert!(matches!(err, TamperError::ReportNotPersisted { .. }), "got {err:?}");
}

#[tokio::test]
async fn upload_process_and_poll() {
    let store = Arc::new(MemoryStore::new());
    let p = pipeline(
        store.clone(),
        PageRasterizer::white(320, 451),
        ScriptedModel::replying(FENCED_REPLY),
    );

    upload_bytes(store.as_ref(), "a.pdf", b"%PDF".to_vec()).await.unwrap();
    upload_bytes(store.as_ref(), "b.jpg", vec![0xFF, 0xD8]).await.unwrap();
    assert!(!check_status(store.as_ref(), "a.pdf").await.ready);

    let mut results = p
        .process_many(vec!["a.pdf".into(), "b.jpg".into(), "c.png".into()], 2)
        .await;
    results.sort_by(|x, y| x.0.cmp(&y.0));

    assert!(results[0].1.is_ok());
    assert!(results[1].1.is_ok());
    assert!(results[2].1.as_ref().unwrap_err().is_not_found());

    let status = check_status(store.as_ref(), "a.pdf").await;
    assert!(status.ready);
    let report = status.report.unwrap();
    assert!(report.is_success());
    assert_eq!(report.tampered_chunks, Some(vec![2]));

    let failed = check_status(store.as_ref(), "c.png").await;
    assert!(failed.ready);
    assert_eq!(failed.report.unwrap().status, Status::Error);
}

#[tokio::test]
async fn stream_yields_each_document_as_it_finishes() {
    use futures::StreamExt;

    let store = Arc::new(MemoryStore::new());
    let p = pipeline(
        store.clone(),
        PageRasterizer::white(320, 451),
        ScriptedModel::replying(FENCED_REPLY),
    );
    upload_bytes(store.as_ref(), "a.pdf", b"%PDF".to_vec()).await.unwrap();
    upload_bytes(store.as_ref(), "b.pdf", b"%PDF".to_vec()).await.unwrap();

    let mut results = std::pin::pin!(p.process_stream(vec!["a.pdf".into(), "b.pdf".into()], 1));
    let (name, result) = results.next().await.unwrap();
    assert_eq!(name, "a.pdf");
    assert!(result.is_ok());
    // With one slot the second document has not been started yet.
    assert_eq!(store.keys(Container::Reports), vec!["a_report.json"]);

    let (name, _) = results.next().await.unwrap();
    assert_eq!(name, "b.pdf");
    assert!(results.next().await.is_none());
    assert_eq!(store.keys(Container::Reports).len(), 2);
}

#[tokio::test]
async fn custom_instruction_and_strip_height() {
    let store = Arc::new(MemoryStore::new());
    let model = ScriptedModel::replying("{}");
    let config = AnalysisConfig::builder()
        .strip_height(100)
        .system_prompt("Flag anything odd. Reply with JSON.")
        .build()
        .unwrap();
    let p = Pipeline::new(
        store.clone(),
        Arc::new(PageRasterizer::white(64, 450)),
        model.clone(),
        config,
    );

    let report = p.process("form.pdf", b"%PDF".to_vec()).await.unwrap();
    assert_eq!(model.calls(), vec![5]);
    assert_eq!(report.response, Some(AnalysisResult::default()));

    let requests = model.requests();
    let request = &requests[0];
    assert!(matches!(
        &request.messages[0],
        RequestMessage::Instruction(text) if text == "Flag anything odd. Reply with JSON."
    ));
    assert!(request.messages[1..]
        .iter()
        .all(|m| matches!(m, RequestMessage::ChunkImage(_))));

    let chat = request.to_chat_messages();
    assert_eq!(chat.len(), 6);
    assert_eq!(chat[0].role, ChatRole::System);
    assert_eq!(chat[0].content, "Flag anything odd. Reply with JSON.");
    assert!(chat[0].images.is_none());
    for (n, message) in chat[1..].iter().enumerate() {
        assert_eq!(message.role, ChatRole::User, "message {}", n + 1);
        assert!(message.content.is_empty(), "chunk {} carries text", n + 1);
        assert_eq!(message.images.as_ref().map(Vec::len), Some(1), "chunk {}", n + 1);
    }
}

#[tokio::test]
async fn zero_strip_height_fails_before_rasterizing() {
    let store = Arc::new(MemoryStore::new());
    let model = ScriptedModel::replying(FENCED_REPLY);
    let rasterizer = PageRasterizer::white(64, 450);
    let runs = Arc::clone(&rasterizer.runs);
    // Fields are public, so the builder's validation can be sidestepped.
    let config = AnalysisConfig {
        strip_height: 0,
        ..AnalysisConfig::default()
    };
    let p = Pipeline::new(store.clone(), Arc::new(rasterizer), model.clone(), config);

    let err = p.process("form.pdf", b"%PDF".to_vec()).await.unwrap_err();
    assert!(matches!(err, TamperError::InvalidInput(_)), "got {err:?}");
    assert_eq!(*runs.lock().unwrap(), 0);
    assert!(model.calls().is_empty());
    assert!(store.keys(Container::Metadata).is_empty());
    assert!(store.keys(Container::OverlayImages).is_empty());

    let json = stored_report(store.as_ref(), "form_report.json").await;
    assert_eq!(json["status"], "error");
}
