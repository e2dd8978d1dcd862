// Shared helpers for integration tests
#![allow(
    dead_code,
    reason = "each integration test binary uses a subset of these helpers"
)]

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use serde_json::{Value, json};
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const VOCABULARY: [&str; 6] = ["return", "exchange", "shipping", "payment", "office", "gift"];

/// Bag-of-words vector over a tiny vocabulary, with a constant component so no vector is zero
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = VOCABULARY
        .iter()
        .map(|word| if lower.contains(word) { 1.0 } else { 0.0 })
        .collect();
    vector.push(0.05);
    vector
}

/// Write a PDF where each entry is one page and each line its own text block
pub fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::new();
    for page_text in pages {
        let mut operations = Vec::new();
        for (line_number, line) in page_text.lines().enumerate() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 10.into()]));
            operations.push(Operation::new(
                "Td",
                vec![50.into(), (800 - 12 * line_number as i64).into()],
            ));
            operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content should encode"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("pdf should be written");
}

fn request_json(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap_or(Value::Null)
}

fn first_text(content: &Value) -> &str {
    content["parts"][0]["text"].as_str().unwrap_or_default()
}

/// Answers `batchEmbedContents` with one keyword vector per request entry
struct BatchEmbedResponder;

impl Respond for BatchEmbedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = request_json(request);
        let embeddings: Vec<Value> = body["requests"]
            .as_array()
            .map(|requests| {
                requests
                    .iter()
                    .map(|entry| json!({ "values": keyword_vector(first_text(&entry["content"])) }))
                    .collect()
            })
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

struct QueryEmbedResponder;

impl Respond for QueryEmbedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = request_json(request);
        ResponseTemplate::new(200).set_body_json(json!({
            "embedding": { "values": keyword_vector(first_text(&body["content"])) }
        }))
    }
}

/// Calls the first declared tool with the user's question, then answers from the observation.
///
/// For exchange questions whose observation holds both a 7-day and a 15-day figure, the
/// answer follows the precedence rule stated in the tool description.
struct AgentResponder;

impl Respond for AgentResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = request_json(request);
        let contents = body["contents"].as_array().cloned().unwrap_or_default();

        let question = contents
            .iter()
            .rev()
            .find(|content| content["role"] == "user" && content["parts"][0]["text"].is_string())
            .map(first_text)
            .unwrap_or_default()
            .to_string();
        let observation = contents.iter().rev().find_map(|content| {
            content["parts"][0]["functionResponse"]["response"]["content"].as_str()
        });

        let part = match observation {
            None => {
                let tool = body["tools"][0]["functionDeclarations"][0]["name"].clone();
                json!({ "functionCall": { "name": tool, "args": { "query": question } } })
            }
            Some(observation) => {
                let description = body["tools"][0]["functionDeclarations"][0]["description"]
                    .as_str()
                    .unwrap_or_default();
                let text = if question.to_lowercase().contains("exchange")
                    && description.contains("default to 7 days")
                    && observation.contains("7 days")
                    && observation.contains("15-day")
                {
                    "You have **7 days** to exchange an item. Note: our policy page mentions a 15-day exchange period, but the 7-day window applies.".to_string()
                } else {
                    format!("According to our knowledge base: {}", observation)
                };
                json!({ "text": text })
            }
        };

        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [part] },
                "finishReason": "STOP"
            }]
        }))
    }
}

/// Mock of the Gemini endpoints used by the assistant
pub async fn mock_gemini() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/text-embedding-004:batchEmbedContents"))
        .respond_with(BatchEmbedResponder)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/text-embedding-004:embedContent"))
        .respond_with(QueryEmbedResponder)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(AgentResponder)
        .mount(&server)
        .await;

    server
}

/// Number of requests the mock received on a path
pub async fn request_count(server: &MockServer, endpoint: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == endpoint)
        .count()
}
