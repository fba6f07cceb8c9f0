use std::{
    collections::HashSet,
    env,
    sync::mpsc::{self, Sender},
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{
    App,
    catalog::Difficulty,
    config::{self, AppConfig},
    log_util::log_debug,
    quiz_session::FetchRequest,
};
use color_eyre::eyre::{Context, ContextCompat, Result, eyre};
use rand::{rng, seq::SliceRandom};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

const RESPONSE_SCHEMA: &str = r#"{
  "type": "ARRAY",
  "items": {
    "type": "OBJECT",
    "properties": {
      "id": { "type": "STRING" },
      "sentence": {
        "type": "STRING",
        "description": "The sentence with a blank marked as '______'."
      },
      "options": {
        "type": "ARRAY",
        "items": { "type": "STRING" },
        "description": "Four options for the blank."
      },
      "correctAnswer": { "type": "STRING" },
      "explanation": {
        "type": "OBJECT",
        "properties": {
          "rule": {
            "type": "STRING",
            "description": "The grammar rule explained in Chinese."
          },
          "example": {
            "type": "STRING",
            "description": "An example sentence using the rule."
          },
          "commonMistakes": {
            "type": "STRING",
            "description": "Common mistakes students make with this rule in Chinese."
          }
        },
        "required": ["rule", "example", "commonMistakes"]
      },
      "category": { "type": "STRING" },
      "difficulty": { "type": "STRING", "enum": ["初级", "中级", "高级"] }
    },
    "required": [
      "id",
      "sentence",
      "options",
      "correctAnswer",
      "explanation",
      "category",
      "difficulty"
    ]
  }
}"#;

pub(crate) const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub(crate) const API_KEY_ENV: &str = "GEMINI_API_KEY";
const API_BASE_ENV: &str = "GEMINI_API_BASE";
const API_KEY_PLACEHOLDER: &str = "YOUR_GEMINI_API_KEY";
/// Marker the provider uses for the single gap in every sentence.
pub(crate) const BLANK_MARKER: &str = "______";

/// One fill-in-the-blank question as produced by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarQuestion {
    #[serde(default)]
    pub id: String,
    pub sentence: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: Explanation,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl GrammarQuestion {
    /// Sentence fragments around the blank marker.
    pub fn sentence_parts(&self) -> Vec<&str> {
        self.sentence.split(BLANK_MARKER).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub example: String,
    #[serde(default)]
    pub common_mistakes: String,
}

/// What a finished provider call hands back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Loaded(Vec<GrammarQuestion>),
    /// The call failed; the note is diagnostic only and the batch counts as empty.
    Failed(String),
}

#[derive(Debug)]
pub(crate) struct FetchMessage {
    pub(crate) generation: u64,
    pub(crate) outcome: BatchOutcome,
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct QuestionProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model_name: String,
    shuffle_options: bool,
}

impl QuestionProvider {
    pub fn new(
        api_key: impl Into<String>,
        model_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            model_name: model_name.into(),
            shuffle_options: false,
        })
    }

    /// Build a provider from the configuration, preferring `GEMINI_API_KEY` from the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = env::var(API_KEY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| config.gemini_api_key.clone());
        let provider = Self::new(
            api_key,
            config.gemini_model.as_model_name(),
            Duration::from_secs(config.request_timeout_secs),
        )?
        .with_shuffled_options(config.shuffle_options);
        match env::var(API_BASE_ENV) {
            Ok(base) if !base.trim().is_empty() => Ok(provider.with_api_base(base.trim())),
            _ => Ok(provider),
        }
    }

    /// Override the base URL (defaults to the public v1beta endpoint).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_shuffled_options(mut self, shuffle: bool) -> Self {
        self.shuffle_options = shuffle;
        self
    }

    pub fn has_credential(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != API_KEY_PLACEHOLDER
    }

    /// Run one provider call. Every failure is logged and reported as [`BatchOutcome::Failed`].
    pub async fn fetch_batch(&self, request: &FetchRequest) -> BatchOutcome {
        match self.generate_questions(request).await {
            Ok(questions) => {
                log_debug(&format!(
                    "QuestionProvider: generation {} produced {} question(s)",
                    request.generation,
                    questions.len()
                ));
                BatchOutcome::Loaded(questions)
            }
            Err(err) => {
                log_debug(&format!(
                    "QuestionProvider: generation {} failed: {:#}",
                    request.generation, err
                ));
                BatchOutcome::Failed(format!("{:#}", err))
            }
        }
    }

    async fn generate_questions(&self, request: &FetchRequest) -> Result<Vec<GrammarQuestion>> {
        if !self.has_credential() {
            return Err(eyre!(
                "{} is missing. Set it in the environment or the config view.",
                API_KEY_ENV
            ));
        }

        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let prompt = build_prompt(request, seed);
        let schema = schema_value()?;
        let payload = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [{ "text": prompt }],
                }
            ],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema,
                "temperature": 1.0,
            }
        });

        let endpoint = format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model_name
        );
        log_debug(&format!(
            "QuestionProvider: invoking {} for {} question(s), category {}, difficulty {}",
            endpoint,
            request.count,
            request.category,
            request.difficulty.label()
        ));
        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .wrap_err("failed to invoke Gemini generateContent API")?;

        log_debug(&format!("QuestionProvider: Gemini status {}", response.status()));

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|err| format!("<failed to read body: {}>", err));
            log_debug(&format!("QuestionProvider: Gemini error body: {}", body));
            return Err(eyre!("Gemini returned {} with body: {}", status, body));
        }

        let envelope: Value = response
            .json()
            .await
            .wrap_err("failed to parse Gemini response body as JSON")?;
        let text = extract_candidate_text(&envelope)
            .context("Gemini response did not include candidate text")?;

        let mut questions = parse_questions(&text)?;
        normalize_batch(&mut questions, request.count);
        if self.shuffle_options {
            let mut rng = rng();
            for question in &mut questions {
                question.options.shuffle(&mut rng);
            }
        }
        Ok(questions)
    }
}

/// Start a background fetch for the session's next batch. Any in-flight fetch is superseded.
pub(crate) fn trigger_batch_fetch(app: &mut App) {
    let current = config::current();
    let request = app.session.restart().with_count(current.batch_size);

    let (sender, receiver) = mpsc::channel();
    app.fetch_receiver = Some(receiver);
    app.loading_frame = 0;
    app.update_loading_status();
    log_debug(&format!(
        "App: starting fetch generation {} ({} / {})",
        request.generation,
        request.category,
        request.difficulty.label()
    ));

    let provider = match QuestionProvider::from_config(&current) {
        Ok(provider) => provider,
        Err(err) => {
            send_outcome(
                &sender,
                request.generation,
                BatchOutcome::Failed(format!("Question provider unavailable: {}", err)),
            );
            return;
        }
    };

    thread::spawn(move || {
        let runtime = match Runtime::new() {
            Ok(runtime) => runtime,
            Err(err) => {
                send_outcome(
                    &sender,
                    request.generation,
                    BatchOutcome::Failed(format!("Failed to build Tokio runtime: {}", err)),
                );
                return;
            }
        };
        let outcome = runtime.block_on(provider.fetch_batch(&request));
        drop(runtime);
        send_outcome(&sender, request.generation, outcome);
    });
}

fn send_outcome(sender: &Sender<FetchMessage>, generation: u64, outcome: BatchOutcome) {
    if sender.send(FetchMessage { generation, outcome }).is_err() {
        log_debug(&format!(
            "App: fetch generation {} finished after its receiver was dropped",
            generation
        ));
    }
}

fn build_prompt(request: &FetchRequest, seed: u128) -> String {
    format!(
        "Generate {count} unique English grammar fill-in-the-blank questions for junior high school students.\n\
         Category: {category}\n\
         Difficulty: {difficulty}\n\
         Random Seed: {seed}\n\n\
         The sentences should be complex and contextually rich. The options should be plausible but clearly distinguishable based on grammar rules.\n\
         The explanation must be in Chinese.\n\
         Use '{blank}' for the blank.\n\
         Ensure the questions are different from common textbook examples.",
        count = request.count,
        category = request.category,
        difficulty = request.difficulty.label(),
        seed = seed,
        blank = BLANK_MARKER,
    )
}

fn schema_value() -> Result<Value> {
    serde_json::from_str(RESPONSE_SCHEMA).wrap_err("response schema is not valid JSON")
}

/// Join the text parts of the first candidate.
pub(crate) fn extract_candidate_text(envelope: &Value) -> Option<String> {
    let candidates = envelope.get("candidates")?.as_array()?;
    let parts = candidates
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

pub(crate) fn parse_questions(text: &str) -> Result<Vec<GrammarQuestion>> {
    serde_json::from_str(text.trim())
        .wrap_err("failed to deserialize Gemini output into grammar questions")
}

/// Truncate to `count` and make ids present and unique within the batch.
pub(crate) fn normalize_batch(questions: &mut Vec<GrammarQuestion>, count: usize) {
    questions.truncate(count);
    let mut seen = HashSet::new();
    for (index, question) in questions.iter_mut().enumerate() {
        let trimmed = question.id.trim();
        let base = if trimmed.is_empty() {
            format!("q{}", index + 1)
        } else {
            trimmed.to_string()
        };
        let mut id = base.clone();
        let mut suffix = 2;
        while seen.contains(&id) {
            id = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        seen.insert(id.clone());
        question.id = id;
    }
}
