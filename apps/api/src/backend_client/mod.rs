/// Backend client. Every call to the screening backend goes through here.
///
/// The engine only sees the `ScreeningBackend` trait; `HttpBackend` is the production
/// implementation and test code swaps in a scripted one.
///
/// This client performs exactly one attempt per call. Retry policy belongs to the engine,
/// because it differs per operation (add is never retried).
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub mod events;
pub mod wire;

pub use events::ProgressEvent;

use crate::models::prescreening::{Channels, PreScreeningRecord, PublishResult, Vacancy};
use crate::models::question::{Question, QuestionSet, QuestionType};
use events::{SseDecoder, StreamEvent};
use wire::{
    AddQuestionRequest, DeleteQuestionRequest, FeedbackRequest, GenerateInterviewRequest,
    InterviewPayload, PreScreeningPayload, PreScreeningResponse, PublishRequest, PublishResponse,
    ReorderRequest, StatusPayload, VacancyResponse, WireQuestion,
};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Progress stream error: {0}")]
    Stream(String),

    #[error("Backend returned an empty question set")]
    EmptyResult,
}

impl BackendError {
    /// Whether another attempt can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Api { status, .. } => *status == 429 || *status >= 500,
            BackendError::Http(_)
            | BackendError::Parse(_)
            | BackendError::Stream(_)
            | BackendError::EmptyResult => true,
        }
    }
}

/// Callback receiving `status` / `thinking` events while a stream is open.
pub type ProgressSink<'a> = &'a (dyn Fn(ProgressEvent) + Send + Sync);

pub struct GeneratedInterview {
    pub session_id: String,
    pub questions: QuestionSet,
    pub message: String,
}

pub struct FeedbackResult {
    pub questions: QuestionSet,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub question_type: QuestionType,
    pub text: String,
    pub ideal_answer: Option<String>,
}

/// Capabilities the engine consumes. One call is one attempt.
#[async_trait]
pub trait ScreeningBackend: Send + Sync {
    async fn generate_interview(
        &self,
        vacancy_text: &str,
        session_id: Option<&str>,
        progress: ProgressSink<'_>,
    ) -> Result<GeneratedInterview, BackendError>;

    async fn send_feedback(
        &self,
        session_id: &str,
        message: &str,
        progress: ProgressSink<'_>,
    ) -> Result<FeedbackResult, BackendError>;

    async fn reorder_questions(
        &self,
        session_id: &str,
        knockout_order: &[String],
        qualifying_order: &[String],
    ) -> Result<(), BackendError>;

    async fn add_question(
        &self,
        session_id: &str,
        question: &NewQuestion,
    ) -> Result<Question, BackendError>;

    async fn delete_question(&self, session_id: &str, question_id: &str)
        -> Result<(), BackendError>;

    async fn save_pre_screening(
        &self,
        vacancy_id: &str,
        payload: &PreScreeningPayload,
    ) -> Result<(), BackendError>;

    async fn publish_pre_screening(
        &self,
        vacancy_id: &str,
        channels: Channels,
    ) -> Result<PublishResult, BackendError>;

    async fn update_pre_screening_status(
        &self,
        vacancy_id: &str,
        is_online: bool,
    ) -> Result<bool, BackendError>;

    async fn get_pre_screening(
        &self,
        vacancy_id: &str,
    ) -> Result<Option<PreScreeningRecord>, BackendError>;

    async fn get_vacancy(&self, vacancy_id: &str) -> Result<Vacancy, BackendError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "detail")]
    message: String,
}

/// reqwest implementation of `ScreeningBackend`.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_key: String, timeout_secs: u64) -> Result<Self, BackendError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    /// Sends a request and returns the response if the status is a success.
    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        Err(BackendError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BackendError> {
        let response = self.send(builder).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Opens an SSE stream, forwards progress events, and returns the `complete` payload.
    async fn stream_interview(
        &self,
        builder: RequestBuilder,
        progress: ProgressSink<'_>,
    ) -> Result<InterviewPayload, BackendError> {
        let response = self
            .send(builder.header("Accept", "text/event-stream"))
            .await?;

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            for data in decoder.feed(&bytes) {
                if let Some(payload) = handle_stream_event(&data, progress)? {
                    return Ok(payload);
                }
            }
        }

        if let Some(data) = decoder.finish() {
            if let Some(payload) = handle_stream_event(&data, progress)? {
                return Ok(payload);
            }
        }

        Err(BackendError::Stream(
            "stream ended before a complete event".to_string(),
        ))
    }
}

fn check_question_set(questions: &QuestionSet) -> Result<(), BackendError> {
    if questions.is_empty() {
        return Err(BackendError::EmptyResult);
    }
    if !questions.has_unique_ids() {
        return Err(BackendError::Stream(
            "complete event repeated a question id".to_string(),
        ));
    }
    Ok(())
}

fn handle_stream_event(
    data: &str,
    progress: ProgressSink<'_>,
) -> Result<Option<InterviewPayload>, BackendError> {
    match serde_json::from_str::<StreamEvent>(data)? {
        StreamEvent::Status { message } => {
            progress(ProgressEvent::Status { label: message });
            Ok(None)
        }
        StreamEvent::Thinking { content } => {
            progress(ProgressEvent::Thinking { text: content });
            Ok(None)
        }
        StreamEvent::Complete(payload) => Ok(Some(payload)),
        StreamEvent::Error { message } => Err(BackendError::Stream(message)),
    }
}

#[async_trait]
impl ScreeningBackend for HttpBackend {
    async fn generate_interview(
        &self,
        vacancy_text: &str,
        session_id: Option<&str>,
        progress: ProgressSink<'_>,
    ) -> Result<GeneratedInterview, BackendError> {
        let request = GenerateInterviewRequest {
            vacancy_text,
            session_id,
        };
        let payload = self
            .stream_interview(
                self.client.post(self.url("/interview/generate")).json(&request),
                progress,
            )
            .await?;

        let (returned_session, message, questions) = payload.into_question_set();
        check_question_set(&questions)?;
        let session_id = returned_session
            .or_else(|| session_id.map(str::to_string))
            .ok_or_else(|| BackendError::Stream("complete event carried no session id".to_string()))?;

        debug!(
            "Interview generated: session={}, knockout={}, qualifying={}",
            session_id,
            questions.knockout.len(),
            questions.qualifying.len()
        );

        Ok(GeneratedInterview {
            session_id,
            questions,
            message,
        })
    }

    async fn send_feedback(
        &self,
        session_id: &str,
        message: &str,
        progress: ProgressSink<'_>,
    ) -> Result<FeedbackResult, BackendError> {
        let request = FeedbackRequest {
            session_id,
            message,
        };
        let payload = self
            .stream_interview(
                self.client.post(self.url("/interview/feedback")).json(&request),
                progress,
            )
            .await?;

        let (_, message, questions) = payload.into_question_set();
        check_question_set(&questions)?;
        Ok(FeedbackResult { questions, message })
    }

    async fn reorder_questions(
        &self,
        session_id: &str,
        knockout_order: &[String],
        qualifying_order: &[String],
    ) -> Result<(), BackendError> {
        let request = ReorderRequest {
            session_id,
            knockout_order,
            qualification_order: qualifying_order,
        };
        self.send(self.client.post(self.url("/interview/reorder")).json(&request))
            .await?;
        Ok(())
    }

    async fn add_question(
        &self,
        session_id: &str,
        question: &NewQuestion,
    ) -> Result<Question, BackendError> {
        let request = AddQuestionRequest {
            session_id,
            question_type: question.question_type,
            question: &question.text,
            ideal_answer: question.ideal_answer.as_deref(),
        };
        let created: WireQuestion = self
            .send_json(self.client.post(self.url("/interview/add-question")).json(&request))
            .await?;
        Ok(created.into_question(question.question_type))
    }

    async fn delete_question(
        &self,
        session_id: &str,
        question_id: &str,
    ) -> Result<(), BackendError> {
        let request = DeleteQuestionRequest {
            session_id,
            question_id,
        };
        self.send(self.client.post(self.url("/interview/delete-question")).json(&request))
            .await?;
        Ok(())
    }

    async fn save_pre_screening(
        &self,
        vacancy_id: &str,
        payload: &PreScreeningPayload,
    ) -> Result<(), BackendError> {
        let url = self.url(&format!("/vacancies/{vacancy_id}/pre-screening"));
        self.send(self.client.put(url).json(payload)).await?;
        Ok(())
    }

    async fn publish_pre_screening(
        &self,
        vacancy_id: &str,
        channels: Channels,
    ) -> Result<PublishResult, BackendError> {
        let url = self.url(&format!("/vacancies/{vacancy_id}/pre-screening/publish"));
        let request = PublishRequest {
            enable_voice: channels.voice,
            enable_whatsapp: channels.whatsapp,
        };
        let response: PublishResponse = self.send_json(self.client.post(url).json(&request)).await?;
        Ok(response.into())
    }

    async fn update_pre_screening_status(
        &self,
        vacancy_id: &str,
        is_online: bool,
    ) -> Result<bool, BackendError> {
        let url = self.url(&format!("/vacancies/{vacancy_id}/pre-screening/status"));
        let response: StatusPayload = self
            .send_json(self.client.patch(url).json(&StatusPayload { is_online }))
            .await?;
        Ok(response.is_online)
    }

    async fn get_pre_screening(
        &self,
        vacancy_id: &str,
    ) -> Result<Option<PreScreeningRecord>, BackendError> {
        let url = self.url(&format!("/vacancies/{vacancy_id}/pre-screening"));
        match self.send_json::<PreScreeningResponse>(self.client.get(url)).await {
            Ok(response) => Ok(Some(response.into())),
            Err(BackendError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_vacancy(&self, vacancy_id: &str) -> Result<Vacancy, BackendError> {
        let url = self.url(&format!("/vacancies/{vacancy_id}"));
        let response: VacancyResponse = self.send_json(self.client.get(url)).await?;
        Ok(response.into())
    }
}
