use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::app_state::AppState;
use crate::models::job::JobKind;
use crate::models::openai::{ChatCompletion, ChatCompletionChunk, ChatCompletionRequest};
use crate::routes::auth::BearerTokens;
use crate::routes::error::validated;
use crate::services::catalog;
use crate::services::classifier::ApiError;
use crate::services::generation::{Generated, ImageRequest, VideoRequest};
use crate::services::orchestrator::TaskEvent;

/// POST /v1/chat/completions
///
/// The last message is the prompt. `jimeng-video*` models render a video,
/// everything else renders images. Results come back as markdown links.
pub async fn chat_completions(
    State(state): State<AppState>,
    tokens: BearerTokens,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = validated(payload)?;
    let prompt = body.prompt();
    if prompt.is_empty() {
        return Err(ApiError::params_invalid("last message has no text content"));
    }
    let model = if body.model.trim().is_empty() {
        catalog::DEFAULT_IMAGE_MODEL.to_string()
    } else {
        body.model.clone()
    };
    let kind = catalog::kind_of(&model);
    let token = tokens.pick().to_string();
    let id = format!("chatcmpl-{}", state.ids.next_id());

    if body.stream {
        let cancel = CancellationToken::new();
        let events = state
            .generation
            .spawn_stream(kind, model.clone(), prompt, token, cancel.clone());
        return Ok(sse_response(ChatStream::new(events, cancel, id, model, kind)));
    }

    let generated = match kind {
        JobKind::Image => {
            let request = ImageRequest {
                model: model.clone(),
                prompt,
                ..Default::default()
            };
            state.generation.generate_images(&request, &token, None).await?
        }
        JobKind::Video => {
            let request = VideoRequest {
                model: model.clone(),
                prompt,
                ..Default::default()
            };
            state.generation.generate_video(&request, &token, None).await?
        }
    };
    Ok(Json(ChatCompletion::new(id, model, render_markdown(&generated))).into_response())
}

/// Markdown links for a finished generation.
pub fn render_markdown(generated: &Generated) -> String {
    match generated {
        Generated::Images { urls, .. } => urls
            .iter()
            .enumerate()
            .map(|(i, url)| format!("![image_{i}]({url})"))
            .collect::<Vec<_>>()
            .join("\n"),
        Generated::Video { url, .. } => format!("![video]({url})"),
    }
}

/// Translates orchestrator events into `chat.completion.chunk` frames.
///
/// Dropping it (the client disconnected) cancels the background job.
pub struct ChatStream {
    events: mpsc::Receiver<TaskEvent<Generated>>,
    _cancel_on_drop: DropGuard,
    id: String,
    model: String,
    kind: JobKind,
}

impl ChatStream {
    pub fn new(
        events: mpsc::Receiver<TaskEvent<Generated>>,
        cancel: CancellationToken,
        id: String,
        model: String,
        kind: JobKind,
    ) -> Self {
        Self {
            events,
            _cancel_on_drop: cancel.drop_guard(),
            id,
            model,
            kind,
        }
    }

    fn chunk(&self, content: String, finish_reason: Option<&'static str>) -> ChatCompletionChunk {
        ChatCompletionChunk::new(self.id.clone(), self.model.clone(), 0, content, finish_reason)
    }

    fn opening(&self) -> ChatCompletionChunk {
        let what = match self.kind {
            JobKind::Image => "images",
            JobKind::Video => "video",
        };
        self.chunk(format!("Generating {what}, please wait...\n"), None)
    }

    /// SSE payload for one event. `Done` is the literal `[DONE]` terminator.
    pub fn render(&self, event: TaskEvent<Generated>) -> Result<Event, axum::Error> {
        match event {
            TaskEvent::Progress(progress) => Event::default().json_data(self.chunk(
                format!(
                    "[{}] check {}, {} item(s), {}s\n",
                    progress.status,
                    progress.poll_count,
                    progress.item_count,
                    progress.elapsed.as_secs()
                ),
                None,
            )),
            TaskEvent::Finished(Ok(generated)) => {
                Event::default().json_data(self.chunk(render_markdown(&generated), Some("stop")))
            }
            TaskEvent::Finished(Err(err)) => Event::default().json_data(self.chunk(
                format!("Generation failed ({}): {}", err.kind, err.message),
                Some("stop"),
            )),
            TaskEvent::Done => Ok(Event::default().data("[DONE]")),
        }
    }

    /// Opening chunk, then one frame per event until the channel closes.
    pub fn into_frames(self) -> impl futures::Stream<Item = Result<Event, axum::Error>> + Send {
        let opening = Event::default().json_data(self.opening());
        let frames = stream::unfold(self, |mut chat| async move {
            let event = chat.events.recv().await?;
            let frame = chat.render(event);
            Some((frame, chat))
        });
        stream::once(async move { opening }).chain(frames)
    }
}

fn sse_response(chat: ChatStream) -> Response {
    Sse::new(chat.into_frames())
        .keep_alive(KeepAlive::default())
        .into_response()
}
