use crate::models::{ChatMessage, ChatTurn, GenerationParams};
use crate::responder::ChatResponder;
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// A transcript to render and the new compose-box value
pub type HistoryState = (Vec<ChatMessage>, String);

pub type HistoryStream = Pin<Box<dyn Stream<Item = HistoryState> + Send>>;

/// Append `message` to `history` and stream the transcript as the reply grows.
///
/// Every yielded transcript is the history plus the user turn plus one
/// assistant turn holding the response so far. A blank message yields the
/// history untouched.
pub fn submit(
    responder: &ChatResponder,
    message: &str,
    history: Vec<ChatMessage>,
    system_message: &str,
    model_name: &str,
    params: GenerationParams,
) -> HistoryStream {
    let responder = responder.clone();
    let message = message.to_string();
    let system_message = system_message.to_string();
    let model_name = model_name.to_string();

    Box::pin(stream! {
        if message.trim().is_empty() {
            yield (history, String::new());
            return;
        }

        // The responder appends the user message itself.
        let turn = ChatTurn {
            message: message.clone(),
            history: history.clone(),
            system_message,
            model_name,
            params,
        };
        let mut history = history;
        history.push(ChatMessage::user(message));

        let mut partials = responder.respond(turn);
        while let Some(partial) = partials.next().await {
            let mut current = history.clone();
            current.push(ChatMessage::assistant(partial));
            yield (current, String::new());
        }
    })
}
