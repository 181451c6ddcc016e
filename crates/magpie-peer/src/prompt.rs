//! Asynchronous human-prompt queue
//!
//! Inbound handlers sometimes need a yes/no answer from the human (accept a
//! file offer, accept a game invite). The network receive loop must never
//! block waiting for that answer, so prompts travel over a request/response
//! channel: a handler enqueues a request and suspends on a oneshot reply
//! while the interactive loop drains the queue between menu reads.

use tokio::sync::{mpsc, oneshot};

/// One pending question for the human
pub struct PromptRequest {
    pub prompt: String,
    pub reply: oneshot::Sender<String>,
}

/// Handle for enqueueing prompts; cheap to clone
#[derive(Clone)]
pub struct PromptQueue {
    tx: mpsc::UnboundedSender<PromptRequest>,
}

impl PromptQueue {
    /// Create the queue and the receiver the interactive loop drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PromptRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Ask the human a question and await the answer. Returns `None` when
    /// the interactive loop has shut down.
    pub async fn ask(&self, prompt: impl Into<String>) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(PromptRequest {
                prompt: prompt.into(),
                reply,
            })
            .ok()?;
        answer.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ask_receives_answer() {
        let (queue, mut rx) = PromptQueue::new();

        let asker = tokio::spawn(async move { queue.ask("Accept? (y/n): ").await });

        let req = rx.recv().await.unwrap();
        assert_eq!(req.prompt, "Accept? (y/n): ");
        req.reply.send("y".to_string()).unwrap();

        assert_eq!(asker.await.unwrap(), Some("y".to_string()));
    }

    #[tokio::test]
    async fn test_ask_after_receiver_dropped() {
        let (queue, rx) = PromptQueue::new();
        drop(rx);
        assert_eq!(queue.ask("anyone there?").await, None);
    }

    #[tokio::test]
    async fn test_prompts_serve_in_order() {
        let (queue, mut rx) = PromptQueue::new();
        let q1 = queue.clone();
        let q2 = queue.clone();

        let first = tokio::spawn(async move { q1.ask("one").await });
        // Ensure deterministic enqueue order
        let req = rx.recv().await.unwrap();
        let second = tokio::spawn(async move { q2.ask("two").await });

        assert_eq!(req.prompt, "one");
        req.reply.send("a".into()).unwrap();
        let req = rx.recv().await.unwrap();
        assert_eq!(req.prompt, "two");
        req.reply.send("b".into()).unwrap();

        assert_eq!(first.await.unwrap(), Some("a".into()));
        assert_eq!(second.await.unwrap(), Some("b".into()));
    }
}
