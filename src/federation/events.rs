//! Federation domain events
//!
//! Content publication emits typed events; a single subscriber task turns
//! each one into an outbound send on its own task. Delivery is
//! asynchronous, unordered and at-most-once.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::outbound::OutboundService;
use super::parser::parse_signals;
use crate::data::Article;
use crate::metrics::FEDERATION_OUTBOUND_TOTAL;

/// An article cites a post on another instance
#[derive(Debug, Clone)]
pub struct CitationDetected {
    pub article_id: i64,
    pub author_id: i64,
    pub title: String,
    pub short_url: String,
    pub target_instance: String,
    pub target_post_id: String,
    pub context: String,
    /// Defaults to `reference` when sent
    pub citation_type: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// An article mentions a user on another instance
#[derive(Debug, Clone)]
pub struct MentionDetected {
    pub article_id: i64,
    pub author_id: i64,
    pub title: String,
    pub short_url: String,
    pub target_instance: String,
    pub mentioned_user: String,
    pub context: String,
    /// Defaults to `discussion` when sent
    pub mention_type: Option<String>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum FederationEvent {
    CitationDetected(CitationDetected),
    MentionDetected(MentionDetected),
}

impl FederationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CitationDetected(_) => "federation.citation.detected",
            Self::MentionDetected(_) => "federation.mention.detected",
        }
    }
}

/// Receiving half handed to [`register_subscribers`]
pub type EventReceiver = mpsc::UnboundedReceiver<FederationEvent>;

/// Publishing half, cheap to clone into handlers
#[derive(Clone)]
pub struct EventBus {
    sender: mpsc::UnboundedSender<FederationEvent>,
}

impl EventBus {
    pub fn new() -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queue an event; never blocks the caller.
    ///
    /// # Returns
    /// `false` if no subscriber is running.
    pub fn publish(&self, event: FederationEvent) -> bool {
        let name = event.name();
        match self.sender.send(event) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(event = name, "No federation event subscriber; event dropped");
                false
            }
        }
    }
}

/// Start the subscriber that forwards events to the outbound service
pub fn register_subscribers(
    mut receiver: EventReceiver,
    outbound: Arc<OutboundService>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            let outbound = outbound.clone();
            tokio::spawn(async move { dispatch(&outbound, event).await });
        }
        tracing::debug!("Federation event channel closed");
    })
}

async fn dispatch(outbound: &OutboundService, event: FederationEvent) {
    let name = event.name();
    let (action, result) = match &event {
        FederationEvent::CitationDetected(citation) => {
            ("citation_request", outbound.send_citation(citation).await)
        }
        FederationEvent::MentionDetected(mention) => {
            ("mention_notify", outbound.send_mention(mention).await)
        }
    };

    match result {
        Ok(response) if response.status.is_success() => {
            tracing::info!(event = name, status = %response.status, "Federation event delivered");
        }
        Ok(response) => {
            tracing::error!(
                event = name,
                status = %response.status,
                body = %response.body,
                "Federation event rejected by peer"
            );
        }
        Err(error) => {
            FEDERATION_OUTBOUND_TOTAL
                .with_label_values(&[action, "dropped"])
                .inc();
            tracing::error!(event = name, %error, "Federation event delivery failed");
        }
    }
}

/// Publish events for every signal found in an article's content
///
/// # Returns
/// `(mentions, citations)` published
pub fn publish_federation_signals(bus: &EventBus, article: &Article, content: &str) -> (usize, usize) {
    let (mentions, citations) = parse_signals(content);
    let now = Utc::now();

    let mut published_mentions = 0;
    for mention in mentions {
        let event = FederationEvent::MentionDetected(MentionDetected {
            article_id: article.id,
            author_id: article.author_id,
            title: article.title.clone(),
            short_url: article.short_url.clone(),
            target_instance: mention.instance,
            mentioned_user: mention.username,
            context: mention.context,
            mention_type: None,
            detected_at: now,
        });
        if bus.publish(event) {
            published_mentions += 1;
        }
    }

    let mut published_citations = 0;
    for citation in citations {
        let event = FederationEvent::CitationDetected(CitationDetected {
            article_id: article.id,
            author_id: article.author_id,
            title: article.title.clone(),
            short_url: article.short_url.clone(),
            target_instance: citation.instance,
            target_post_id: citation.post_id,
            context: citation.context,
            citation_type: None,
            detected_at: now,
        });
        if bus.publish(event) {
            published_citations += 1;
        }
    }

    tracing::debug!(
        article_id = article.id,
        mentions = published_mentions,
        citations = published_citations,
        "Federation signals published"
    );

    (published_mentions, published_citations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> Article {
        Article {
            id: 7,
            author_id: 1,
            title: "Notes".to_string(),
            summary: String::new(),
            lead_in: None,
            cover: None,
            short_url: "notes".to_string(),
            is_published: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn signals_become_typed_events() {
        let (bus, mut receiver) = EventBus::new();

        let published = publish_federation_signals(
            &bus,
            &article(),
            "Thanks <@bob@peer.example> for <cite:peer.example|42>",
        );
        assert_eq!(published, (1, 1));

        match receiver.recv().await {
            Some(FederationEvent::MentionDetected(mention)) => {
                assert_eq!(mention.mentioned_user, "bob");
                assert_eq!(mention.target_instance, "peer.example");
                assert_eq!(mention.short_url, "notes");
            }
            other => panic!("expected mention event, got: {other:?}"),
        }
        match receiver.recv().await {
            Some(FederationEvent::CitationDetected(citation)) => {
                assert_eq!(citation.target_post_id, "42");
                assert_eq!(citation.article_id, 7);
            }
            other => panic!("expected citation event, got: {other:?}"),
        }
    }

    #[test]
    fn publish_without_subscriber_reports_drop() {
        let (bus, receiver) = EventBus::new();
        drop(receiver);

        assert_eq!(
            publish_federation_signals(&bus, &article(), "<@bob@peer.example>"),
            (0, 0)
        );
    }
}
