use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{Config, RepliesConfig};
use crate::llm::CompletionClient;
use crate::platform::{IncomingMessage, OutboundMessage};

/// Messages longer than this many characters are refused.
pub const MAX_QUESTION_CHARS: usize = 200;
pub const NEWS_PHRASE: &str = "Please tell me the latest news about Mia.";
pub const IDENTIFIER_PHRASE: &str = "全世界誰長得最好笑";

/// Predicate over the message text.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// More than N characters (not bytes).
    LongerThan(usize),
    Exact(&'static str),
    Contains(&'static str),
    Always,
}

impl Matcher {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::LongerThan(limit) => text.chars().count() > *limit,
            Matcher::Exact(phrase) => text == *phrase,
            Matcher::Contains(needle) => text.contains(needle),
            Matcher::Always => true,
        }
    }
}

/// How to build the reply once a rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    AskToShorten,
    NewsImage,
    Identifier,
    Completion,
}

#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub name: &'static str,
    pub matcher: Matcher,
    pub strategy: Strategy,
}

impl RoutingRule {
    pub fn new(name: &'static str, matcher: Matcher, strategy: Strategy) -> Self {
        Self {
            name,
            matcher,
            strategy,
        }
    }
}

/// Ordered rules plus a catch-all that is used when none of them match,
/// so selection always yields a rule.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<RoutingRule>,
    catch_all: RoutingRule,
}

impl RuleTable {
    pub fn new(rules: Vec<RoutingRule>, catch_all_name: &'static str, strategy: Strategy) -> Self {
        Self {
            rules,
            catch_all: RoutingRule::new(catch_all_name, Matcher::Always, strategy),
        }
    }

    /// First rule whose matcher accepts `text`, else the catch-all.
    pub fn select(&self, text: &str) -> &RoutingRule {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(text))
            .unwrap_or(&self.catch_all)
    }
}

/// The rule table in priority order, falling through to the completion call.
pub fn default_rules() -> RuleTable {
    RuleTable::new(
        vec![
            RoutingRule::new(
                "length-guard",
                Matcher::LongerThan(MAX_QUESTION_CHARS),
                Strategy::AskToShorten,
            ),
            RoutingRule::new("news-image", Matcher::Exact(NEWS_PHRASE), Strategy::NewsImage),
            RoutingRule::new(
                "identifier",
                Matcher::Contains(IDENTIFIER_PHRASE),
                Strategy::Identifier,
            ),
        ],
        "completion",
        Strategy::Completion,
    )
}

/// Parameters for the completion-backed default rule.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Maps one incoming message to the replies that should be sent for it.
/// Stateless; share it behind an `Arc`.
pub struct Router {
    rules: RuleTable,
    completion: Arc<dyn CompletionClient>,
    settings: CompletionSettings,
    replies: RepliesConfig,
}

impl Router {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        settings: CompletionSettings,
        replies: RepliesConfig,
    ) -> Self {
        Self {
            rules: default_rules(),
            completion,
            settings,
            replies,
        }
    }

    pub fn from_config(config: &Config, completion: Arc<dyn CompletionClient>) -> Self {
        let settings = CompletionSettings {
            system_prompt: config.llm.system_prompt.clone(),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            timeout: config.llm.timeout(),
        };
        Self::new(completion, settings, config.replies.clone())
    }

    pub fn select(&self, text: &str) -> &RoutingRule {
        self.rules.select(text)
    }

    /// Never fails: completion errors turn into the fallback reply.
    pub async fn route(&self, incoming: &IncomingMessage) -> Vec<OutboundMessage> {
        let rule = self.select(&incoming.text);
        info!(
            rule = rule.name,
            chars = incoming.text.chars().count(),
            "Routing message"
        );

        match rule.strategy {
            Strategy::AskToShorten => vec![OutboundMessage::text(&self.replies.too_long)],
            Strategy::NewsImage => vec![
                OutboundMessage::image(
                    &self.replies.news_image_url,
                    &self.replies.news_preview_url,
                ),
                OutboundMessage::text(&self.replies.news_caption),
            ],
            Strategy::Identifier => vec![OutboundMessage::text(&self.replies.identifier)],
            Strategy::Completion => vec![OutboundMessage::text(self.complete(&incoming.text).await)],
        }
    }

    async fn complete(&self, text: &str) -> String {
        let call = self.completion.generate(
            &self.settings.system_prompt,
            text,
            self.settings.max_tokens,
            self.settings.temperature,
        );

        match tokio::time::timeout(self.settings.timeout, call).await {
            Ok(Ok(generated)) => {
                let trimmed = generated.trim();
                if trimmed.is_empty() {
                    warn!("Completion returned empty content, sending fallback reply");
                    self.replies.fallback.clone()
                } else {
                    trimmed.to_string()
                }
            }
            Ok(Err(e)) => {
                warn!("Completion failed, sending fallback reply: {:#}", e);
                self.replies.fallback.clone()
            }
            Err(_) => {
                warn!(
                    "Completion timed out after {:?}, sending fallback reply",
                    self.settings.timeout
                );
                self.replies.fallback.clone()
            }
        }
    }
}
