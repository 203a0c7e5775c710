use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_ENV: &str = "LINERELAY_CONFIG";
pub const CHANNEL_SECRET_ENV: &str = "LINE_CHANNEL_SECRET";
pub const CHANNEL_ACCESS_TOKEN_ENV: &str = "LINE_CHANNEL_ACCESS_TOKEN";
pub const LLM_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_CONFIG_FILE: &str = "config.toml";

const DEFAULT_SYSTEM_PROMPT: &str = "你現在是台灣新住民的專屬隨身問答助理，專注於幫助新來的居民解決生活中的各種問題。\
請根據用戶的語言選擇（繁體中文、簡體中文、英文、越南文等）回應他們的問題。你的回答應該簡單易懂，涵蓋以下幾個領域：\
1. 語言支持：回答用戶問題時，根據用戶的語言需求提供對應語言的回應。\
2. 生活資訊：提供有關台灣的日常生活、居住、交通、購物等資訊。例如你知道板橋的新住民家庭服務中心地點在新北市板橋區四川路2段16巷5號10樓，電話為0289668500；\
你也知道如果想要買電信儲值卡，可以到中華電信的下列INDEX門市，地址為臺北市大安區四維路198巷47號、臺北市萬華區青年路110號、臺北市萬華區國興路32號等。\
3. 文化習俗：介紹台灣的文化、節慶和習俗，幫助用戶適應本地文化。\
4. 就業機會：提供關於工作機會、求職技巧和職場文化的資訊。\
5. 醫療服務：解答關於醫療系統、就醫流程和健康保險的問題。\
6. 戶政手續：指導用戶如何辦理居留證、工作證等必要的官方文件。例如用戶想考汽機車駕照，你知道交通部公路局汽機車線上隨機模擬考系統的網址是https://www.mvdis.gov.tw/m3-simulator-drv/，能夠幫助用戶準備考試。\
7. 教育資源：提供有關學校、語言學習和其他教育資源的信息。\
每次回答時，請確保用語簡潔明瞭，並考慮到新住民可能對台灣的生活和制度不太熟悉。請根據用戶的具體需求，提供最合適的解決方案或建議。";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openai,
    Openrouter,
    Ollama,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Openai => write!(f, "openai"),
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    /// Overridden by `OPENAI_API_KEY` when that is set.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return self.base_url.trim_end_matches('/');
        }
        match self.provider {
            LlmProvider::Openai => "https://api.openai.com/v1",
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            base_url: String::new(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
        }
    }
}

/// LINE channel settings. The two credentials only ever come from the
/// environment, never from the config file.
#[derive(Debug, Deserialize, Clone)]
pub struct LineConfig {
    #[serde(skip)]
    pub channel_secret: String,
    #[serde(skip)]
    pub channel_access_token: String,
    #[serde(default = "default_line_api_base")]
    pub api_base: String,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_secret: String::new(),
            channel_access_token: String::new(),
            api_base: default_line_api_base(),
        }
    }
}

/// Canned reply texts used by the routing rules.
#[derive(Debug, Deserialize, Clone)]
pub struct RepliesConfig {
    #[serde(default = "default_too_long")]
    pub too_long: String,
    #[serde(default = "default_news_image_url")]
    pub news_image_url: String,
    #[serde(default = "default_news_preview_url")]
    pub news_preview_url: String,
    #[serde(default = "default_news_caption")]
    pub news_caption: String,
    #[serde(default = "default_identifier")]
    pub identifier: String,
    #[serde(default = "default_fallback")]
    pub fallback: String,
}

impl Default for RepliesConfig {
    fn default() -> Self {
        Self {
            too_long: default_too_long(),
            news_image_url: default_news_image_url(),
            news_preview_url: default_news_preview_url(),
            news_caption: default_news_caption(),
            identifier: default_identifier(),
            fallback: default_fallback(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub replies: RepliesConfig,
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_max_tokens() -> u32 {
    150
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_line_api_base() -> String {
    "https://api.line.me".to_string()
}

fn default_too_long() -> String {
    "您的問題太長了，請精簡到200字以內再問一次喔！\n\
     Your question is too long. Please shorten it to 200 characters or fewer and ask again."
        .to_string()
}

fn default_news_image_url() -> String {
    "https://example.com/linerelay/mia-news.jpg".to_string()
}

fn default_news_preview_url() -> String {
    "https://example.com/linerelay/mia-news-preview.jpg".to_string()
}

fn default_news_caption() -> String {
    "長按圖片即可轉傳給親朋好友！\n\
     Press and hold the image to share it with your friends and family."
        .to_string()
}

fn default_identifier() -> String {
    "ID: 8f3b2c91-4e6d-4a1f-9c27-5d0e1b7a6f42".to_string()
}

fn default_fallback() -> String {
    "我現在有點不太舒服，晚點回覆你喔！".to_string()
}

impl Config {
    /// Load the optional config file and overlay secrets from the process
    /// environment. `.env` should already have been loaded by the caller.
    pub fn load() -> Result<Self> {
        let (path, explicit) = match std::env::var(CONFIG_PATH_ENV) {
            Ok(p) if !p.is_empty() => (PathBuf::from(p), true),
            _ => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let config = if explicit || path.exists() {
            Self::from_file(&path)?
        } else {
            Config::default()
        };

        config.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Fill in credentials from `lookup`. Both LINE credentials are required;
    /// the completion API key is optional and only fails at request time.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> Result<String> {
            lookup(name)
                .filter(|v| !v.is_empty())
                .with_context(|| format!("Specify {name} as environment variable."))
        };

        self.line.channel_secret = required(CHANNEL_SECRET_ENV)?;
        self.line.channel_access_token = required(CHANNEL_ACCESS_TOKEN_ENV)?;

        if let Some(key) = lookup(LLM_API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.llm.api_key = key;
        }

        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.llm.max_tokens == 0 {
            anyhow::bail!("llm.max_tokens must be greater than zero");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!(
                "llm.temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            );
        }
        if self.llm.timeout_secs == 0 {
            anyhow::bail!("llm.timeout_secs must be greater than zero");
        }
        Ok(())
    }
}
