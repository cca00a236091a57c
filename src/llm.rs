use crate::config::SummarizationConfig;
use crate::types::{Article, DigestError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Minimal chat-completion seam. The summarizer and the LLM classifier
/// tier both speak through this; tests swap in [`MockChatApi`].
#[async_trait]
pub trait ChatApi: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// DeepSeek-style chat-completions client.
pub struct HttpChatApi {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl HttpChatApi {
    pub fn new(config: &SummarizationConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    fn name(&self) -> &str {
        "http-chat"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.3,
            max_tokens: 800,
        };

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DigestError::Parse(format!(
                "chat API returned HTTP {}",
                status
            )));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| DigestError::Parse("chat API returned no choices".to_string()))?;

        debug!(chars = content.chars().count(), "chat completion received");
        Ok(content.trim().to_string())
    }
}

/// Scripted outcome for one mock call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Reply(String),
    Fail(String),
}

/// Mock chat API for tests and `--offline` runs. Outcomes are consumed
/// from a FIFO script; once the script is drained the default outcome
/// repeats. Call count is observable for single-flight assertions.
pub struct MockChatApi {
    script: Mutex<VecDeque<MockOutcome>>,
    default_outcome: MockOutcome,
    delay_ms: u64,
    calls: AtomicUsize,
}

impl MockChatApi {
    pub fn new(default_outcome: MockOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_outcome,
            delay_ms: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(reply: &str) -> Self {
        Self::new(MockOutcome::Reply(reply.to_string()))
    }

    pub fn always_failing(reason: &str) -> Self {
        Self::new(MockOutcome::Fail(reason.to_string()))
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn push(self, outcome: MockOutcome) -> Self {
        self.script
            .lock()
            .expect("mock script lock")
            .push_back(outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    fn name(&self) -> &str {
        "mock-chat"
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        let outcome = self
            .script
            .lock()
            .expect("mock script lock")
            .pop_front()
            .unwrap_or_else(|| self.default_outcome.clone());
        match outcome {
            MockOutcome::Reply(text) => Ok(text),
            MockOutcome::Fail(reason) => Err(DigestError::Parse(reason)),
        }
    }
}

/// Editorial prompts, per language.
pub mod prompts {
    use super::*;

    pub fn zh_summary(article: &Article) -> (String, String) {
        let system = "你是一位專業新聞編輯，擅長撰寫客觀中立的新聞摘要。\
                      你的摘要風格應該像《財經時報》或《路透社》的專業報導。"
            .to_string();
        let content = if article.raw_content.is_empty() {
            article.title.as_str()
        } else {
            article.raw_content.as_str()
        };
        let user = format!(
            "請將以下新聞內容整理成約150個繁體中文字的摘要。\n\n\
             【規則】\n\
             1. 客觀中立，禁止評論、臆測或主觀判斷\n\
             2. 保留關鍵人事時地物、具體數字、重要時間點\n\
             3. 使用簡潔有力的新聞語言，避免冗詞贅字\n\
             4. 禁止使用列點形式，以流暢段落呈現\n\
             5. 若原文內容不足，請以現有內容濃縮，不要補充外部資訊\n\
             6. 字數目標150字（允許範圍130-170字）\n\n\
             【新聞標題】\n{}\n\n【新聞來源】\n{}\n\n【新聞內容】\n{}\n\n\
             【輸出格式】\n只輸出摘要正文，不要標題、不要引號、不要額外說明。",
            article.title, article.source, content
        );
        (system, user)
    }

    pub fn en_summary(article: &Article) -> (String, String) {
        let system = "You are a professional news editor specializing in concise, \
                      objective news summaries. Write in a neutral, authoritative \
                      style similar to Reuters or BBC News."
            .to_string();
        let content = if article.raw_content.is_empty() {
            article.title.as_str()
        } else {
            article.raw_content.as_str()
        };
        let user = format!(
            "Summarize the following news article in 300 to 500 characters.\n\n\
             Rules:\n\
             1. Maintain strict objectivity - no opinions or editorial commentary\n\
             2. Preserve key facts: who, what, when, where, why, and how\n\
             3. Include specific numbers, dates, and names when available\n\
             4. Write clear professional prose, no bullet points\n\
             5. Do not add information not present in the original content\n\n\
             Title: {}\nSource: {}\nContent: {}\n\n\
             Write only the summary paragraph. No title, no quotes.",
            article.title, article.source, content
        );
        (system, user)
    }

    pub fn ja_summary(article: &Article) -> (String, String) {
        let system = "あなたはプロのニュース編集者です。客観的で中立的なニュース要約を\
                      作成することを専門としています。NHKや共同通信のような報道スタイルで\
                      書いてください。"
            .to_string();
        let content = if article.raw_content.is_empty() {
            article.title.as_str()
        } else {
            article.raw_content.as_str()
        };
        let user = format!(
            "以下のニュース記事を300〜500文字の日本語で要約してください。\n\n\
             【ルール】\n\
             1. 客観的かつ中立的に記述し、意見や推測を含めない\n\
             2. 重要な事実（誰が、何を、いつ、どこで、なぜ）を保持する\n\
             3. 箇条書きではなく、流暢な文章で書く\n\
             4. 元の内容にない情報を追加しない\n\n\
             【記事タイトル】\n{}\n\n【ソース】\n{}\n\n【記事内容】\n{}\n\n\
             【出力】\n要約本文のみを出力してください。",
            article.title, article.source, content
        );
        (system, user)
    }

    /// Constrained category pick for the LLM classification tier. The model
    /// must answer with exactly one key from `allowed`.
    pub fn pick_category(article: &Article, allowed: &[&str]) -> (String, String) {
        let system = "You label news articles. Answer with exactly one category \
                      key from the provided list and nothing else."
            .to_string();
        let user = format!(
            "Categories: {}\n\nTitle: {}\n\nContent: {}\n\n\
             Answer with one category key from the list, verbatim.",
            allowed.join(", "),
            article.title,
            article.raw_content
        );
        (system, user)
    }
}
