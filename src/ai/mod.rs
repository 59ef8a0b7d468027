use crate::config::Config;
use crate::db::scores::DailyScoreRow;
use crate::db::tasks::TaskRow;
use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BriefingPayload {
    headline: Option<String>,
    focus: Option<Vec<String>>,
}

pub fn generate_nudge(config: &Config, app_name: &str, drift_minutes: i64) -> Result<String> {
    let api_key = resolve_api_key(config).context("AI API key is missing")?;

    let system_prompt = "You are a gentle focus coach. Reply with exactly one short sentence \
         nudging the user back to their planned work. Supportive, never scolding. No emoji.";
    let user_payload = json!({
        "current_app": app_name,
        "minutes_off_track": drift_minutes,
    });

    let content = chat_completion(config, &api_key, system_prompt, &user_payload.to_string())?;

    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| anyhow!("AI nudge response was empty"))
}

pub fn morning_briefing(
    config: &Config,
    date: NaiveDate,
    queue: &[TaskRow],
    yesterday: Option<&DailyScoreRow>,
) -> Result<String> {
    let api_key = match resolve_api_key(config) {
        Some(key) if config.ai_enabled => key,
        _ => return Ok(render_briefing_fallback(date, queue, yesterday)),
    };

    let tasks = queue
        .iter()
        .map(|task| {
            json!({
                "title": task.title,
                "priority": task.priority,
                "status": task.status,
                "days_worked": task.days_worked,
            })
        })
        .collect::<Vec<_>>();

    let user_payload = json!({
        "date": date.format("%Y-%m-%d").to_string(),
        "signal_queue": tasks,
        "yesterday_score": yesterday.map(|row| row.score),
        "yesterday_streak": yesterday.map(|row| row.streak_days),
    });

    let system_prompt = r#"You are a morning planning assistant. Return JSON only: {"headline":"one motivating sentence","focus":["short pointer per task"]}. At most one pointer per task, each under 15 words."#;

    let content = chat_completion(config, &api_key, system_prompt, &user_payload.to_string())?;

    // Free text around the JSON is tolerated; on a parse failure the raw reply
    // is still a usable briefing.
    let parsed = parse_payload::<BriefingPayload>(&content).unwrap_or(BriefingPayload {
        headline: Some(content.trim().to_string()),
        focus: None,
    });

    let mut lines = Vec::new();
    if let Some(headline) = parsed.headline.filter(|value| !value.trim().is_empty()) {
        lines.push(headline.trim().to_string());
    }
    for (index, pointer) in parsed.focus.unwrap_or_default().iter().enumerate() {
        let task_title = queue
            .get(index)
            .map(|task| task.title.as_str())
            .unwrap_or("-");
        lines.push(format!("{}. {} — {}", index + 1, task_title, pointer.trim()));
    }

    if lines.is_empty() {
        return Ok(render_briefing_fallback(date, queue, yesterday));
    }

    Ok(lines.join("\n"))
}

pub fn render_briefing_fallback(
    date: NaiveDate,
    queue: &[TaskRow],
    yesterday: Option<&DailyScoreRow>,
) -> String {
    let mut lines = vec![format!("Plan for {date}")];

    match yesterday {
        Some(row) => lines.push(format!(
            "Yesterday: score {}, streak {} day(s)",
            row.score, row.streak_days
        )),
        None => lines.push("Yesterday: no score recorded".to_string()),
    }

    if queue.is_empty() {
        lines.push("Signal queue is empty. Schedule a task to get started.".to_string());
    } else {
        for (index, task) in queue.iter().enumerate() {
            lines.push(format!(
                "{}. [P{}] {}",
                index + 1,
                task.priority,
                task.title
            ));
        }
    }

    lines.join("\n")
}

pub fn test_connection(config: &Config) -> Result<String> {
    let api_key = resolve_api_key(config).context(
        "AI API key is missing. Set `signaltrack config set ai.api_key <KEY>` or `SIGNALTRACK_AI_API_KEY`.",
    )?;

    let system_prompt = "Return exactly one short sentence confirming AI API connectivity is healthy.";
    let user_prompt = "Health check for SignalTrack.";

    chat_completion(config, &api_key, system_prompt, user_prompt)
}

pub fn has_api_key(config: &Config) -> bool {
    resolve_api_key(config).is_some()
}

fn resolve_api_key(config: &Config) -> Option<String> {
    std::env::var("SIGNALTRACK_AI_API_KEY")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            config
                .ai_api_key
                .clone()
                .filter(|value| !value.trim().is_empty())
        })
}

fn chat_completion(config: &Config, api_key: &str, system: &str, user: &str) -> Result<String> {
    let base_url = config.ai_api_base_url.clone();
    let model = config.ai_model.clone();
    let timeout_seconds = config.ai_timeout_seconds.max(5);
    let api_key = api_key.to_string();
    let system = system.to_string();
    let user = user.to_string();

    std::thread::spawn(move || {
        chat_completion_blocking(&base_url, &model, timeout_seconds, &api_key, &system, &user)
    })
    .join()
    .map_err(|_| anyhow!("AI worker thread panicked"))?
}

fn chat_completion_blocking(
    base_url: &str,
    model: &str,
    timeout_seconds: u64,
    api_key: &str,
    system: &str,
    user: &str,
) -> Result<String> {
    if api_key.trim().is_empty() {
        bail!("AI API key is empty");
    }

    let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .context("Failed to create AI HTTP client")?;

    let request_body = json!({
        "model": model,
        "temperature": 0.3,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": user}
        ]
    });

    let response = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(&request_body)
        .send()
        .context("AI API request failed")?;

    let status = response.status();
    let body = response.text().context("Failed to read AI response body")?;

    if !status.is_success() {
        bail!("AI API error {}: {}", status, body);
    }

    let parsed: ChatCompletionResponse = serde_json::from_str(&body)
        .with_context(|| format!("Failed to parse AI response: {body}"))?;

    parsed
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| anyhow!("AI response did not include message.content"))
}

pub fn parse_payload<T: serde::de::DeserializeOwned>(content: &str) -> Result<T> {
    let extracted = extract_json_block(content);
    serde_json::from_str(&extracted)
        .with_context(|| format!("Failed to parse AI JSON payload. content: {content}"))
}

fn extract_json_block(content: &str) -> String {
    let fenced = content.split("```").map(str::trim).find_map(|block| {
        block
            .strip_prefix("json")
            .map(str::trim)
            .or_else(|| block.starts_with('{').then_some(block))
    });

    match fenced {
        Some(block) => block.to_string(),
        None => {
            let first = content.find('{');
            let last = content.rfind('}');

            match (first, last) {
                (Some(start), Some(end)) if end > start => content[start..=end].to_string(),
                _ => content.trim().to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BriefingPayload, extract_json_block, parse_payload, render_briefing_fallback};
    use crate::db::tasks::TaskInput;
    use crate::db::open_test_db;
    use chrono::NaiveDate;

    #[test]
    fn extracts_fenced_json() {
        let content = "Here you go:\n```json\n{\"headline\":\"ship it\"}\n```\nGood luck!";
        let parsed = parse_payload::<BriefingPayload>(content).expect("parse");
        assert_eq!(parsed.headline.as_deref(), Some("ship it"));
    }

    #[test]
    fn extracts_bare_braces() {
        let content = "Sure. {\"headline\":\"focus\",\"focus\":[\"start with the parser\"]} hope that helps";
        let parsed = parse_payload::<BriefingPayload>(content).expect("parse");
        assert_eq!(parsed.focus.expect("focus").len(), 1);
    }

    #[test]
    fn plain_text_fails_parse_and_keeps_content() {
        let content = "Just write some code today.";
        assert!(parse_payload::<BriefingPayload>(content).is_err());
        assert_eq!(extract_json_block(content), content);
    }

    #[test]
    fn fallback_briefing_lists_queue() {
        let (database, _dir) = open_test_db();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).expect("date");
        let task = database
            .create_task(
                &TaskInput {
                    title: "Draft launch plan".to_string(),
                    priority: 2,
                    scheduled_date: date,
                    ..Default::default()
                },
                10,
            )
            .expect("task");

        let briefing = render_briefing_fallback(date, &[task], None);
        assert!(briefing.contains("Plan for 2026-03-02"));
        assert!(briefing.contains("[P2] Draft launch plan"));
        assert!(briefing.contains("no score recorded"));
    }
}
