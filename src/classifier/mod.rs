pub mod cache;

use crate::db::AttentionState;
use crate::db::tasks::TaskRow;
use cache::ClassificationCache;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

const DISTRACTION_URL_PATTERNS: &[&str] = &[
    r"(^|\.)twitter\.com",
    r"(^|\.)x\.com",
    r"(^|\.)facebook\.com",
    r"(^|\.)instagram\.com",
    r"(^|\.)reddit\.com",
    r"(^|\.)tiktok\.com",
    r"(^|\.)youtube\.com/(watch|shorts)",
    r"(^|\.)netflix\.com",
    r"(^|\.)twitch\.tv",
    r"(^|\.)discord\.com/channels",
    r"web\.whatsapp\.com",
    r"(^|\.)messenger\.com",
];

const PRODUCTIVITY_URL_PATTERNS: &[&str] = &[
    r"(^|\.)github\.com",
    r"(^|\.)gitlab\.com",
    r"(^|\.)bitbucket\.org",
    r"(^|\.)stackoverflow\.com",
    r"(^|\.)docs\.rs",
    r"(^|\.)crates\.io",
    r"developer\.mozilla\.org",
    r"console\.aws\.amazon\.com",
    r"console\.cloud\.google\.com",
    r"(^|\.)vercel\.com",
    r"(^|\.)figma\.com",
    r"^localhost(:|/|$)",
    r"^127\.0\.0\.1(:|/|$)",
];

const FOCUS_TOOL_FRAGMENTS: &[&str] = &[
    "visual studio code",
    "code",
    "xcode",
    "intellij",
    "pycharm",
    "webstorm",
    "android studio",
    "terminal",
    "iterm",
    "warp",
    "zed",
    "cursor",
    "sublime",
    "neovim",
    "vim",
    "emacs",
    "figma",
    "sketch",
    "blender",
    "obsidian",
    "linear",
];

const DISTRACTION_TITLE_FRAGMENTS: &[&str] = &[
    "- youtube",
    "netflix",
    "twitch",
    "twitter",
    "instagram",
    "facebook",
    "reddit",
    "tiktok",
];

const FOCUS_TITLE_FRAGMENTS: &[&str] = &[
    "pull request",
    "merge request",
    "github",
    "gitlab",
    "stack overflow",
    "localhost",
];

fn compiled(patterns: &'static [&'static str], cell: &'static OnceLock<Vec<Regex>>) -> &'static [Regex] {
    cell.get_or_init(|| {
        patterns
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect::<Vec<_>>()
    })
}

fn distraction_url_regexes() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    compiled(DISTRACTION_URL_PATTERNS, &CELL)
}

fn productivity_url_regexes() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    compiled(PRODUCTIVITY_URL_PATTERNS, &CELL)
}

pub fn classify(
    app_name: &str,
    window_title: &str,
    url: Option<&str>,
    cache: &ClassificationCache,
    active_task: Option<&TaskRow>,
) -> AttentionState {
    // Layered fallback: each step either decides green/red or stays
    // inconclusive (amber) and hands over to the next one.
    if let Some(url) = url {
        if let Some(state) = classify_url(url) {
            return state;
        }
    }

    if let Some(state) = classify_by_rules(app_name, window_title, cache) {
        return state;
    }

    if let Some(task) = active_task {
        if task_matches_window(task, app_name, window_title) {
            return AttentionState::Green;
        }
    }

    if let Some(state) = classify_heuristic(app_name, window_title) {
        return state;
    }

    AttentionState::Amber
}

fn classify_url(url: &str) -> Option<AttentionState> {
    let normalized = normalize_url(url);

    if distraction_url_regexes()
        .iter()
        .any(|regex| regex.is_match(&normalized))
    {
        return Some(AttentionState::Red);
    }

    if productivity_url_regexes()
        .iter()
        .any(|regex| regex.is_match(&normalized))
    {
        return Some(AttentionState::Green);
    }

    None
}

fn normalize_url(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();

    Url::parse(&lowered)
        .ok()
        .and_then(|parsed| {
            parsed
                .host_str()
                .map(|host| format!("{}{}", host.trim_start_matches("www."), parsed.path()))
        })
        .unwrap_or(lowered)
}

fn classify_by_rules(
    app_name: &str,
    window_title: &str,
    cache: &ClassificationCache,
) -> Option<AttentionState> {
    let classification = cache.lookup(app_name)?;
    let title = window_title.to_lowercase();

    for rule in &classification.keyword_rules {
        let Some(marker) = rule.chars().next() else {
            continue;
        };
        let keyword = rule[marker.len_utf8()..].trim().to_lowercase();
        if keyword.is_empty() || !title.contains(&keyword) {
            continue;
        }

        match marker {
            '!' => return Some(AttentionState::Red),
            '+' => return Some(AttentionState::Green),
            _ => continue,
        }
    }

    // An amber default is inconclusive and falls through to later steps.
    (classification.default_state != AttentionState::Amber).then_some(classification.default_state)
}

fn task_matches_window(task: &TaskRow, app_name: &str, window_title: &str) -> bool {
    let title = window_title.to_lowercase();
    let app = app_name.to_lowercase();

    task.title
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|token| token.chars().count() > 3)
        .any(|token| title.contains(&token) || app.contains(&token))
}

fn classify_heuristic(app_name: &str, window_title: &str) -> Option<AttentionState> {
    let app = app_name.to_lowercase();
    let title = window_title.to_lowercase();

    if FOCUS_TOOL_FRAGMENTS
        .iter()
        .any(|fragment| app.contains(fragment))
    {
        return Some(AttentionState::Green);
    }

    if DISTRACTION_TITLE_FRAGMENTS
        .iter()
        .any(|fragment| title.contains(fragment))
    {
        return Some(AttentionState::Red);
    }

    if FOCUS_TITLE_FRAGMENTS
        .iter()
        .any(|fragment| title.contains(fragment))
    {
        return Some(AttentionState::Green);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{cache::ClassificationCache, classify};
    use crate::db::classifications::ClassificationInput;
    use crate::db::tasks::TaskInput;
    use crate::db::{AttentionState, open_test_db};
    use std::time::Duration;

    fn empty_cache() -> ClassificationCache {
        ClassificationCache::new(Duration::from_secs(3600))
    }

    fn loaded_cache() -> (ClassificationCache, tempfile::TempDir) {
        let (database, dir) = open_test_db();
        let mut cache = ClassificationCache::new(Duration::from_secs(3600));
        cache.refresh(&database).expect("refresh");
        (cache, dir)
    }

    #[test]
    fn distraction_url_beats_focus_app() {
        let cache = empty_cache();
        let state = classify(
            "Visual Studio Code",
            "feed",
            Some("https://twitter.com/feed"),
            &cache,
            None,
        );
        assert_eq!(state, AttentionState::Red);
    }

    #[test]
    fn productivity_url_is_green() {
        let cache = empty_cache();
        let state = classify(
            "Safari",
            "signaltrack pulls",
            Some("https://www.github.com/owner/repo/pulls"),
            &cache,
            None,
        );
        assert_eq!(state, AttentionState::Green);
    }

    #[test]
    fn unmatched_url_falls_through_to_app_rules() {
        let (cache, _dir) = loaded_cache();
        let state = classify(
            "Visual Studio Code",
            "main.rs",
            Some("https://example.org/article"),
            &cache,
            None,
        );
        assert_eq!(state, AttentionState::Green);
    }

    #[test]
    fn keyword_rules_override_default_state() {
        let (database, _dir) = open_test_db();
        database
            .upsert_classification(
                &ClassificationInput {
                    app_name: "Slack".to_string(),
                    bundle_id: None,
                    default_state: AttentionState::Amber,
                    keyword_rules: vec!["+incident".to_string(), "!random".to_string()],
                },
                true,
            )
            .expect("upsert");
        let mut cache = ClassificationCache::new(Duration::from_secs(3600));
        cache.invalidate();
        cache.refresh(&database).expect("refresh");

        assert_eq!(
            classify("Slack", "#incident-4123", None, &cache, None),
            AttentionState::Green
        );
        assert_eq!(
            classify("Slack", "#random watercooler", None, &cache, None),
            AttentionState::Red
        );
    }

    #[test]
    fn amber_default_falls_through_to_task_context() {
        let (database, _dir) = open_test_db();
        database
            .upsert_classification(
                &ClassificationInput {
                    app_name: "Notes".to_string(),
                    bundle_id: None,
                    default_state: AttentionState::Amber,
                    keyword_rules: Vec::new(),
                },
                true,
            )
            .expect("upsert");
        let mut cache = ClassificationCache::new(Duration::from_secs(3600));
        cache.refresh(&database).expect("refresh");

        let task = database
            .create_task(
                &TaskInput {
                    title: "Quarterly budget review".to_string(),
                    scheduled_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 2).expect("date"),
                    ..Default::default()
                },
                10,
            )
            .expect("task");

        assert_eq!(
            classify("Notes", "budget draft v2", None, &cache, Some(&task)),
            AttentionState::Green
        );
        assert_eq!(
            classify("Notes", "grocery list", None, &cache, Some(&task)),
            AttentionState::Amber
        );
    }

    #[test]
    fn short_task_tokens_are_ignored() {
        let (database, _dir) = open_test_db();
        let cache = empty_cache();
        let task = database
            .create_task(
                &TaskInput {
                    title: "fix the CI".to_string(),
                    scheduled_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 2).expect("date"),
                    ..Default::default()
                },
                10,
            )
            .expect("task");

        assert_eq!(
            classify("Mystery App", "the ci dashboard", None, &cache, Some(&task)),
            AttentionState::Amber
        );
    }

    #[test]
    fn dev_tool_heuristic_is_green_without_rules() {
        let cache = empty_cache();
        assert_eq!(
            classify("Visual Studio Code", "main.rs", None, &cache, None),
            AttentionState::Green
        );
    }

    #[test]
    fn watch_page_title_is_red() {
        let cache = empty_cache();
        assert_eq!(
            classify("Safari", "lofi beats - YouTube", None, &cache, None),
            AttentionState::Red
        );
    }

    #[test]
    fn unknown_app_defaults_to_amber() {
        let cache = empty_cache();
        assert_eq!(
            classify("Mystery App", "untitled", None, &cache, None),
            AttentionState::Amber
        );
    }
}
