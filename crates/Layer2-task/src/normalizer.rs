//! Output Event Normalizer - 에이전트 출력 라인 → AgentEvent 변환
//!
//! 외부 에이전트 CLI 의 반구조화된 출력(JSON 레코드 또는 자유 텍스트)을
//! 순서가 보장된 타입 이벤트로 변환합니다.
//!
//! ## 보장
//! - 공백이 아닌 모든 라인은 정확히 하나의 이벤트가 됩니다 (no-drop)
//! - 시퀀스는 0 부터 단조 증가하며 재사용되지 않습니다
//! - 라인 간 버퍼링이 없으므로 도착 순서가 그대로 유지됩니다
//!
//! ## 분류 순서
//! 1. `{` / `[` 로 시작하면 JSON 파싱 시도
//!    - `type: "tool_use"` 레코드
//!    - `{event, data}` 레코드 (이벤트 이름은 느슨하게 해석, 미인식 시 progress)
//!    - 이벤트 타입 이름을 가진 `type` 필드
//!    - Claude Code `stream-json` (`assistant` 메시지, `result`)
//!    - Codex `exec --json` (`item.*`)
//! 2. 텍스트 규칙 (첫 매치 우선): 파일 변경 → 명령 실행 → 작업 시작 → 작업 완료 → 에러
//! 3. 그 외는 progress

use futures::{pin_mut, Stream, StreamExt};
use regex::Regex;
use relay_foundation::{AgentEvent, AgentEventType, RunId};
use serde_json::{json, Map, Value};
use std::sync::OnceLock;
use tracing::warn;

// ============================================================================
// 텍스트 규칙
// ============================================================================

const FILE_ACTION_PATTERN: &str = r#"(?i)^(?P<action>creat(?:ed|ing|e)|updat(?:ed|ing|e)|modif(?:ied|ying|y)|delet(?:ed|ing|e)|remov(?:ed|ing|e)|wr(?:ote|iting|ite)|applied edit to)\s+(?:(?:new\s+)?file:?\s+)?[`'"]?(?P<path>[^\s`'":]*[./][^\s`'":]*[\w/])"#;
const SHELL_EXEC_PATTERN: &str =
    r"(?i)^(?:running|executing)(?:\s+(?:shell\s+)?command\s*:?|\s*:)\s*(?P<command>\S.*)$";
const TASK_START_PATTERN: &str = r"(?i)^(?:starting|beginning)\s+task\b[:\s]*(?P<task>.*)$";
const TASK_COMPLETE_PATTERN: &str =
    r"(?i)^(?:(?:completed|finished)\s+task\b|task\s+(?:completed|finished)\b)";
const ERROR_PATTERN: &str = r"(?i)^(?:error|failed|exception)\s*:\s*(?P<message>.*)$";

struct LineRules {
    file_action: Option<Regex>,
    shell_exec: Option<Regex>,
    task_start: Option<Regex>,
    task_complete: Option<Regex>,
    error: Option<Regex>,
}

impl LineRules {
    fn new() -> Self {
        let compile = |p: &str| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Output rule disabled, pattern failed to compile: {}", e);
                None
            }
        };
        Self {
            file_action: compile(FILE_ACTION_PATTERN),
            shell_exec: compile(SHELL_EXEC_PATTERN),
            task_start: compile(TASK_START_PATTERN),
            task_complete: compile(TASK_COMPLETE_PATTERN),
            error: compile(ERROR_PATTERN),
        }
    }

    fn classify(&self, line: &str) -> Option<(AgentEventType, Value)> {
        if let Some(caps) = self.file_action.as_ref().and_then(|re| re.captures(line)) {
            let action = file_action_name(&caps["action"]);
            return Some((
                AgentEventType::FileEdit,
                json!({ "action": action, "path": &caps["path"], "message": line }),
            ));
        }

        if let Some(caps) = self.shell_exec.as_ref().and_then(|re| re.captures(line)) {
            return Some((
                AgentEventType::ShellExec,
                json!({ "command": caps["command"].trim(), "message": line }),
            ));
        }

        if let Some(caps) = self.task_start.as_ref().and_then(|re| re.captures(line)) {
            return Some((
                AgentEventType::TaskStart,
                json!({ "task": caps["task"].trim(), "message": line }),
            ));
        }

        if self.task_complete.as_ref().is_some_and(|re| re.is_match(line)) {
            return Some((AgentEventType::TaskComplete, json!({ "message": line })));
        }

        if let Some(caps) = self.error.as_ref().and_then(|re| re.captures(line)) {
            let message = caps["message"].trim();
            let message = if message.is_empty() { line } else { message };
            return Some((
                AgentEventType::Error,
                json!({ "message": message, "raw": line }),
            ));
        }

        None
    }
}

static RULES: OnceLock<LineRules> = OnceLock::new();

fn rules() -> &'static LineRules {
    RULES.get_or_init(LineRules::new)
}

fn file_action_name(word: &str) -> &'static str {
    let word = word.to_ascii_lowercase();
    if word.starts_with("creat") {
        "create"
    } else if word.starts_with("delet") || word.starts_with("remov") {
        "delete"
    } else if word.starts_with("modif") {
        "modify"
    } else if word.starts_with("applied") {
        "edit"
    } else if word.starts_with("wr") {
        "write"
    } else {
        "update"
    }
}

// ============================================================================
// 구조화 레코드
// ============================================================================

fn parse_structured(line: &str) -> Option<(AgentEventType, Value)> {
    let value: Value = serde_json::from_str(line).ok()?;
    let obj = value.as_object()?;
    let record_type = obj.get("type").and_then(Value::as_str);

    // 1. tool 호출 레코드
    if record_type == Some("tool_use") {
        return Some((AgentEventType::ToolUse, tool_use_data(obj)));
    }

    // 2. {event, data} 레코드
    if let Some(name) = obj.get("event").and_then(Value::as_str) {
        let mut data = match obj.get("data") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".into(), other.clone());
                map
            }
        };
        let event_type = match AgentEventType::from_loose(name) {
            Some(ty) => ty,
            None => {
                data.insert("rawEvent".into(), Value::String(name.to_string()));
                AgentEventType::Progress
            }
        };
        return Some((event_type, Value::Object(data)));
    }

    let record_type = record_type?;

    // 3. Claude Code stream-json
    match record_type {
        "assistant" => return Some(claude_assistant(obj)),
        "result" => {
            let mut data = Map::new();
            data.insert("rawType".into(), json!("result"));
            copy_field(obj, &mut data, "result", "message");
            copy_field(obj, &mut data, "subtype", "subtype");
            copy_field(obj, &mut data, "is_error", "isError");
            copy_field(obj, &mut data, "duration_ms", "durationMs");
            return Some((AgentEventType::Progress, Value::Object(data)));
        }
        _ => {}
    }

    // 4. Codex exec --json
    if let Some(item) = obj.get("item").and_then(Value::as_object) {
        return Some(codex_item(record_type, item));
    }

    // 5. 이벤트 타입 이름을 그대로 가진 레코드
    let event_type = AgentEventType::from_loose(record_type)?;
    let mut data = obj.clone();
    data.remove("type");
    Some((event_type, Value::Object(data)))
}

fn tool_use_data(obj: &Map<String, Value>) -> Value {
    let tool = obj
        .get("name")
        .or_else(|| obj.get("tool"))
        .cloned()
        .unwrap_or(Value::Null);
    let mut data = Map::new();
    data.insert("tool".into(), tool);
    data.insert(
        "input".into(),
        obj.get("input").cloned().unwrap_or_else(|| json!({})),
    );
    copy_field(obj, &mut data, "id", "id");
    Value::Object(data)
}

fn claude_assistant(obj: &Map<String, Value>) -> (AgentEventType, Value) {
    let content = obj
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let block_type = |b: &Value| b.get("type").and_then(Value::as_str).map(str::to_owned);

    if let Some(tool) = content
        .iter()
        .find(|b| block_type(b).as_deref() == Some("tool_use"))
        .and_then(Value::as_object)
    {
        return (AgentEventType::ToolUse, tool_use_data(tool));
    }

    let text: Vec<&str> = content
        .iter()
        .filter(|b| block_type(b).as_deref() == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();
    if !text.is_empty() {
        return (
            AgentEventType::Progress,
            json!({ "message": text.join("\n"), "rawType": "assistant" }),
        );
    }

    if let Some(thinking) = content
        .iter()
        .find(|b| block_type(b).as_deref() == Some("thinking"))
        .and_then(|b| b.get("thinking"))
        .and_then(Value::as_str)
    {
        return (AgentEventType::Thinking, json!({ "message": thinking }));
    }

    (AgentEventType::Progress, json!({ "rawType": "assistant" }))
}

fn codex_item(record_type: &str, item: &Map<String, Value>) -> (AgentEventType, Value) {
    let item_type = item.get("type").and_then(Value::as_str).unwrap_or_default();
    let mut data = Map::new();
    data.insert("rawType".into(), json!(record_type));

    let event_type = match item_type {
        "command_execution" => {
            copy_field(item, &mut data, "command", "command");
            copy_field(item, &mut data, "exit_code", "exitCode");
            copy_field(item, &mut data, "status", "status");
            AgentEventType::ShellExec
        }
        "file_change" => {
            copy_field(item, &mut data, "changes", "changes");
            if let Some(path) = item
                .get("changes")
                .and_then(Value::as_array)
                .and_then(|c| c.first())
                .and_then(|c| c.get("path"))
            {
                data.insert("path".into(), path.clone());
            }
            AgentEventType::FileEdit
        }
        "reasoning" => {
            copy_field(item, &mut data, "text", "message");
            AgentEventType::Thinking
        }
        "mcp_tool_call" => {
            copy_field(item, &mut data, "tool", "tool");
            copy_field(item, &mut data, "arguments", "input");
            AgentEventType::ToolUse
        }
        _ => {
            copy_field(item, &mut data, "text", "message");
            data.insert("itemType".into(), json!(item_type));
            AgentEventType::Progress
        }
    };
    (event_type, Value::Object(data))
}

fn copy_field(from: &Map<String, Value>, to: &mut Map<String, Value>, key: &str, as_key: &str) {
    if let Some(value) = from.get(key) {
        to.insert(as_key.to_string(), value.clone());
    }
}

// ============================================================================
// OutputEventNormalizer
// ============================================================================

/// 실행 단위 라인 → 이벤트 변환기
///
/// 상태는 시퀀스 카운터 하나뿐입니다. 같은 실행의 합성 이벤트(task_start,
/// 종료 이벤트)도 [`next_event`](Self::next_event) 로 만들어 시퀀스를 공유합니다.
#[derive(Debug, Default)]
pub struct OutputEventNormalizer {
    sequence: u64,
}

impl OutputEventNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 새 실행 시작 시 시퀀스 초기화
    pub fn reset(&mut self) {
        self.sequence = 0;
    }

    /// 다음에 발급될 시퀀스 번호
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// 다음 시퀀스로 이벤트 생성
    pub fn next_event(&mut self, run_id: &RunId, event_type: AgentEventType, data: Value) -> AgentEvent {
        let event = AgentEvent::new(run_id.clone(), event_type, self.sequence, data);
        self.sequence += 1;
        event
    }

    /// 라인 하나를 이벤트로 변환 (공백 라인만 `None`)
    pub fn parse_line(&mut self, line: &str, run_id: &RunId) -> Option<AgentEvent> {
        let (event_type, data) = classify(line)?;
        Some(self.next_event(run_id, event_type, data))
    }

    /// 라인 스트림을 도착 순서 그대로 이벤트 스트림으로 변환
    pub fn parse_stream<'a, S>(
        &'a mut self,
        lines: S,
        run_id: RunId,
    ) -> impl Stream<Item = AgentEvent> + 'a
    where
        S: Stream<Item = String> + 'a,
    {
        async_stream::stream! {
            pin_mut!(lines);
            while let Some(line) = lines.next().await {
                if let Some(event) = self.parse_line(&line, &run_id) {
                    yield event;
                }
            }
        }
    }
}

/// 시퀀스 없이 라인의 이벤트 타입과 페이로드만 결정
///
/// ANSI 이스케이프를 제거한 뒤 분류하며, 공백 라인만 `None` 입니다.
pub fn classify(line: &str) -> Option<(AgentEventType, Value)> {
    let stripped = strip_ansi_escapes::strip_str(line);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Some(parsed) = parse_structured(trimmed) {
            return Some(parsed);
        }
    }

    Some(
        rules()
            .classify(trimmed)
            .unwrap_or_else(|| (AgentEventType::Progress, json!({ "message": trimmed }))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_rules_compile() {
        let rules = rules();
        assert!(rules.file_action.is_some());
        assert!(rules.shell_exec.is_some());
        assert!(rules.task_start.is_some());
        assert!(rules.task_complete.is_some());
        assert!(rules.error.is_some());
    }

    fn parse(line: &str) -> AgentEvent {
        OutputEventNormalizer::new()
            .parse_line(line, &RunId::from("run"))
            .unwrap()
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut n = OutputEventNormalizer::new();
        let run = RunId::from("run");
        assert!(n.parse_line("", &run).is_none());
        assert!(n.parse_line("   \t", &run).is_none());
        assert!(n.parse_line("\x1b[0m  \x1b[2K", &run).is_none());
        assert_eq!(n.sequence(), 0);
    }

    #[test]
    fn test_sequence_increases_and_resets() {
        let mut n = OutputEventNormalizer::new();
        let run = RunId::from("run");
        let start = n.next_event(&run, AgentEventType::TaskStart, json!({}));
        let a = n.parse_line("hello", &run).unwrap();
        let b = n.parse_line("world", &run).unwrap();
        assert_eq!((start.sequence, a.sequence, b.sequence), (0, 1, 2));
        assert_eq!(b.run_id, run);

        n.reset();
        assert_eq!(n.parse_line("again", &run).unwrap().sequence, 0);
    }

    #[test]
    fn test_tool_use_record() {
        let event = parse(r#"{"type": "tool_use", "name": "Read", "input": {"path": "a.rs"}}"#);
        assert_eq!(event.event_type, AgentEventType::ToolUse);
        assert_eq!(event.data["tool"], "Read");
        assert_eq!(event.data["input"]["path"], "a.rs");

        let event = parse(r#"{"type": "tool_use", "tool": "bash"}"#);
        assert_eq!(event.data["tool"], "bash");
        assert_eq!(event.data["input"], json!({}));
    }

    #[test]
    fn test_event_data_record() {
        let event = parse(r#"{"event": "FileCreate", "data": {"path": "new.rs"}}"#);
        assert_eq!(event.event_type, AgentEventType::FileCreate);
        assert_eq!(event.data_str("path"), Some("new.rs"));

        let event = parse(r#"{"event": "shell-exec", "data": {"command": "ls"}}"#);
        assert_eq!(event.event_type, AgentEventType::ShellExec);

        let event = parse(r#"{"event": "heartbeat", "data": 5}"#);
        assert_eq!(event.event_type, AgentEventType::Progress);
        assert_eq!(event.data_str("rawEvent"), Some("heartbeat"));
        assert_eq!(event.data["value"], 5);
    }

    #[test]
    fn test_claude_stream_json() {
        let event = parse(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Looking"},{"type":"tool_use","id":"t1","name":"Edit","input":{"file_path":"x.rs"}}]}}"#,
        );
        assert_eq!(event.event_type, AgentEventType::ToolUse);
        assert_eq!(event.data["tool"], "Edit");
        assert_eq!(event.data["id"], "t1");

        let event = parse(
            r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hmm"}]}}"#,
        );
        assert_eq!(event.event_type, AgentEventType::Thinking);
        assert_eq!(event.data_str("message"), Some("hmm"));

        let event = parse(r#"{"type":"result","subtype":"success","result":"Done","is_error":false}"#);
        assert_eq!(event.event_type, AgentEventType::Progress);
        assert_eq!(event.data_str("message"), Some("Done"));

        let event = parse(r#"{"type":"system","subtype":"init"}"#);
        assert_eq!(event.event_type, AgentEventType::Progress);
    }

    #[test]
    fn test_codex_items() {
        let event = parse(
            r#"{"type":"item.completed","item":{"id":"i1","type":"command_execution","command":"cargo test","exit_code":0}}"#,
        );
        assert_eq!(event.event_type, AgentEventType::ShellExec);
        assert_eq!(event.data_str("command"), Some("cargo test"));

        let event = parse(
            r#"{"type":"item.completed","item":{"type":"file_change","changes":[{"path":"src/a.rs","kind":"update"}]}}"#,
        );
        assert_eq!(event.event_type, AgentEventType::FileEdit);
        assert_eq!(event.data_str("path"), Some("src/a.rs"));

        let event = parse(r#"{"type":"item.completed","item":{"type":"reasoning","text":"plan"}}"#);
        assert_eq!(event.event_type, AgentEventType::Thinking);
    }

    #[test]
    fn test_invalid_json_falls_back_to_text_rules() {
        let event = parse("{not json at all");
        assert_eq!(event.event_type, AgentEventType::Progress);
        assert_eq!(event.data_str("message"), Some("{not json at all"));

        let event = parse("[1, 2, 3]");
        assert_eq!(event.event_type, AgentEventType::Progress);
    }

    #[test]
    fn test_file_rules() {
        let event = parse("Created file src/new_module.rs");
        assert_eq!(event.event_type, AgentEventType::FileEdit);
        assert_eq!(event.data_str("action"), Some("create"));
        assert_eq!(event.data_str("path"), Some("src/new_module.rs"));

        let event = parse("Applied edit to README.md");
        assert_eq!(event.data_str("action"), Some("edit"));
        assert_eq!(event.data_str("path"), Some("README.md"));

        let event = parse("deleting `old/config.yaml`");
        assert_eq!(event.data_str("action"), Some("delete"));
        assert_eq!(event.data_str("path"), Some("old/config.yaml"));

        // no path-like token
        assert_eq!(parse("Updating dependencies").event_type, AgentEventType::Progress);
        assert_eq!(parse("Creating task queue.").event_type, AgentEventType::Progress);
    }

    #[test]
    fn test_shell_and_lifecycle_rules() {
        let event = parse("Running command: cargo test --all");
        assert_eq!(event.event_type, AgentEventType::ShellExec);
        assert_eq!(event.data_str("command"), Some("cargo test --all"));

        let event = parse("executing: npm run build");
        assert_eq!(event.data_str("command"), Some("npm run build"));

        let event = parse("Starting task: refactor parser");
        assert_eq!(event.event_type, AgentEventType::TaskStart);
        assert_eq!(event.data_str("task"), Some("refactor parser"));

        assert_eq!(parse("Finished task").event_type, AgentEventType::TaskComplete);
        assert_eq!(parse("Task completed successfully").event_type, AgentEventType::TaskComplete);

        let event = parse("Error: cannot find module");
        assert_eq!(event.event_type, AgentEventType::Error);
        assert_eq!(event.data_str("message"), Some("cannot find module"));
        assert_eq!(parse("Exception: boom").event_type, AgentEventType::Error);
        // not leading
        assert_eq!(parse("no error: here").event_type, AgentEventType::Progress);
    }

    #[test]
    fn test_ansi_is_stripped_before_classification() {
        let event = parse("\x1b[31mError:\x1b[0m disk full");
        assert_eq!(event.event_type, AgentEventType::Error);
        assert_eq!(event.data_str("message"), Some("disk full"));

        let event = parse("\x1b[1m  plain text  \x1b[0m");
        assert_eq!(event.data_str("message"), Some("plain text"));
    }

    #[test]
    fn test_every_non_blank_line_yields_one_event() {
        let lines = [
            "plain",
            "{\"event\":\"thinking\"}",
            "}{",
            "Error:",
            "Modified file: a/b.c",
            "   x   ",
        ];
        let mut n = OutputEventNormalizer::new();
        let run = RunId::from("run");
        for (i, line) in lines.iter().enumerate() {
            let event = n.parse_line(line, &run).unwrap();
            assert_eq!(event.sequence, i as u64);
        }
    }

    #[tokio::test]
    async fn test_parse_stream_preserves_order() {
        let lines = futures::stream::iter(vec![
            "first".to_string(),
            String::new(),
            "Running command: ls".to_string(),
            "last".to_string(),
        ]);
        let mut n = OutputEventNormalizer::new();
        let events: Vec<AgentEvent> = n.parse_stream(lines, RunId::from("run")).collect().await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].data_str("message"), Some("first"));
        assert_eq!(events[1].event_type, AgentEventType::ShellExec);
        assert_eq!(events[2].sequence, 2);
    }
}
