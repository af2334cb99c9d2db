// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::AgentStatus;
use crate::turn::TurnId;
use yare::parameterized;

fn sample(kind: &str) -> RunEvent {
    match kind {
        "run:status" => RunEvent::Status { status: AgentStatus::Running, at_ms: 1 },
        "run:text-delta" => RunEvent::TextDelta {
            turn_id: TurnId::from_string("trn-1"),
            delta: "hi".to_string(),
        },
        "run:tool-call" => RunEvent::ToolCall {
            call_id: "call-1".to_string(),
            name: "read_file".to_string(),
            arguments: serde_json::json!({"path": "src/lib.rs"}),
        },
        "run:tool-result" => RunEvent::ToolResult {
            call_id: "call-1".to_string(),
            output: "ok".to_string(),
        },
        "run:file-edit" => RunEvent::FileEdit { path: "src/lib.rs".into(), at_ms: 2 },
        "run:error" => RunEvent::Error { message: "boom".to_string() },
        "run:finish" => RunEvent::Finish { status: AgentStatus::Completed },
        other => panic!("unknown kind {other}"),
    }
}

#[parameterized(
    status = { "run:status" },
    text_delta = { "run:text-delta" },
    tool_call = { "run:tool-call" },
    tool_result = { "run:tool-result" },
    file_edit = { "run:file-edit" },
    error = { "run:error" },
    finish = { "run:finish" },
)]
fn serialized_tag_matches_name(kind: &str) {
    let event = sample(kind);
    assert_eq!(event.name(), kind);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], kind);
    let back: RunEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn log_summaries_lead_with_kind() {
    for kind in [
        "run:status",
        "run:text-delta",
        "run:tool-call",
        "run:tool-result",
        "run:file-edit",
        "run:error",
        "run:finish",
    ] {
        let summary = sample(kind).log_summary();
        assert!(summary.starts_with(kind), "summary {summary:?} should start with {kind}");
    }
}

#[test]
fn tool_call_summary_names_the_tool() {
    let summary = sample("run:tool-call").log_summary();
    assert!(summary.contains("tool=read_file"));
}
