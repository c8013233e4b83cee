use concord_common::types::{Message, Priority};

#[test]
fn message_round_trips_unknown_fields() {
    let raw = serde_json::json!({
        "id": "m1",
        "from": "director",
        "to": "librarian",
        "type": "search_request",
        "subject": "find files",
        "body": "{}",
        "priority": "high",
        "timestamp": "2026-01-01T00:00:00Z",
        "read": false,
        "read_at": null,
        "thread_id": "m1",
        "reply_to": null,
        "future_field": "kept"
    });

    let msg: Message = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(msg.priority.rank(), Priority::High.rank());

    let back = serde_json::to_value(&msg).unwrap();
    assert_eq!(back.get("future_field").and_then(|v| v.as_str()), Some("kept"));
}
