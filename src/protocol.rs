//! DevTools wire codec: outbound command frames and the inbound payloads the
//! render pipeline actually decodes.
//!
//! Chromium speaks JSON-RPC-ish frames over the WebSocket. Outbound commands
//! are `{"id":N,"method":"Domain.method","params":{…}}`; inbound frames carry
//! either a response (`id` + `result`/`error`) or an event (`method`, no
//! `id`). Events are not part of this service's protocol surface and are
//! dropped by the receiver.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound CDP command frame.
///
/// The id is assigned exactly once by the connection at enqueue time;
/// numeric params stay JSON numbers, never strings.
#[derive(Debug, Clone, Serialize)]
pub struct CdpMessage {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// Minimal envelope the receiver parses off the wire: just enough to learn
/// whether the frame is a response and for whom. Unknown fields and event
/// frames deserialize without error.
#[derive(Debug, Deserialize)]
pub struct FrameEnvelope {
    pub id: Option<u64>,
}

/// Full response frame, decoded on the calling task once correlated.
#[derive(Debug, Deserialize)]
pub struct ResponseFrame {
    #[allow(dead_code)]
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<CdpErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct CdpErrorBody {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

/// `Target.createTarget` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetReply {
    pub target_id: String,
}

/// `Page.getFrameTree` response, decoded only deep enough for the main
/// frame id.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTreeReply {
    pub frame_tree: FrameTreeNode,
}

#[derive(Debug, Deserialize)]
pub struct FrameTreeNode {
    pub frame: FrameInfo,
}

#[derive(Debug, Deserialize)]
pub struct FrameInfo {
    pub id: String,
}

/// `Page.printToPDF` response. `stream` is set when the command was issued
/// with `transferMode: "ReturnAsStream"`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintToPdfReply {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub stream: Option<String>,
}

/// `IO.read` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoReadReply {
    #[serde(default)]
    pub base64_encoded: bool,
    pub data: String,
    pub eof: bool,
}

/// `Runtime.evaluate` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateReply {
    pub result: RemoteObject,
    #[serde(default)]
    pub exception_details: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_frame_shape() {
        let msg = CdpMessage {
            id: 7,
            method: "IO.read".into(),
            params: json!({ "handle": "42", "size": 51200 }),
        };
        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            encoded,
            json!({
                "id": 7,
                "method": "IO.read",
                "params": { "handle": "42", "size": 51200 }
            })
        );
        // size must serialize as a JSON number, not a string
        assert!(encoded["params"]["size"].is_u64());
    }

    #[test]
    fn envelope_extracts_response_id() {
        let env: FrameEnvelope =
            serde_json::from_str(r#"{"id":12,"result":{"data":""}}"#).unwrap();
        assert_eq!(env.id, Some(12));
    }

    #[test]
    fn envelope_tolerates_event_frames() {
        let env: FrameEnvelope = serde_json::from_str(
            r#"{"method":"Target.targetCreated","params":{"targetInfo":{}}}"#,
        )
        .unwrap();
        assert_eq!(env.id, None);
    }

    #[test]
    fn envelope_tolerates_unknown_fields() {
        let env: FrameEnvelope =
            serde_json::from_str(r#"{"id":3,"result":{},"sessionId":"abc","extra":[1,2]}"#)
                .unwrap();
        assert_eq!(env.id, Some(3));
    }

    #[test]
    fn create_target_reply() {
        let reply: CreateTargetReply =
            serde_json::from_value(json!({ "targetId": "F00D" })).unwrap();
        assert_eq!(reply.target_id, "F00D");
    }

    #[test]
    fn frame_tree_reply_reaches_main_frame_id() {
        let reply: FrameTreeReply = serde_json::from_value(json!({
            "frameTree": {
                "frame": { "id": "main-frame", "url": "about:blank" },
                "childFrames": []
            }
        }))
        .unwrap();
        assert_eq!(reply.frame_tree.frame.id, "main-frame");
    }

    #[test]
    fn print_to_pdf_reply_with_stream() {
        let reply: PrintToPdfReply =
            serde_json::from_value(json!({ "data": "", "stream": "s1" })).unwrap();
        assert_eq!(reply.stream.as_deref(), Some("s1"));
    }

    #[test]
    fn print_to_pdf_reply_without_stream() {
        let reply: PrintToPdfReply = serde_json::from_value(json!({ "data": "AAAA" })).unwrap();
        assert!(reply.stream.is_none());
    }

    #[test]
    fn io_read_reply() {
        let reply: IoReadReply = serde_json::from_value(json!({
            "base64Encoded": true,
            "data": "JVBERi0=",
            "eof": false
        }))
        .unwrap();
        assert!(reply.base64_encoded);
        assert!(!reply.eof);
        assert_eq!(reply.data, "JVBERi0=");
    }

    #[test]
    fn evaluate_reply_with_string_value() {
        let reply: EvaluateReply = serde_json::from_value(json!({
            "result": { "type": "string", "value": "Signal received" }
        }))
        .unwrap();
        assert_eq!(reply.result.kind, "string");
        assert_eq!(
            reply.result.value.as_ref().and_then(Value::as_str),
            Some("Signal received")
        );
        assert!(reply.exception_details.is_none());
    }

    #[test]
    fn response_frame_with_error() {
        let frame: ResponseFrame = serde_json::from_str(
            r#"{"id":5,"error":{"code":-32000,"message":"Target closed"}}"#,
        )
        .unwrap();
        let err = frame.error.unwrap();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "Target closed");
        assert!(frame.result.is_none());
    }
}
