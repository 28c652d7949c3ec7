//! Text-Stream Decoding
//!
//! `event:`/`data:` records from a chunked HTTP body. Record framing is done
//! by `eventsource-stream`; this module turns records into [`Frame`]s and
//! decodes their data into events.

use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use serde_json::Value;

use super::{decode_parts, Event, Frame, ProtocolError};

/// Frames carried by a text-stream body
///
/// Comments and records without data are skipped. A record split across
/// chunks, or across a multi-byte character, is held until it completes.
pub fn frames<S, B, E>(body: S) -> impl Stream<Item = Result<Frame, EventStreamError<E>>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    body.eventsource().map(|record| {
        record.map(|record| Frame::Sse {
            event: record.event,
            data: record.data,
        })
    })
}

/// Decode one text-stream record into an event
///
/// `data` is either a full envelope (`{run_id, payload}`) or the bare payload
/// object, optionally carrying its own `run_id`.
///
/// # Errors
///
/// Returns a [`ProtocolError`] when `data` is not JSON or the payload is
/// malformed for `event`.
pub fn decode_record(event: &str, data: &str) -> Result<Event, ProtocolError> {
    let value: Value =
        serde_json::from_str(data).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;

    let Value::Object(mut object) = value else {
        return Err(ProtocolError::PayloadNotObject {
            event: event.to_string(),
        });
    };

    let run_id = match object.get("run_id") {
        Some(Value::String(id)) => id.clone(),
        Some(_) => {
            return Err(ProtocolError::MalformedEnvelope(
                "run_id must be a string".to_string(),
            ))
        }
        None => String::new(),
    };

    let payload = if object.get("payload").is_some_and(Value::is_object) {
        object.remove("payload").unwrap_or_default()
    } else {
        object.remove("run_id");
        Value::Object(object)
    };

    decode_parts(event, run_id, payload)
}
